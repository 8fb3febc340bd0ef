//! OCR 客户端（Google Cloud Vision `images:annotate`）
//!
//! 图片直接识别；PDF 先用 `pdftoppm` 按页渲染成 PNG（临时目录，调用结束即删除），
//! 再逐页识别并用分隔符拼接。单页的 API 错误写成内联标记，不中断整份文档。

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppResult, ConfigError, ExtractionError};

/// 页与页之间的分隔符
pub const PAGE_SEPARATOR: &str = "\n\n--- Nueva Página ---\n\n";

/// 文字提取能力
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// 从文件字节中提取文字；`mime_hint` 用于判断是否为 PDF
    async fn extract_text(&self, bytes: &[u8], mime_hint: &str) -> AppResult<String>;
}

/// Google Cloud Vision OCR
pub struct VisionOcr {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    pdf_dpi: u32,
}

// ========== Vision API 响应结构 ==========

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

impl VisionOcr {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("创建 HTTP 客户端失败，使用默认配置: {}", e);
                reqwest::Client::new()
            });

        Self {
            http,
            api_key: config.vision_key().map(str::to_string),
            base_url: config.vision_api_base_url.trim_end_matches('/').to_string(),
            pdf_dpi: config.pdf_render_dpi,
        }
    }

    /// 识别单张图片
    ///
    /// # 返回
    /// - `Ok(Some(text))`: 识别到文字
    /// - `Ok(None)`: 图片中没有文字
    /// - `Err(ExtractionError::Api)`: Vision 返回了错误信息
    async fn annotate_image(
        &self,
        api_key: &str,
        image: &[u8],
    ) -> Result<Option<String>, ExtractionError> {
        let body = json!({
            "requests": [{
                "image": { "content": BASE64.encode(image) },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }]
            }]
        });

        let url = format!("{}/images:annotate", self.base_url);
        let response = self
            .http
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text.chars().take(300).collect::<String>()
            )));
        }

        let parsed: AnnotateResponse = response.json().await?;
        let Some(first) = parsed.responses.into_iter().next() else {
            return Ok(None);
        };

        if let Some(api_error) = first.error.filter(|e| !e.message.is_empty()) {
            return Err(ExtractionError::Api(api_error.message));
        }

        Ok(first
            .full_text_annotation
            .map(|a| a.text)
            .filter(|t| !t.trim().is_empty()))
    }

    /// 逐页识别 PDF
    async fn extract_pdf(&self, api_key: &str, bytes: &[u8]) -> AppResult<String> {
        // 临时目录在本函数返回时删除
        let workdir = TempDir::new().map_err(ExtractionError::from)?;
        let pages = render_pdf_pages(bytes, workdir.path(), self.pdf_dpi).await?;
        info!("📄 PDF 渲染完成，共 {} 页", pages.len());

        let mut texts = Vec::with_capacity(pages.len());
        for (i, page) in pages.iter().enumerate() {
            let page_number = i + 1;
            let image = tokio::fs::read(page)
                .await
                .map_err(ExtractionError::from)?;

            match self.annotate_image(api_key, &image).await {
                Ok(Some(text)) => {
                    debug!("第 {} 页识别到 {} 个字符", page_number, text.chars().count());
                    texts.push(text);
                }
                Ok(None) => info!("第 {} 页未识别到文字", page_number),
                Err(ExtractionError::Api(message)) => {
                    warn!("第 {} 页 OCR 失败: {}", page_number, message);
                    texts.push(format!(
                        "[Error en OCR de página {}: {}]",
                        page_number, message
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(texts.join(PAGE_SEPARATOR))
    }
}

#[async_trait]
impl TextExtractor for VisionOcr {
    async fn extract_text(&self, bytes: &[u8], mime_hint: &str) -> AppResult<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            error!("无法进行 OCR: Vision API Key 未配置");
            return Err(ConfigError::MissingVisionCredential.into());
        };

        let text = if is_pdf(bytes, mime_hint) {
            info!("🔍 开始 PDF OCR ({} 字节)", bytes.len());
            self.extract_pdf(api_key, bytes).await?
        } else {
            info!("🔍 开始图片 OCR ({} 字节, {})", bytes.len(), mime_hint);
            self.annotate_image(api_key, bytes)
                .await?
                .unwrap_or_default()
        };

        info!("✓ OCR 完成，共 {} 个字符", text.chars().count());
        Ok(text)
    }
}

fn is_pdf(bytes: &[u8], mime_hint: &str) -> bool {
    mime_hint.to_ascii_lowercase().contains("pdf") || bytes.starts_with(b"%PDF")
}

/// 调用 `pdftoppm` 把 PDF 渲染为按页排序的 PNG 文件
async fn render_pdf_pages(
    bytes: &[u8],
    workdir: &Path,
    dpi: u32,
) -> Result<Vec<PathBuf>, ExtractionError> {
    let input = workdir.join("input.pdf");
    tokio::fs::write(&input, bytes).await?;

    let output = tokio::process::Command::new("pdftoppm")
        .arg("-r")
        .arg(dpi.to_string())
        .arg("-png")
        .arg(&input)
        .arg(workdir.join("page"))
        .output()
        .await
        .map_err(|e| ExtractionError::PdfRender(format!("no se pudo ejecutar pdftoppm: {}", e)))?;

    if !output.status.success() {
        return Err(ExtractionError::PdfRender(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let mut pages = Vec::new();
    let mut entries = tokio::fs::read_dir(workdir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_page = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("page") && n.ends_with(".png"));
        if is_page {
            pages.push(path);
        }
    }
    // pdftoppm 的页码按总页数补零，字典序即页序
    pages.sort();

    if pages.is_empty() {
        return Err(ExtractionError::PdfRender(
            "el PDF no produjo páginas".to_string(),
        ));
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn config_for(server_url: &str) -> Config {
        Config {
            vision_api_key: Some("vision-key".to_string()),
            vision_api_base_url: server_url.to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_is_pdf() {
        assert!(is_pdf(b"%PDF-1.7 ...", "application/octet-stream"));
        assert!(is_pdf(b"", "application/PDF"));
        assert!(!is_pdf(b"\x89PNG", "image/png"));
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let ocr = VisionOcr::new(&Config::default());
        let err = ocr.extract_text(b"\x89PNG", "image/png").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Config(ConfigError::MissingVisionCredential)
        ));
    }

    #[tokio::test]
    async fn test_image_text_is_returned() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/images:annotate")
            .match_query(mockito::Matcher::UrlEncoded(
                "key".into(),
                "vision-key".into(),
            ))
            .with_status(200)
            .with_body(r#"{"responses":[{"fullTextAnnotation":{"text":"Pregunta 1: 42"}}]}"#)
            .create_async()
            .await;

        let ocr = VisionOcr::new(&config_for(&server.url()));
        let text = ocr.extract_text(b"\x89PNG", "image/png").await.unwrap();

        mock.assert_async().await;
        assert_eq!(text, "Pregunta 1: 42");
    }

    #[tokio::test]
    async fn test_image_without_text_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/images:annotate")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"responses":[{}]}"#)
            .create_async()
            .await;

        let ocr = VisionOcr::new(&config_for(&server.url()));
        assert_eq!(ocr.extract_text(b"\x89PNG", "image/png").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_image_api_error_is_raised() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/images:annotate")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"responses":[{"error":{"code":3,"message":"Bad image data."}}]}"#)
            .create_async()
            .await;

        let ocr = VisionOcr::new(&config_for(&server.url()));
        let err = ocr.extract_text(b"nope", "image/jpeg").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Extraction(ExtractionError::Api(ref m)) if m == "Bad image data."
        ));
    }
}
