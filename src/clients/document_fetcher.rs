//! 试卷文件下载
//!
//! - `SourceResolver`：把提交里的 url / key 解析成下载地址（签名由存储方负责）
//! - `DocumentFetcher`：按地址下载文件字节

use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, FetchError};

/// 下载得到的文件
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub bytes: Vec<u8>,
    pub file_name: String,
    /// MIME 提示，供 OCR 判断是否为 PDF
    pub mime_hint: String,
}

/// 文件下载能力
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch_document(&self, url: &str) -> AppResult<FetchedDocument>;
}

/// 下载地址解析能力
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, test_url: Option<&str>, test_key: Option<&str>) -> AppResult<String>;
}

/// 基于公共存储前缀的解析器：key 优先，其次直接 url
pub struct StorageResolver {
    public_base_url: Option<String>,
}

impl StorageResolver {
    pub fn new(public_base_url: Option<String>) -> Self {
        Self { public_base_url }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.storage_public_base_url.clone())
    }
}

impl SourceResolver for StorageResolver {
    fn resolve(&self, test_url: Option<&str>, test_key: Option<&str>) -> AppResult<String> {
        let test_url = test_url.filter(|u| !u.trim().is_empty());
        let test_key = test_key.filter(|k| !k.trim().is_empty());

        match (test_key, &self.public_base_url, test_url) {
            (Some(key), Some(base), _) => {
                let url = format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    key.trim_start_matches('/')
                );
                info!("由 key 生成下载地址: {}", key);
                Ok(url)
            }
            (Some(key), None, Some(url)) => {
                warn!("未配置存储地址，忽略 key {} 并使用直接 url", key);
                Ok(url.to_string())
            }
            (Some(key), None, None) => Err(FetchError::UnresolvableKey {
                key: key.to_string(),
            }
            .into()),
            (None, _, Some(url)) => Ok(url.to_string()),
            (None, _, None) => Err(FetchError::MissingSource.into()),
        }
    }
}

/// HTTP 下载器
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("创建 HTTP 客户端失败，使用默认配置: {}", e);
                reqwest::Client::new()
            });
        Self { client }
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch_document(&self, url: &str) -> AppResult<FetchedDocument> {
        let parsed = validate_url(url)?;
        let file_name = file_name_from_url(&parsed);

        info!("📥 正在下载文件: {}", url);

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| AppError::fetch_failed(url, e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::BadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty() && v != "application/octet-stream");

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::fetch_failed(url, e))?
            .to_vec();

        let mime_hint = header_mime.unwrap_or_else(|| {
            mime_guess::from_path(&file_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });

        info!(
            "✓ 文件下载完成: {} ({} 字节, {})",
            file_name,
            bytes.len(),
            mime_hint
        );

        Ok(FetchedDocument {
            bytes,
            file_name,
            mime_hint,
        })
    }
}

/// 只接受带域名的 http/https 地址
fn validate_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        reason: e.to_string(),
    })?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(FetchError::InvalidUrl {
            reason: format!(
                "Solo se aceptan URLs HTTP/HTTPS. Recibido: {}://",
                parsed.scheme()
            ),
        });
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(FetchError::InvalidUrl {
            reason: "Falta el dominio.".to_string(),
        });
    }

    Ok(parsed)
}

fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "documento.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_rejects_other_schemes() {
        assert!(validate_url("ftp://files.example.com/a.pdf").is_err());
        assert!(validate_url("file:///tmp/a.pdf").is_err());
        assert!(validate_url("no es una url").is_err());
        assert!(validate_url("https://files.example.com/a.pdf").is_ok());
    }

    #[test]
    fn test_file_name_from_url() {
        let url = Url::parse("https://files.example.com/tests/prueba_1.png?sig=abc").unwrap();
        assert_eq!(file_name_from_url(&url), "prueba_1.png");

        let url = Url::parse("https://files.example.com/").unwrap();
        assert_eq!(file_name_from_url(&url), "documento.pdf");
    }

    #[test]
    fn test_resolver_prefers_key() {
        let resolver = StorageResolver::new(Some("https://files.example.com/bucket/".into()));
        let url = resolver
            .resolve(
                Some("https://direct.example.com/a.pdf"),
                Some("/tests/7.pdf"),
            )
            .unwrap();
        assert_eq!(url, "https://files.example.com/bucket/tests/7.pdf");
    }

    #[test]
    fn test_resolver_falls_back_to_url() {
        let resolver = StorageResolver::new(None);
        assert_eq!(
            resolver
                .resolve(
                    Some("https://direct.example.com/a.pdf"),
                    Some("tests/7.pdf")
                )
                .unwrap(),
            "https://direct.example.com/a.pdf"
        );
        assert!(matches!(
            resolver.resolve(None, Some("tests/7.pdf")),
            Err(AppError::Fetch(FetchError::UnresolvableKey { .. }))
        ));
        assert!(matches!(
            resolver.resolve(Some("  "), None),
            Err(AppError::Fetch(FetchError::MissingSource))
        ));
    }

    #[tokio::test]
    async fn test_fetch_document_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/tests/prueba.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(vec![0x89, b'P', b'N', b'G'])
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&Config::default());
        let doc = fetcher
            .fetch_document(&format!("{}/tests/prueba.png", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(doc.file_name, "prueba.png");
        assert_eq!(doc.mime_hint, "image/png");
        assert_eq!(doc.bytes, vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn test_fetch_document_guesses_mime_from_name() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/prueba.pdf")
            .with_status(200)
            .with_body("%PDF-1.4")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&Config::default());
        let doc = fetcher
            .fetch_document(&format!("{}/prueba.pdf", server.url()))
            .await
            .unwrap();
        assert_eq!(doc.mime_hint, "application/pdf");
    }

    #[tokio::test]
    async fn test_fetch_document_bad_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.pdf")
            .with_status(403)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&Config::default());
        let err = fetcher
            .fetch_document(&format!("{}/missing.pdf", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::Fetch(FetchError::BadStatus { status: 403, .. })
        ));
    }
}
