//! 单份试卷评分流水线 - 编排层
//!
//! ## 流程
//!
//! 解析下载地址 → 下载 → OCR → 规范化/过滤 → 按评分细则评分 → 组装响应
//!
//! ## 设计特点
//!
//! - **资源所有者**：持有全部协作方（LLM、OCR、下载、地址解析）
//! - **无状态**：每次调用相互独立，不缓存任何结果
//! - **边界兜底**：对外的 `evaluate_document` 从不返回 `Err`

use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::clients::{
    CompletionBackend, DocumentFetcher, HttpFetcher, LlmClient, SourceResolver, StorageResolver,
    TextExtractor, VisionOcr,
};
use crate::config::Config;
use crate::error::{AppError, AppResult, ConfigError};
use crate::models::{DirectEvaluationRequest, EvaluationResponse, EvaluationResult, HealthReport};
use crate::services::normalizer::{NormalizeContext, TextNormalizer};
use crate::utils::logging::truncate_text;
use crate::workflow::rubric_evaluator::is_blank;
use crate::workflow::stage::catch_critical;
use crate::workflow::Grader;

/// 流水线依赖的外部协作方
#[derive(Clone)]
pub struct Collaborators {
    pub llm: Arc<dyn CompletionBackend>,
    pub fetcher: Arc<dyn DocumentFetcher>,
    pub extractor: Arc<dyn TextExtractor>,
    pub resolver: Arc<dyn SourceResolver>,
}

impl Collaborators {
    /// 按配置创建真实的协作方
    pub fn from_config(config: &Config) -> Self {
        Self {
            llm: Arc::new(LlmClient::new(config)),
            fetcher: Arc::new(HttpFetcher::new(config)),
            extractor: Arc::new(VisionOcr::new(config)),
            resolver: Arc::new(StorageResolver::from_config(config)),
        }
    }
}

/// 一份试卷处理完成后的中间结果
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub result: EvaluationResult,
    pub text_length: usize,
    pub download_url: String,
}

/// 评分流水线
pub struct GradingPipeline {
    collaborators: Collaborators,
    normalizer: TextNormalizer,
    grader: Grader,
    model_name: String,
    vision_configured: bool,
}

impl GradingPipeline {
    pub fn new(config: &Config, collaborators: Collaborators) -> Self {
        let normalizer = TextNormalizer::new(
            collaborators.llm.clone(),
            Some(config.normalizer_model().to_string()),
        );
        let grader = Grader::new(collaborators.llm.clone());

        Self {
            collaborators,
            normalizer,
            grader,
            model_name: config.llm_model_name.clone(),
            vision_configured: config.vision_key().is_some(),
        }
    }

    /// 按配置创建流水线
    pub fn from_config(config: &Config) -> Self {
        Self::new(config, Collaborators::from_config(config))
    }

    pub fn grader(&self) -> &Grader {
        &self.grader
    }

    pub fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }

    /// LLM 凭证缺失时评分不可能成功，在解析地址和下载之前拒绝
    pub fn ensure_llm_configured(&self) -> AppResult<()> {
        if self.collaborators.llm.is_configured() {
            Ok(())
        } else {
            Err(ConfigError::MissingLlmCredential.into())
        }
    }

    /// 处理一份试卷（不含计时与响应组装）
    ///
    /// # 参数
    /// - `test_url` / `test_key`: 文件来源，至少提供一个
    /// - `rubric`: 评分细则
    ///
    /// # 返回
    /// 任何阶段失败都返回 `Err`；评分结果带错误时也视为失败
    pub async fn process_document(
        &self,
        test_url: Option<&str>,
        test_key: Option<&str>,
        rubric: &JsonValue,
    ) -> AppResult<ProcessedDocument> {
        self.ensure_llm_configured()?;

        let download_url = self.collaborators.resolver.resolve(test_url, test_key)?;

        let document = self
            .collaborators
            .fetcher
            .fetch_document(&download_url)
            .await?;

        let raw_text = self
            .collaborators
            .extractor
            .extract_text(&document.bytes, &document.mime_hint)
            .await?;

        if raw_text.trim().is_empty() {
            return Err(AppError::input("No se pudo extraer texto de la prueba"));
        }
        info!(
            "📄 OCR 文本 {} 个字符，预览: {}",
            raw_text.chars().count(),
            truncate_text(&raw_text, 100)
        );

        let text = self
            .normalizer
            .normalize(&raw_text, NormalizeContext::Exam, true)
            .await;

        let result = self.grader.rubric().evaluate_with_rubric(&text, rubric).await;
        if let Some(message) = result.error_message() {
            return Err(AppError::Evaluation(message.to_string()));
        }

        Ok(ProcessedDocument {
            result,
            text_length: text.chars().count(),
            download_url,
        })
    }

    /// 单份试卷评分
    ///
    /// 总是返回响应；失败时 `status = error` 并带 `error` 字段。
    pub async fn evaluate_document(&self, request: &DirectEvaluationRequest) -> EvaluationResponse {
        let start = Instant::now();

        if let Err(e) = self.ensure_llm_configured() {
            error!("❌ {}", e);
            return EvaluationResponse::failed(
                e.to_string(),
                format!("Error durante la evaluación: {}", e),
                None,
                start.elapsed().as_secs_f64(),
            );
        }

        if let Err(message) = validate_request(request) {
            error!("❌ 请求参数不完整: {}", message);
            return EvaluationResponse::failed(
                message.clone(),
                message,
                None,
                start.elapsed().as_secs_f64(),
            );
        }

        info!(
            "📝 开始评分: {}",
            request
                .test_data
                .get("name")
                .and_then(JsonValue::as_str)
                .unwrap_or("(sin nombre)")
        );

        let outcome = catch_critical(
            "evaluate_document",
            self.process_document(
                request.test_url.as_deref(),
                request.test_key.as_deref(),
                &request.rubric_data,
            ),
            |msg| Err(AppError::Other(format!("Error crítico: {}", msg))),
        )
        .await;
        let elapsed = start.elapsed().as_secs_f64();

        match outcome {
            Ok(processed) => {
                info!(
                    "✅ 评分完成: {:.1} 分，耗时 {:.2} 秒",
                    processed.result.overall_score, elapsed
                );
                let metadata = document_metadata(request, &processed);
                EvaluationResponse::completed(processed.result, metadata, elapsed)
            }
            Err(e) => {
                error!("❌ 评分失败: {}", e);
                EvaluationResponse::failed(
                    e.to_string(),
                    format!("Error durante la evaluación: {}", e),
                    None,
                    elapsed,
                )
            }
        }
    }

    /// 服务状态
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            llm_configured: self.collaborators.llm.is_configured(),
            vision_configured: self.vision_configured,
            model: self.model_name.clone(),
        }
    }
}

fn validate_request(request: &DirectEvaluationRequest) -> Result<(), String> {
    let has_source = [&request.test_url, &request.test_key]
        .iter()
        .any(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()));

    if !has_source || is_blank(&request.rubric_data) {
        return Err("(test_url o test_key) y rubric_data son requeridos".to_string());
    }
    Ok(())
}

fn document_metadata(
    request: &DirectEvaluationRequest,
    processed: &ProcessedDocument,
) -> JsonValue {
    let field = |map: &Map<String, JsonValue>, key: &str| {
        map.get(key).cloned().unwrap_or(JsonValue::Null)
    };
    let rubric_name = request
        .rubric_data
        .get("name")
        .cloned()
        .unwrap_or(JsonValue::Null);

    json!({
        "test_name": field(&request.test_data, "name"),
        "test_id": field(&request.test_data, "id"),
        "rubric_name": rubric_name,
        "text_length": processed.text_length,
        "original_url": request.test_url,
        "original_key": request.test_key,
        "download_url": processed.download_url,
    })
}
