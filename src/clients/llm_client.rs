//! LLM 客户端 - 外部协作方
//!
//! ## 约定
//! - 只负责"文本进、文本出"，不关心提示词内容
//! - 除缺少凭证外从不返回 `Err`：API 异常、安全拦截、空响应、超时都编码成
//!   `{"error": ..., "reason": ...}` 形式的字符串返回（软失败）
//! - 使用 `async-openai`，兼容 OpenAI 协议的服务（Gemini、Azure 等）均可

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, ConfigError, LlmError};
use crate::utils::logging::truncate_text;

/// LLM 文本补全能力
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// 凭证是否可用
    fn is_configured(&self) -> bool;

    /// 发送提示词，返回模型输出的原始文本
    ///
    /// `model_hint` 为空时使用默认模型。
    async fn complete(&self, prompt: &str, model_hint: Option<&str>) -> AppResult<String>;
}

/// 基于 OpenAI 协议的 LLM 客户端
pub struct LlmClient {
    client: Option<Client<OpenAIConfig>>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl LlmClient {
    /// 创建新的 LLM 客户端；没有 key 时客户端仍可创建，但每次调用返回配置错误
    pub fn new(config: &Config) -> Self {
        let client = config
            .llm_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .map(|key| {
                let openai_config = OpenAIConfig::new()
                    .with_api_key(key)
                    .with_api_base(&config.llm_api_base_url);
                Client::with_config(openai_config)
            });

        Self {
            client,
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            timeout: Duration::from_secs(config.llm_timeout_secs),
        }
    }

    fn build_request(
        &self,
        prompt: &str,
        model: &str,
    ) -> Result<async_openai::types::chat::CreateChatCompletionRequest, LlmError> {
        let to_build_error = |e: async_openai::error::OpenAIError| LlmError::RequestBuild {
            model: model.to_string(),
            message: e.to_string(),
        };

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(to_build_error)?;

        CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(to_build_error)
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    async fn complete(&self, prompt: &str, model_hint: Option<&str>) -> AppResult<String> {
        let Some(client) = &self.client else {
            error!("无法调用 LLM: GOOGLE_API_KEY 未配置");
            return Err(AppError::Config(ConfigError::MissingLlmCredential));
        };

        let model = model_hint.unwrap_or(&self.model_name);
        info!(
            "调用 LLM API，模型: {}，提示词预览: {}",
            model,
            truncate_text(prompt, 300)
        );

        let request = self.build_request(prompt, model)?;

        let response = match tokio::time::timeout(self.timeout, client.chat().create(request)).await
        {
            Err(_) => {
                warn!("LLM API 调用超时 ({} 秒)", self.timeout.as_secs());
                return Ok(soft_failure(
                    "Tiempo de espera agotado al llamar al LLM",
                    Some("TIMEOUT"),
                ));
            }
            Ok(Err(e)) => {
                error!("LLM API 调用失败: {}", e);
                return Ok(soft_failure(
                    &format!("Excepción crítica en la llamada al LLM: {}", e),
                    None,
                ));
            }
            Ok(Ok(response)) => response,
        };

        debug!("LLM API 调用成功");

        let Some(choice) = response.choices.first() else {
            warn!("LLM 返回结果为空");
            return Ok(soft_failure(
                "Respuesta vacía o con formato inesperado del proveedor LLM",
                None,
            ));
        };

        if let Some(content) = choice
            .message
            .content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            return Ok(content.to_string());
        }

        // 无文本：区分"被拦截 / 异常停止"与单纯的空响应
        let reason = choice.finish_reason.as_ref().map(|r| format!("{:?}", r));
        match reason.as_deref() {
            Some(r) if r != "Stop" && r != "Length" => {
                error!("LLM 生成被终止，原因: {}", r);
                Ok(soft_failure(
                    "Generación de contenido detenida por el proveedor LLM",
                    Some(r),
                ))
            }
            _ => {
                warn!("LLM 返回内容为空");
                Ok(soft_failure(
                    "Respuesta vacía o con formato inesperado del proveedor LLM",
                    None,
                ))
            }
        }
    }
}

/// 软失败载荷
pub fn soft_failure(error: &str, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => json!({ "error": error, "reason": reason }).to_string(),
        None => json!({ "error": error }).to_string(),
    }
}
