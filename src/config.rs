use serde::Deserialize;
use std::path::Path;
use tracing::{error, info, warn};

use crate::error::ConfigError;

/// 程序配置
///
/// 启动时构建一次，显式传入流水线；缺少 LLM 凭证不会阻止启动，
/// 而是让每个入口返回 `error_config`。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_key: Option<String>,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 文本规范化使用的模型（为空则沿用 `llm_model_name`）
    pub normalizer_model_name: Option<String>,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    /// 单次 LLM 调用超时（秒）
    pub llm_timeout_secs: u64,
    // --- OCR 配置 ---
    pub vision_api_key: Option<String>,
    pub vision_api_base_url: String,
    /// PDF 渲染分辨率
    pub pdf_render_dpi: u32,
    // --- 存储配置 ---
    /// 用 test_key 拼接下载地址的公共前缀
    pub storage_public_base_url: Option<String>,
    /// 文件下载 / OCR 请求超时（秒）
    pub http_timeout_secs: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: None,
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-2.0-flash-lite".to_string(),
            normalizer_model_name: None,
            llm_temperature: 0.2,
            llm_max_tokens: 8192,
            llm_timeout_secs: 120,
            vision_api_key: None,
            vision_api_base_url: "https://vision.googleapis.com/v1".to_string(),
            pdf_render_dpi: 300,
            storage_public_base_url: None,
            http_timeout_secs: 60,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 读取 TOML 配置文件，再用环境变量覆盖
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_toml_str(&content, &path.display().to_string())?;
        Ok(config.with_env_overrides())
    }

    fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFile {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    fn with_env_overrides(self) -> Self {
        Self {
            llm_api_key: env_string("GOOGLE_API_KEY")
                .or_else(|| env_string("LLM_API_KEY"))
                .or(self.llm_api_key),
            llm_api_base_url: env_string("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: env_string("GOOGLE_MODEL_NAME")
                .or_else(|| env_string("LLM_MODEL_NAME"))
                .unwrap_or(self.llm_model_name),
            normalizer_model_name: env_string("NORMALIZER_MODEL_NAME")
                .or(self.normalizer_model_name),
            llm_temperature: env_parse("LLM_TEMPERATURE").unwrap_or(self.llm_temperature),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS").unwrap_or(self.llm_max_tokens),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS").unwrap_or(self.llm_timeout_secs),
            vision_api_key: env_string("GOOGLE_VISION_API_KEY").or(self.vision_api_key),
            vision_api_base_url: env_string("VISION_API_BASE_URL")
                .unwrap_or(self.vision_api_base_url),
            pdf_render_dpi: env_parse("PDF_RENDER_DPI").unwrap_or(self.pdf_render_dpi),
            storage_public_base_url: env_string("STORAGE_PUBLIC_BASE_URL")
                .or(self.storage_public_base_url),
            http_timeout_secs: env_parse("HTTP_TIMEOUT_SECS").unwrap_or(self.http_timeout_secs),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(self.verbose_logging),
        }
    }

    /// LLM 凭证是否可用
    pub fn llm_configured(&self) -> bool {
        self.llm_api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// OCR 使用的凭证：优先 Vision 专用 key，否则复用 LLM key
    pub fn vision_key(&self) -> Option<&str> {
        self.vision_api_key
            .as_deref()
            .or(self.llm_api_key.as_deref())
            .filter(|k| !k.trim().is_empty())
    }

    /// 规范化阶段的模型提示
    pub fn normalizer_model(&self) -> &str {
        self.normalizer_model_name
            .as_deref()
            .unwrap_or(&self.llm_model_name)
    }

    /// 启动时检查一次配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.llm_configured() {
            error!("‼️ GOOGLE_API_KEY 未配置，所有评分入口将返回 error_config");
            return Err(ConfigError::MissingLlmCredential);
        }
        info!("✓ LLM 凭证已配置，模型: {}", self.llm_model_name);
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// 解析失败时记录警告并回退到已有值
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            let err = ConfigError::EnvVarParseFailed {
                var_name: name.to_string(),
                value: raw,
                expected_type: std::any::type_name::<T>().to_string(),
            };
            warn!("⚠️ {}，忽略该环境变量", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_credentials() {
        let config = Config::default();
        assert!(!config.llm_configured());
        assert!(config.vision_key().is_none());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_key_is_not_configured() {
        let config = Config {
            llm_api_key: Some("   ".to_string()),
            ..Config::default()
        };
        assert!(!config.llm_configured());
    }

    #[test]
    fn test_vision_key_falls_back_to_llm_key() {
        let config = Config {
            llm_api_key: Some("llm-key".to_string()),
            ..Config::default()
        };
        assert_eq!(config.vision_key(), Some("llm-key"));
        assert_eq!(config.normalizer_model(), "gemini-2.0-flash-lite");
    }

    #[test]
    fn test_from_toml_str_overrides_defaults() {
        let config = Config::from_toml_str(
            r#"
            llm_model_name = "gemini-1.5-pro"
            pdf_render_dpi = 150
            storage_public_base_url = "https://files.example.com"
            "#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.llm_model_name, "gemini-1.5-pro");
        assert_eq!(config.pdf_render_dpi, 150);
        assert_eq!(config.http_timeout_secs, 60);
        assert_eq!(
            config.storage_public_base_url.as_deref(),
            Some("https://files.example.com")
        );
    }

    #[test]
    fn test_invalid_toml_reports_origin() {
        let err = Config::from_toml_str("pdf_render_dpi = \"alto\"", "grader.toml").unwrap_err();
        assert!(err.to_string().contains("grader.toml"));
    }
}
