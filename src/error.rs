//! 错误类型
//!
//! 分两层：
//! - `AppError`：协作方（配置、下载、OCR、LLM）返回的真实错误，用 `?` 传播
//! - `StageError`：评分各阶段之间的"带标签结果"，最终落到返回给调用方的
//!   `error_*` 字段上，从不向调用方抛出

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::models::ErrorKind;

/// 应用程序错误类型
///
/// `Display` 文本会写进返回给调用方的 `error` 字段，因此使用西班牙语。
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// 文件下载错误
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// OCR 文字提取错误
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// LLM 服务错误
    #[error(transparent)]
    Llm(#[from] LlmError),
    /// 请求参数错误
    #[error("{0}")]
    Input(String),
    /// 评分流程返回了错误结果
    #[error("Error en evaluación IA: {0}")]
    Evaluation(String),
    /// 其他错误（用于包装第三方库错误）
    #[error("{0}")]
    Other(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// LLM 凭证缺失
    #[error("API Key de Google no configurada. La evaluación no puede continuar.")]
    MissingLlmCredential,
    /// OCR 凭证缺失
    #[error("API Key de Google Vision no configurada")]
    MissingVisionCredential,
    /// 环境变量解析失败
    #[error("Variable de entorno {var_name} inválida: '{value}' no es {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取或解析失败
    #[error("Archivo de configuración {path} inválido: {message}")]
    InvalidFile { path: String, message: String },
}

/// 下载错误
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL 非法（只接受 http/https 且必须带域名）
    #[error("URL inválida: {reason}")]
    InvalidUrl { reason: String },
    /// 提交里既没有 url 也没有 key
    #[error("submission sin test_url ni test_key")]
    MissingSource,
    /// 只有 key，但没有配置存储地址
    #[error("no hay resolvedor de almacenamiento configurado para la key {key}")]
    UnresolvableKey { key: String },
    /// 网络请求失败
    #[error("Error descargando archivo ({url}): {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// 服务端返回非 200
    #[error("Error al descargar: HTTP {status} ({url})")]
    BadStatus { url: String, status: u16 },
}

/// OCR 文字提取错误
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Vision API 请求失败
    #[error("Fallo en la solicitud a Google Cloud Vision: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// Vision API 返回错误信息
    #[error("Google Cloud Vision API error: {0}")]
    Api(String),
    /// PDF 转图片失败
    #[error("Fallo en la conversión de PDF a imágenes: {0}")]
    PdfRender(String),
    /// 临时文件读写失败
    #[error("Error de archivo temporal: {0}")]
    Io(#[from] std::io::Error),
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// 构建请求失败
    #[error("No se pudo construir la solicitud al LLM (modelo {model}): {message}")]
    RequestBuild { model: String, message: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建输入错误
    pub fn input(message: impl Into<String>) -> Self {
        AppError::Input(message.into())
    }

    /// 创建下载失败错误
    pub fn fetch_failed(url: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::Fetch(FetchError::RequestFailed {
            url: url.into(),
            source,
        })
    }

    /// 是否为配置错误
    pub fn is_config(&self) -> bool {
        matches!(self, AppError::Config(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("Error de serialización JSON: {}", err))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

// ========== 阶段错误 ==========

/// 评分阶段的失败结果
///
/// 每个 LLM 阶段返回 `StageOutcome<T>`，下游阶段据此决定降级或短路。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    /// 凭证或配置缺失
    #[error("{0}")]
    Config(String),
    /// LLM 后端自身报告失败（安全拦截、提前停止、空响应）
    #[error("{0}")]
    Api(String),
    /// JSON 恢复的所有策略都失败
    #[error("{0}")]
    Parsing(String),
    /// 其他意外错误
    #[error("{0}")]
    Critical(String),
    /// 上游阶段已失败，未调用 LLM
    #[error("{detail}")]
    Dependency { detail: String, details: JsonValue },
    /// 前置结果是错误哨兵
    #[error("{0}")]
    Prerequisite(String),
}

impl StageError {
    /// 映射到结果上的错误标签
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Config(_) => ErrorKind::Config,
            StageError::Api(_) => ErrorKind::Api,
            StageError::Parsing(_) => ErrorKind::Parsing,
            StageError::Critical(_) => ErrorKind::Critical,
            StageError::Dependency { .. } => ErrorKind::Dependency,
            StageError::Prerequisite(_) => ErrorKind::Prerequisite,
        }
    }

    /// 错误描述
    pub fn detail(&self) -> String {
        self.to_string()
    }

    /// 序列化为旧版哨兵形式（`{"error_xxx": detail}`），用于日志和依赖错误的 details
    pub fn to_sentinel(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        map.insert(
            self.kind().field_name().to_string(),
            JsonValue::String(self.detail()),
        );
        if let StageError::Dependency { details, .. } = self {
            map.insert("details".to_string(), details.clone());
        }
        JsonValue::Object(map)
    }
}

impl From<AppError> for StageError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Config(e) => StageError::Config(e.to_string()),
            other => StageError::Critical(other.to_string()),
        }
    }
}

/// 阶段结果类型
pub type StageOutcome<T> = Result<T, StageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_kind_mapping() {
        assert_eq!(StageError::Api("x".into()).kind(), ErrorKind::Api);
        assert_eq!(StageError::Parsing("x".into()).kind(), ErrorKind::Parsing);
        assert_eq!(
            StageError::Prerequisite("x".into()).kind(),
            ErrorKind::Prerequisite
        );
    }

    #[test]
    fn test_config_app_error_becomes_config_stage_error() {
        let stage: StageError = AppError::from(ConfigError::MissingLlmCredential).into();
        assert_eq!(stage.kind(), ErrorKind::Config);

        let stage: StageError = AppError::input("vacío").into();
        assert_eq!(stage.kind(), ErrorKind::Critical);
    }

    #[test]
    fn test_dependency_sentinel_carries_details() {
        let err = StageError::Dependency {
            detail: "La estructura previa falló.".into(),
            details: serde_json::json!({"error_api": "SAFETY"}),
        };
        let sentinel = err.to_sentinel();
        assert_eq!(sentinel["error_dependency"], "La estructura previa falló.");
        assert_eq!(sentinel["details"]["error_api"], "SAFETY");
    }
}
