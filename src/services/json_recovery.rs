//! 从 LLM 自由文本中恢复 JSON
//!
//! 提示词要求模型只输出 JSON，但模型并不总是照做：常见的是 markdown 代码块、
//! 前后夹带说明文字、以及被截断的输出。按以下顺序尝试，第一个成功即返回：
//!
//! 1. 整段文本直接解析
//! 2. 找到 ```` ```json ```` 代码块则解析其内部
//! 3. 取第一个 `{` 到最后一个 `}`、第一个 `[` 到最后一个 `]` 两个片段；
//!    两者都存在时，数组片段完全包住对象片段才选数组，否则选对象
//! 4. 仍然失败 → `MalformedResponse`
//!
//! 第 3 步是启发式的：对象和数组交错嵌套时可能选错片段，这里保持原样不做更严格的配对。

use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::utils::logging::truncate_text;

/// 诊断信息中保留的原文长度
pub const PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum JsonRecoveryError {
    /// 所有策略都没能得到合法 JSON
    #[error("no se pudo extraer JSON de la respuesta: {preview}")]
    MalformedResponse { preview: String },
}

impl JsonRecoveryError {
    fn malformed(text: &str) -> Self {
        JsonRecoveryError::MalformedResponse {
            preview: text.chars().take(PREVIEW_CHARS).collect(),
        }
    }
}

fn fenced_json_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("静态正则"))
}

/// 从文本中恢复一个 JSON 值
pub fn recover_json(text: &str) -> Result<JsonValue, JsonRecoveryError> {
    if let Ok(value) = serde_json::from_str::<JsonValue>(text) {
        return Ok(value);
    }

    debug!(
        "直接解析 JSON 失败，尝试清理: {}",
        truncate_text(text, 200)
    );

    let candidate = match extract_fenced_block(text) {
        Some(inner) => {
            debug!("从 ```json``` 代码块中提取 JSON");
            Some(inner)
        }
        None => extract_balanced_span(text),
    };

    let Some(candidate) = candidate else {
        warn!("无法提取候选 JSON 片段: {}", truncate_text(text, PREVIEW_CHARS));
        return Err(JsonRecoveryError::malformed(text));
    };

    serde_json::from_str(candidate).map_err(|e| {
        warn!(
            "清理后 JSON 解析仍失败: {} | 片段: {}",
            e,
            truncate_text(candidate, PREVIEW_CHARS)
        );
        JsonRecoveryError::malformed(text)
    })
}

/// ```` ```json ... ``` ```` 代码块的内部
fn extract_fenced_block(text: &str) -> Option<&str> {
    fenced_json_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// 首尾括号启发式
fn extract_balanced_span(text: &str) -> Option<&str> {
    let object = span_between(text, '{', '}');
    let array = span_between(text, '[', ']');

    let (start, end) = match (object, array) {
        (Some(obj), Some(arr)) => {
            if arr.0 < obj.0 && arr.1 > obj.1 {
                arr
            } else {
                obj
            }
        }
        (Some(obj), None) => obj,
        (None, Some(arr)) => arr,
        (None, None) => return None,
    };

    debug!("通过括号启发式提取 JSON 片段");
    Some(text[start..=end].trim())
}

/// 第一个 `open` 与最后一个 `close` 的字节位置（要求 open 在前）
fn span_between(text: &str, open: char, close: char) -> Option<(usize, usize)> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (start < end).then_some((start, end))
}

/// LLM 软失败：解析结果是带 `error` 键的对象
///
/// 返回 `reason`（没有则用 `error` 本身）作为错误描述。
pub fn soft_failure_detail(value: &JsonValue) -> Option<String> {
    let obj = value.as_object()?;
    let error = obj.get("error")?;
    let detail = obj.get("reason").unwrap_or(error);
    Some(match detail {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_parse() {
        let value = json!({"overall_score": 80, "detailed_scores": {"Q1": {"score": 8}}});
        assert_eq!(recover_json(&value.to_string()).unwrap(), value);

        let array = json!([1, "dos", {"tres": 3}]);
        assert_eq!(recover_json(&array.to_string()).unwrap(), array);

        assert_eq!(recover_json("42").unwrap(), json!(42));
    }

    #[test]
    fn test_fenced_block() {
        let text = "Aquí está la evaluación:\n```json\n{\"score\": 7, \"feedback\": \"Bien\"}\n```\nSaludos.";
        assert_eq!(
            recover_json(text).unwrap(),
            json!({"score": 7, "feedback": "Bien"})
        );
    }

    #[test]
    fn test_fenced_block_with_array() {
        let text = "```json\n[{\"id\": \"1\"}, {\"id\": \"2\"}]\n```";
        assert_eq!(
            recover_json(text).unwrap(),
            json!([{"id": "1"}, {"id": "2"}])
        );
    }

    #[test]
    fn test_object_surrounded_by_prose() {
        let text = "Claro, este es el resultado {\"a\": {\"b\": [1, 2]}} espero que sirva";
        assert_eq!(recover_json(text).unwrap(), json!({"a": {"b": [1, 2]}}));
    }

    #[test]
    fn test_array_surrounded_by_prose() {
        let text = "Resultado: [1, 2, 3]. Fin";
        assert_eq!(recover_json(text).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn test_array_containing_objects_wins() {
        let text = "Lista: [{\"id\": 1}, {\"id\": 2}] listo";
        assert_eq!(recover_json(text).unwrap(), json!([{"id": 1}, {"id": 2}]));
    }

    #[test]
    fn test_object_containing_array_wins() {
        let text = "Salida -> {\"questions\": [{\"id\": \"1\"}]} <- fin";
        assert_eq!(
            recover_json(text).unwrap(),
            json!({"questions": [{"id": "1"}]})
        );
    }

    #[test]
    fn test_no_span_fails_with_preview() {
        let text = "Lo siento, no puedo evaluar este documento.";
        let err = recover_json(text).unwrap_err();
        assert_eq!(
            err,
            JsonRecoveryError::MalformedResponse {
                preview: text.to_string()
            }
        );
    }

    #[test]
    fn test_preview_is_truncated() {
        let text = "x".repeat(2000);
        let JsonRecoveryError::MalformedResponse { preview } = recover_json(&text).unwrap_err();
        assert_eq!(preview.chars().count(), PREVIEW_CHARS);
    }

    #[test]
    fn test_truncated_output_fails() {
        let text = "{\"detailed_scores\": {\"Q1\": {\"score\": 8";
        assert!(recover_json(text).is_err());
    }

    #[test]
    fn test_invalid_fenced_block_fails() {
        let text = "```json\n{roto\n```  pero {\"a\": 1}";
        assert!(recover_json(text).is_err());
    }

    /// 已知局限：两个并列对象之间夹杂文字时，首尾括号片段跨越了两者
    #[test]
    fn test_sibling_objects_are_not_split() {
        let text = "{\"a\": 1} y también {\"b\": 2}";
        assert!(recover_json(text).is_err());
    }

    #[test]
    fn test_soft_failure_detail() {
        let value = json!({"error": "Generación detenida", "reason": "SAFETY"});
        assert_eq!(soft_failure_detail(&value).as_deref(), Some("SAFETY"));

        let value = json!({"error": "Respuesta vacía"});
        assert_eq!(soft_failure_detail(&value).as_deref(), Some("Respuesta vacía"));

        assert!(soft_failure_detail(&json!({"score": 3})).is_none());
        assert!(soft_failure_detail(&json!([{"error": "x"}])).is_none());
    }
}
