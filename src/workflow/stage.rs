//! 评分阶段的公共步骤
//!
//! - `complete_json`：调用 LLM → 恢复 JSON → 识别软失败
//! - `finalize_scored_response`：把 LLM 的评分 JSON 换算成 `EvaluationResult`
//! - `catch_critical`：入口处兜底，把 panic 变成 `error_critical`

use futures::FutureExt;
use serde_json::{Map, Value as JsonValue};
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{error, warn};

use crate::clients::CompletionBackend;
use crate::error::{ConfigError, StageError, StageOutcome};
use crate::models::{DetailedScoreItem, ErrorKind, Evaluation, EvaluationResult};
use crate::services::json_recovery::{recover_json, soft_failure_detail};
use crate::services::scoring::{rescale_item, rescale_percentage, MIN_GRADE};
use crate::utils::logging::truncate_text;

/// 评分结果未给出置信度时的默认值
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// 调用 LLM 并解析为 JSON
///
/// # 返回
/// - `Err(Config)`: 凭证缺失
/// - `Err(Api)`: LLM 软失败
/// - `Err(Parsing)`: 无法恢复 JSON
/// - `Err(Critical)`: 其他错误
pub async fn complete_json(
    llm: &dyn CompletionBackend,
    prompt: &str,
    stage: &str,
) -> StageOutcome<JsonValue> {
    let response = llm.complete(prompt, None).await.map_err(|e| {
        error!("[{}] LLM 调用失败: {}", stage, e);
        StageError::from(e)
    })?;

    let value = recover_json(&response).map_err(|e| {
        error!(
            "[{}] 无法解析 LLM 返回的 JSON，原始响应: {}",
            stage,
            truncate_text(&response, 500)
        );
        StageError::Parsing(e.to_string())
    })?;

    if let Some(detail) = soft_failure_detail(&value) {
        error!("[{}] LLM 返回错误: {}", stage, detail);
        return Err(StageError::Api(detail));
    }

    Ok(value)
}

/// 把 LLM 的整卷评分 JSON 换算为结果
///
/// - `overall_score` 视为 0-100 百分比，缺失或非数值时取最低分
/// - 每道题的 `score` 视为 0-10，原值保留在 `original_score_0_10`
/// - 反馈、置信度缺失时使用默认值
pub fn finalize_scored_response(
    value: &JsonValue,
    default_feedback: &str,
) -> StageOutcome<EvaluationResult> {
    let Some(obj) = value.as_object() else {
        return Err(StageError::Parsing(format!(
            "La respuesta del LLM no es un objeto JSON: {}",
            truncate_text(&value.to_string(), 200)
        )));
    };

    let (overall_score, original_percentage) = match obj
        .get("overall_score")
        .and_then(JsonValue::as_f64)
    {
        Some(percentage) => (rescale_percentage(percentage), Some(percentage)),
        None => {
            warn!("LLM 未返回数值型 overall_score，使用最低分");
            (MIN_GRADE, None)
        }
    };

    let detailed_scores = obj
        .get("detailed_scores")
        .and_then(JsonValue::as_object)
        .map(|items| {
            items
                .iter()
                .map(|(id, item)| (id.clone(), item_from_llm(item)))
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    let general_feedback = obj
        .get("general_feedback")
        .and_then(JsonValue::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_feedback);

    let confidence = obj
        .get("confidence")
        .and_then(JsonValue::as_f64)
        .unwrap_or(DEFAULT_CONFIDENCE);

    let mut result =
        EvaluationResult::completed(general_feedback, overall_score, confidence, detailed_scores);
    result.original_overall_score_percentage = original_percentage;
    Ok(result)
}

/// 单题评分项
fn item_from_llm(item: &JsonValue) -> DetailedScoreItem {
    let Some(fields) = item.as_object() else {
        return DetailedScoreItem {
            student_answer: "No provista".to_string(),
            correct_answer: "No provista".to_string(),
            evaluation: Evaluation::FormatError,
            feedback: format!(
                "Formato inesperado en la evaluación: {}",
                truncate_text(&item.to_string(), 200)
            ),
            score: MIN_GRADE,
            original_score_0_10: 0.0,
            extra: Map::new(),
        };
    };

    let text = |key: &str, default: &str| {
        fields
            .get(key)
            .and_then(crate::models::structure::scalar_to_string)
            .unwrap_or_else(|| default.to_string())
    };

    let (score, original) = match fields.get("score").and_then(JsonValue::as_f64) {
        Some(raw) => (rescale_item(raw), raw),
        None => (MIN_GRADE, 0.0),
    };

    let extra = fields
        .iter()
        .filter(|(k, _)| !KNOWN_ITEM_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    DetailedScoreItem {
        student_answer: text("student_answer", "No provista"),
        correct_answer: text("correct_answer", "No provista"),
        evaluation: fields
            .get("evaluation")
            .and_then(JsonValue::as_str)
            .map(Evaluation::from_label)
            .unwrap_or_else(|| Evaluation::Other("No evaluado".to_string())),
        feedback: text("feedback", "Sin feedback específico."),
        score,
        original_score_0_10: original,
        extra,
    }
}

const KNOWN_ITEM_FIELDS: &[&str] = &[
    "student_answer",
    "correct_answer",
    "evaluation",
    "feedback",
    "score",
    "original_score_0_10",
];

/// 失败时给调用方看的反馈
pub fn failure_feedback(err: &StageError) -> String {
    match err {
        StageError::Config(detail) => format!("Error de configuración: {}", detail),
        StageError::Api(detail) => format!("Error API: {}", detail),
        StageError::Parsing(_) => {
            "Error: La respuesta del modelo no fue un JSON válido.".to_string()
        }
        StageError::Critical(detail) => {
            format!("Error crítico durante la evaluación: {}", detail)
        }
        StageError::Dependency { detail, .. } | StageError::Prerequisite(detail) => {
            format!("Error previo impidió la evaluación: {}", detail)
        }
    }
}

/// 兜底的 `error_critical` 结果
pub fn critical_result(message: impl Into<String>) -> EvaluationResult {
    let err = StageError::Critical(message.into());
    EvaluationResult::from_stage_error(&err, failure_feedback(&err))
}

/// 凭证缺失时的 `error_config` 结果
pub fn unconfigured_result() -> EvaluationResult {
    EvaluationResult::failed(
        ErrorKind::Config,
        format!(
            "Configuración API incompleta: {}",
            ConfigError::MissingLlmCredential
        ),
        "Error de configuración: GOOGLE_API_KEY no encontrada.",
    )
}

/// 运行入口 future，panic 时调用 `on_panic` 构造兜底结果
pub async fn catch_critical<T, F>(entry: &str, fut: F, on_panic: impl FnOnce(String) -> T) -> T
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(value) => value,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("[{}] 发生未预期的错误: {}", entry, message);
            on_panic(message)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "error desconocido".to_string()
    }
}
