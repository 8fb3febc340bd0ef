//! 评分结果模型
//!
//! 分数一律在 1-7 区间；无法计算时 `overall_score` 为 1.0、`confidence` 为 0。

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::StageError;
use crate::services::scoring::{clamp_grade, MIN_GRADE};

/// 评分状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalStatus {
    Completed,
    Error,
}

/// 错误标签，序列化为结果上的 `error_*` 字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 输入为空等请求层面的问题，只写 `error`
    Input,
    Config,
    Api,
    Parsing,
    Critical,
    Dependency,
    Prerequisite,
    DetailExtraction,
}

impl ErrorKind {
    pub fn field_name(self) -> &'static str {
        match self {
            ErrorKind::Input => "error",
            ErrorKind::Config => "error_config",
            ErrorKind::Api => "error_api",
            ErrorKind::Parsing => "error_parsing",
            ErrorKind::Critical => "error_critical",
            ErrorKind::Dependency => "error_dependency",
            ErrorKind::Prerequisite => "error_prerequisite",
            ErrorKind::DetailExtraction => "error_detail_extraction",
        }
    }
}

/// 单题 / 单项评价
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Evaluation {
    Correct,
    PartiallyCorrect,
    Incorrect,
    NotAnswered,
    /// LLM 没有为该题返回有效评价
    FormatError,
    /// 评分标准路径下 LLM 自由填写的评价
    Other(String),
}

static EVALUATION_LABELS: phf::Map<&'static str, Evaluation> = phf::phf_map! {
    "correcta" => Evaluation::Correct,
    "correct" => Evaluation::Correct,
    "parcialmente correcta" => Evaluation::PartiallyCorrect,
    "partially correct" => Evaluation::PartiallyCorrect,
    "incorrecta" => Evaluation::Incorrect,
    "incorrect" => Evaluation::Incorrect,
    "no respondida" => Evaluation::NotAnswered,
    "not answered" => Evaluation::NotAnswered,
    "error en formato de respuesta del llm" => Evaluation::FormatError,
    "llm response format error" => Evaluation::FormatError,
};

impl Evaluation {
    /// 解析 LLM 返回的评价标签（西语或英语，忽略大小写），未知标签原样保留
    pub fn from_label(label: &str) -> Self {
        let key = label.trim().to_lowercase();
        EVALUATION_LABELS
            .get(key.as_str())
            .cloned()
            .unwrap_or_else(|| Evaluation::Other(label.trim().to_string()))
    }

    pub fn label(&self) -> &str {
        match self {
            Evaluation::Correct => "Correcta",
            Evaluation::PartiallyCorrect => "Parcialmente Correcta",
            Evaluation::Incorrect => "Incorrecta",
            Evaluation::NotAnswered => "No Respondida",
            Evaluation::FormatError => "Error en Formato de Respuesta del LLM",
            Evaluation::Other(s) => s,
        }
    }
}

impl From<String> for Evaluation {
    fn from(s: String) -> Self {
        Evaluation::from_label(&s)
    }
}

impl From<Evaluation> for String {
    fn from(e: Evaluation) -> Self {
        e.label().to_string()
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 单项得分明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedScoreItem {
    pub student_answer: String,
    pub correct_answer: String,
    pub evaluation: Evaluation,
    pub feedback: String,
    /// 1-7 分制
    pub score: f64,
    /// LLM 原始 0-10 分，留作审计
    pub original_score_0_10: f64,
    /// LLM 额外返回的字段，原样透传
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// 评分失败信息
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationFailure {
    pub kind: ErrorKind,
    pub detail: String,
}

impl From<&StageError> for EvaluationFailure {
    fn from(err: &StageError) -> Self {
        Self {
            kind: err.kind(),
            detail: err.detail(),
        }
    }
}

/// 单次评分的聚合结果
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub status: EvalStatus,
    pub general_feedback: String,
    pub overall_score: f64,
    pub confidence: f64,
    pub detailed_scores: BTreeMap<String, DetailedScoreItem>,
    pub original_overall_score_percentage: Option<f64>,
    /// 结构分析失败、退回整卷评分时的原因
    pub structure_analysis_warning: Option<String>,
    pub failure: Option<EvaluationFailure>,
}

impl EvaluationResult {
    /// 成功结果；分数在这里统一钳制
    pub fn completed(
        general_feedback: impl Into<String>,
        overall_score: f64,
        confidence: f64,
        detailed_scores: BTreeMap<String, DetailedScoreItem>,
    ) -> Self {
        Self {
            status: EvalStatus::Completed,
            general_feedback: general_feedback.into(),
            overall_score: clamp_grade(overall_score),
            confidence: clamp_confidence(confidence),
            detailed_scores,
            original_overall_score_percentage: None,
            structure_analysis_warning: None,
            failure: None,
        }
    }

    /// 失败结果：最低分、零置信度
    pub fn failed(
        kind: ErrorKind,
        detail: impl Into<String>,
        general_feedback: impl Into<String>,
    ) -> Self {
        Self {
            status: EvalStatus::Error,
            general_feedback: general_feedback.into(),
            overall_score: MIN_GRADE,
            confidence: 0.0,
            detailed_scores: BTreeMap::new(),
            original_overall_score_percentage: None,
            structure_analysis_warning: None,
            failure: Some(EvaluationFailure {
                kind,
                detail: detail.into(),
            }),
        }
    }

    /// 由阶段错误构建失败结果
    pub fn from_stage_error(err: &StageError, general_feedback: impl Into<String>) -> Self {
        let failure = EvaluationFailure::from(err);
        Self::failed(failure.kind, failure.detail, general_feedback)
    }

    pub fn is_error(&self) -> bool {
        self.failure.is_some()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.failure.as_ref().map(|f| f.kind)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.detail.as_str())
    }
}

pub(crate) fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl Serialize for EvaluationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("status", &self.status)?;
        map.serialize_entry("general_feedback", &self.general_feedback)?;
        map.serialize_entry("overall_score", &self.overall_score)?;
        map.serialize_entry("confidence", &self.confidence)?;
        map.serialize_entry("detailed_scores", &self.detailed_scores)?;
        if let Some(pct) = self.original_overall_score_percentage {
            map.serialize_entry("original_overall_score_percentage", &pct)?;
        }
        if let Some(warning) = &self.structure_analysis_warning {
            map.serialize_entry("structure_analysis_warning", warning)?;
        }
        if let Some(failure) = &self.failure {
            map.serialize_entry("error", &failure.detail)?;
            if failure.kind != ErrorKind::Input {
                map.serialize_entry(failure.kind.field_name(), &failure.detail)?;
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evaluation_labels_are_case_insensitive() {
        assert_eq!(Evaluation::from_label("CORRECTA"), Evaluation::Correct);
        assert_eq!(
            Evaluation::from_label(" Partially Correct "),
            Evaluation::PartiallyCorrect
        );
        assert_eq!(
            Evaluation::from_label("Cumple el criterio"),
            Evaluation::Other("Cumple el criterio".to_string())
        );
    }

    #[test]
    fn test_failed_result_has_minimum_grade() {
        let result = EvaluationResult::failed(ErrorKind::Parsing, "sin JSON", "Error");
        assert_eq!(result.status, EvalStatus::Error);
        assert_eq!(result.overall_score, 1.0);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.error_kind(), Some(ErrorKind::Parsing));
    }

    #[test]
    fn test_completed_clamps_scores() {
        let result = EvaluationResult::completed("ok", 9.3, 1.7, BTreeMap::new());
        assert_eq!(result.overall_score, 7.0);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_serialize_failure_fields() {
        let result = EvaluationResult::failed(ErrorKind::Api, "SAFETY", "Error API");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "SAFETY");
        assert_eq!(value["error_api"], "SAFETY");
        assert_eq!(value["overall_score"], 1.0);
        assert!(value.get("error_parsing").is_none());

        let input = EvaluationResult::failed(ErrorKind::Input, "vacío", "Error");
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["error"], "vacío");
        let error_fields = value
            .as_object()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with("error"))
            .count();
        assert_eq!(error_fields, 1);
    }

    #[test]
    fn test_detailed_item_keeps_extra_fields() {
        let item: DetailedScoreItem = serde_json::from_value(json!({
            "student_answer": "42",
            "correct_answer": "40",
            "evaluation": "Parcialmente Correcta",
            "feedback": "Cerca",
            "score": 5.8,
            "original_score_0_10": 8.0,
            "weight": 100
        }))
        .unwrap();
        assert_eq!(item.evaluation, Evaluation::PartiallyCorrect);
        assert_eq!(item.extra["weight"], 100);

        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["evaluation"], "Parcialmente Correcta");
        assert_eq!(back["weight"], 100);
    }
}
