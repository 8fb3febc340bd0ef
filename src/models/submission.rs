//! 请求与响应模型

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

use super::evaluation::{DetailedScoreItem, EvalStatus, EvaluationResult};

/// 单份试卷评分请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectEvaluationRequest {
    /// 试卷元数据（原样透传）
    #[serde(default)]
    pub test_data: Map<String, JsonValue>,
    /// 评分标准
    pub rubric_data: JsonValue,
    /// 直接下载地址
    #[serde(default)]
    pub test_url: Option<String>,
    /// 存储中的文件 key
    #[serde(default)]
    pub test_key: Option<String>,
}

/// 批量评分中的一份提交
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    #[serde(rename = "submissionId")]
    pub submission_id: i64,
    #[serde(default)]
    pub test_url: Option<String>,
    #[serde(default)]
    pub test_key: Option<String>,
}

impl Submission {
    /// 失败时也要保留的标识元数据
    pub fn identity_metadata(&self) -> JsonValue {
        serde_json::json!({
            "submission_id": self.submission_id,
            "original_url": self.test_url,
            "original_key": self.test_key,
        })
    }
}

/// 批量评分请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(rename = "gradedBy")]
    pub graded_by: String,
    pub submissions: Vec<Submission>,
    pub rubric_data: JsonValue,
    #[serde(default)]
    pub test_data: Map<String, JsonValue>,
}

/// 对外返回的评分响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub status: EvalStatus,
    pub general_feedback: String,
    pub overall_score: f64,
    pub confidence: f64,
    pub detailed_scores: BTreeMap<String, DetailedScoreItem>,
    pub test_metadata: Option<JsonValue>,
    pub processing_time_seconds: Option<f64>,
    pub error: Option<String>,
}

impl EvaluationResponse {
    /// 由成功的评分结果构建
    pub fn completed(
        result: EvaluationResult,
        test_metadata: JsonValue,
        elapsed_secs: f64,
    ) -> Self {
        Self {
            status: EvalStatus::Completed,
            general_feedback: result.general_feedback,
            overall_score: result.overall_score,
            confidence: result.confidence,
            detailed_scores: result.detailed_scores,
            test_metadata: Some(test_metadata),
            processing_time_seconds: Some(round_secs(elapsed_secs)),
            error: None,
        }
    }

    /// 失败响应：最低分、零置信度
    pub fn failed(
        message: impl Into<String>,
        general_feedback: impl Into<String>,
        test_metadata: Option<JsonValue>,
        elapsed_secs: f64,
    ) -> Self {
        Self {
            status: EvalStatus::Error,
            general_feedback: general_feedback.into(),
            overall_score: crate::services::scoring::MIN_GRADE,
            confidence: 0.0,
            detailed_scores: BTreeMap::new(),
            test_metadata,
            processing_time_seconds: Some(round_secs(elapsed_secs)),
            error: Some(message.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == EvalStatus::Completed
    }
}

/// 批量评分响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub message: String,
    #[serde(rename = "gradedBy")]
    pub graded_by: String,
    pub results: Vec<EvaluationResponse>,
}

/// 服务健康信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub llm_configured: bool,
    pub vision_configured: bool,
    pub model: String,
}

fn round_secs(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
