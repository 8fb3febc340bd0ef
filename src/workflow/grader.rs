//! 评分分发
//!
//! 按输入类型选择评分路径：评分细则 → 整卷评分，标准答案原文 → 结构化评分。

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

use crate::clients::CompletionBackend;
use crate::models::EvaluationResult;
use crate::workflow::direct_evaluator::DirectEvaluator;
use crate::workflow::legacy_evaluator::LegacyEvaluator;
use crate::workflow::rubric_evaluator::RubricEvaluator;

/// 评分依据
#[derive(Debug, Clone, PartialEq)]
pub enum GradingInput {
    /// 结构化评分细则（任意 JSON）
    Rubric(JsonValue),
    /// 标准答案原文
    AnswerKey(String),
}

/// 评分入口
#[derive(Clone)]
pub struct Grader {
    rubric: RubricEvaluator,
    direct: DirectEvaluator,
    legacy: LegacyEvaluator,
}

impl Grader {
    pub fn new(llm: Arc<dyn CompletionBackend>) -> Self {
        Self {
            rubric: RubricEvaluator::new(llm.clone()),
            direct: DirectEvaluator::new(llm.clone()),
            legacy: LegacyEvaluator::new(llm),
        }
    }

    /// 按评分依据评分
    pub async fn evaluate(&self, student_text: &str, input: &GradingInput) -> EvaluationResult {
        match input {
            GradingInput::Rubric(rubric) => {
                info!("🧭 评分路径: 评分细则");
                self.rubric.evaluate_with_rubric(student_text, rubric).await
            }
            GradingInput::AnswerKey(answer_key) => {
                info!("🧭 评分路径: 标准答案（结构化）");
                self.legacy.evaluate_legacy(student_text, answer_key).await
            }
        }
    }

    pub fn rubric(&self) -> &RubricEvaluator {
        &self.rubric
    }

    pub fn direct(&self) -> &DirectEvaluator {
        &self.direct
    }

    pub fn legacy(&self) -> &LegacyEvaluator {
        &self.legacy
    }
}
