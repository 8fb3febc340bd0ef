//! 按评分细则（rubric）整卷评分 - 流程层
//!
//! 一次 LLM 调用完成整卷评分，分数换算见 `stage::finalize_scored_response`。

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

use crate::clients::CompletionBackend;
use crate::models::{ErrorKind, EvaluationResult};
use crate::services::prompts;
use crate::workflow::stage::{
    catch_critical, complete_json, critical_result, failure_feedback, finalize_scored_response,
    unconfigured_result,
};

/// LLM 未给出总体反馈时使用
pub const DEFAULT_RUBRIC_FEEDBACK: &str = "Evaluación completada según rúbrica proporcionada.";

#[derive(Clone)]
pub struct RubricEvaluator {
    llm: Arc<dyn CompletionBackend>,
}

impl RubricEvaluator {
    pub fn new(llm: Arc<dyn CompletionBackend>) -> Self {
        Self { llm }
    }

    /// 按评分细则评分
    ///
    /// # 参数
    /// - `student_text`: 规范化后的学生作答
    /// - `rubric`: 任意 JSON 形式的评分细则
    ///
    /// # 返回
    /// 总是返回结果；失败时带 `error_*` 标签，总分为最低分
    pub async fn evaluate_with_rubric(
        &self,
        student_text: &str,
        rubric: &JsonValue,
    ) -> EvaluationResult {
        catch_critical(
            "evaluate_with_rubric",
            self.run(student_text, rubric),
            critical_result,
        )
        .await
    }

    async fn run(&self, student_text: &str, rubric: &JsonValue) -> EvaluationResult {
        if !self.llm.is_configured() {
            return unconfigured_result();
        }

        if student_text.trim().is_empty() || is_blank(rubric) {
            return EvaluationResult::failed(
                ErrorKind::Input,
                "Input de texto o rúbrica vacío.",
                "Se requiere texto de la prueba y datos de la rúbrica.",
            );
        }

        let rubric_json = match serde_json::to_string_pretty(rubric) {
            Ok(json) => json,
            Err(e) => return critical_result(format!("No se pudo serializar la rúbrica: {}", e)),
        };

        info!(
            "📝 按评分细则评分（学生作答 {} 个字符）",
            student_text.chars().count()
        );

        let prompt = prompts::rubric_evaluation_prompt(student_text, &rubric_json);
        let outcome = complete_json(self.llm.as_ref(), &prompt, "rúbrica")
            .await
            .and_then(|value| {
                finalize_scored_response(&value, DEFAULT_RUBRIC_FEEDBACK)
            });

        match outcome {
            Ok(result) => {
                info!(
                    "✓ 评分完成: {:.1} 分，{} 道题，置信度 {:.2}",
                    result.overall_score,
                    result.detailed_scores.len(),
                    result.confidence
                );
                result
            }
            Err(e) => EvaluationResult::from_stage_error(&e, failure_feedback(&e)),
        }
    }
}

/// null、空字符串、空数组、空对象
pub(crate) fn is_blank(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        _ => false,
    }
}
