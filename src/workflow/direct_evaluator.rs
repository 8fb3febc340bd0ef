//! 按标准答案整卷评分 - 流程层
//!
//! 结构化评分的兜底路径：不拆题，一次 LLM 调用对照标准答案评分。

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
pub const DEFAULT_DIRECT_FEEDBACK: &str = "Evaluación completada comparando con la pauta.";

#[derive(Clone)]
pub struct DirectEvaluator {
    llm: Arc<dyn CompletionBackend>,
}

impl DirectEvaluator {
    pub fn new(llm: Arc<dyn CompletionBackend>) -> Self {
        Self { llm }
    }

    /// 对照标准答案整卷评分
    pub async fn evaluate_direct(
        &self,
        student_text: &str,
        answer_key_text: &str,
    ) -> EvaluationResult {
        catch_critical(
            "evaluate_direct",
            self.run(student_text, answer_key_text),
            critical_result,
        )
        .await
    }

    async fn run(&self, student_text: &str, answer_key_text: &str) -> EvaluationResult {
        if !self.llm.is_configured() {
            return unconfigured_result();
        }

        if student_text.trim().is_empty() || answer_key_text.trim().is_empty() {
            return EvaluationResult::failed(
                ErrorKind::Input,
                "Input de texto o pauta vacío.",
                "Se requiere texto de la prueba y de la pauta.",
            );
        }

        info!("📝 对照标准答案整卷评分");

        let prompt = prompts::direct_evaluation_prompt(student_text, answer_key_text);
        let outcome = complete_json(self.llm.as_ref(), &prompt, "evaluación directa")
            .await
            .and_then(|value| {
                finalize_scored_response(&value, DEFAULT_DIRECT_FEEDBACK)
            });

        match outcome {
            Ok(result) => {
                info!("✓ 整卷评分完成: {:.1} 分", result.overall_score);
                result
            }
            Err(e) => EvaluationResult::from_stage_error(&e, failure_feedback(&e)),
        }
    }
}
