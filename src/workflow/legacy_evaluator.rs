//! 结构化评分（旧版流程）- 流程层
//!
//! 流程顺序：
//! 1. 阶段 A：分析标准答案结构（题号、题干、答案）
//! 2. 阶段 B：按结构提取学生答案
//! 3. 阶段 C：逐题评分并汇总
//!
//! 阶段 A 失败或结构为空时退回整卷评分（`DirectEvaluator`），并记录原因。
//! 阶段之间通过 `StageOutcome` 传递，上游失败时下游不调用 LLM。

use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::CompletionBackend;
use crate::error::{StageError, StageOutcome};
use crate::models::structure::student_answers_from_value;
use crate::models::{
    DetailedScoreItem, ErrorKind, Evaluation, EvaluationResult, ExamStructure, StudentAnswers,
    ANSWER_NOT_FOUND,
};
use crate::services::prompts;
use crate::services::scoring::{rescale_item, rescale_percentage, round_to, MIN_GRADE};
use crate::utils::logging::truncate_text;
use crate::workflow::direct_evaluator::DirectEvaluator;
use crate::workflow::stage::{
    catch_critical, complete_json, critical_result, failure_feedback, unconfigured_result,
};

/// 结构化评分的固定置信度
const STRUCTURED_CONFIDENCE: f64 = 0.85;

#[derive(Clone)]
pub struct LegacyEvaluator {
    llm: Arc<dyn CompletionBackend>,
    direct: DirectEvaluator,
}

impl LegacyEvaluator {
    pub fn new(llm: Arc<dyn CompletionBackend>) -> Self {
        Self {
            direct: DirectEvaluator::new(llm.clone()),
            llm,
        }
    }

    /// 结构化评分入口
    ///
    /// # 参数
    /// - `student_text`: 学生作答
    /// - `answer_key_text`: 标准答案原文
    pub async fn evaluate_legacy(
        &self,
        student_text: &str,
        answer_key_text: &str,
    ) -> EvaluationResult {
        catch_critical(
            "evaluate_legacy",
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
                "Input de texto vacío.",
                "Se requiere texto de la prueba y de la pauta.",
            );
        }

        // ========== 阶段 A: 结构分析 ==========
        let structure = self.analyze_structure(answer_key_text).await;

        let fallback_cause = match &structure {
            Err(e) => Some(format!("Fallo en análisis de estructura ({}).", e.detail())),
            Ok(s) if s.is_empty() => {
                Some("Estructura no determinada o vacía tras analizar la pauta.".to_string())
            }
            Ok(_) => None,
        };

        if let Some(cause) = fallback_cause {
            warn!("⚠️ 结构分析不可用，退回整卷评分: {}", cause);
            let mut result = self.direct.evaluate_direct(student_text, answer_key_text).await;
            if !result.is_error() {
                result.general_feedback =
                    format!("Advertencia: {} {}", cause, result.general_feedback)
                        .trim()
                        .to_string();
            }
            result.structure_analysis_warning = Some(cause);
            return result;
        }

        // ========== 阶段 B: 提取学生答案 ==========
        let answers = self.extract_answers(student_text, &structure).await;
        if let Err(e) = &answers {
            error!("❌ 提取学生答案失败: {}", e);
            return EvaluationResult::failed(
                ErrorKind::DetailExtraction,
                e.detail(),
                format!(
                    "Error al procesar las respuestas del estudiante ({}). No se pudo completar la evaluación estructurada.",
                    e.detail()
                ),
            );
        }

        // ========== 阶段 C: 逐题评分 ==========
        match &structure {
            Ok(structure) => {
                self.evaluate_structured(&answers, structure, student_text, answer_key_text)
                    .await
            }
            Err(e) => EvaluationResult::from_stage_error(e, failure_feedback(e)),
        }
    }

    /// 阶段 A：分析标准答案结构
    pub async fn analyze_structure(&self, answer_key_text: &str) -> StageOutcome<ExamStructure> {
        catch_critical(
            "analyze_structure",
            self.request_structure(answer_key_text),
            |msg| Err(StageError::Critical(msg)),
        )
        .await
    }

    async fn request_structure(&self, answer_key_text: &str) -> StageOutcome<ExamStructure> {
        info!("🔍 [阶段 A] 分析标准答案结构");
        let prompt = prompts::structure_analysis_prompt(answer_key_text);
        let value = complete_json(self.llm.as_ref(), &prompt, "estructura").await?;

        let structure = ExamStructure::from_value(&value).ok_or_else(|| {
            StageError::Parsing(format!(
                "La estructura devuelta no es un objeto JSON: {}",
                truncate_text(&value.to_string(), 200)
            ))
        })?;

        info!(
            "✓ [阶段 A] 识别到 {} 道题（编号格式: {}）",
            structure.questions.len(),
            structure.numbering_format
        );
        Ok(structure)
    }

    /// 阶段 B：按结构提取学生答案
    ///
    /// 上游结构失败或为空时直接返回依赖错误，不调用 LLM。
    pub async fn extract_answers(
        &self,
        student_text: &str,
        structure: &StageOutcome<ExamStructure>,
    ) -> StageOutcome<StudentAnswers> {
        let structure = match structure {
            Err(upstream) => {
                return Err(StageError::Dependency {
                    detail: "La estructura previa falló.".to_string(),
                    details: upstream.to_sentinel(),
                })
            }
            Ok(s) if s.is_empty() => {
                return Err(StageError::Dependency {
                    detail: "La estructura previa no contiene preguntas.".to_string(),
                    details: serde_json::to_value(s).unwrap_or(JsonValue::Null),
                })
            }
            Ok(s) => s,
        };

        catch_critical(
            "extract_answers",
            self.request_answers(student_text, structure),
            |msg| Err(StageError::Critical(msg)),
        )
        .await
    }

    async fn request_answers(
        &self,
        student_text: &str,
        structure: &ExamStructure,
    ) -> StageOutcome<StudentAnswers> {
        info!("🔍 [阶段 B] 提取学生答案（{} 道题）", structure.questions.len());
        let structure_json = serde_json::to_string_pretty(structure)
            .map_err(|e| StageError::Critical(e.to_string()))?;
        let prompt = prompts::answer_extraction_prompt(student_text, &structure_json);
        let value = complete_json(self.llm.as_ref(), &prompt, "extracción").await?;

        let answers = student_answers_from_value(&value).ok_or_else(|| {
            StageError::Parsing(format!(
                "Las respuestas extraídas no son un objeto JSON: {}",
                truncate_text(&value.to_string(), 200)
            ))
        })?;

        info!("✓ [阶段 B] 提取到 {} 个答案", answers.len());
        Ok(answers)
    }

    /// 阶段 C：逐题评分并汇总
    ///
    /// 每道题都会出现在结果里；LLM 没有给出合法评分的题目记为格式错误、最低分。
    pub async fn evaluate_structured(
        &self,
        answers: &StageOutcome<StudentAnswers>,
        structure: &ExamStructure,
        student_text: &str,
        answer_key_text: &str,
    ) -> EvaluationResult {
        let answers = match answers {
            Ok(answers) => answers,
            Err(e) => {
                return EvaluationResult::failed(
                    ErrorKind::Prerequisite,
                    e.detail(),
                    format!("Error previo impidió la evaluación estructurada: {}", e.detail()),
                )
            }
        };

        catch_critical(
            "evaluate_structured",
            self.score_questions(answers, structure, student_text, answer_key_text),
            critical_result,
        )
        .await
    }

    async fn score_questions(
        &self,
        answers: &StudentAnswers,
        structure: &ExamStructure,
        student_text: &str,
        answer_key_text: &str,
    ) -> EvaluationResult {
        info!("📝 [阶段 C] 逐题评分（{} 道题）", structure.questions.len());
        // 原文只用于日志，评分只看结构与提取结果
        info!(
            "学生作答 {} 个字符，标准答案 {} 个字符",
            student_text.chars().count(),
            answer_key_text.chars().count()
        );

        let questions: Vec<JsonValue> = structure
            .questions
            .iter()
            .map(|q| {
                json!({
                    "id": q.id,
                    "question_text": q.text,
                    "expected_answer": q.answer,
                    "student_answer": student_answer(answers, &q.id),
                })
            })
            .collect();

        let questions_json = match serde_json::to_string_pretty(&questions) {
            Ok(json) => json,
            Err(e) => return critical_result(e.to_string()),
        };

        let prompt = prompts::structured_evaluation_prompt(&questions_json);
        let judgments = match complete_json(
            self.llm.as_ref(),
            &prompt,
            "evaluación estructurada",
        )
        .await
        {
            Ok(value) => value,
            Err(e) => return EvaluationResult::from_stage_error(&e, failure_feedback(&e)),
        };

        let empty = Map::new();
        let judgments = judgments.as_object().unwrap_or_else(|| {
            warn!("阶段 C 返回的不是 JSON 对象，所有题目按格式错误处理");
            &empty
        });

        let mut detailed_scores = BTreeMap::new();
        let mut total_original = 0.0;

        for question in &structure.questions {
            let student_ans = student_answer(answers, &question.id);
            let judgment = judgments.get(&question.id);
            let item = judgment
                .and_then(|j| scored_item(j, student_ans, &question.answer))
                .unwrap_or_else(|| {
                    warn!("题目 {} 没有合法的评分，记为格式错误", question.id);
                    penalty_item(judgment, &question.id, student_ans, &question.answer)
                });

            total_original += item.original_score_0_10;
            detailed_scores.insert(question.id.clone(), item);
        }

        let question_count = structure.questions.len() as f64;
        let percentage = total_original / (question_count * 10.0) * 100.0;
        let overall_score = rescale_percentage(percentage);

        let general_feedback = format!(
            "El estudiante obtuvo una nota final de {:.1} (equivalente a {:.1}% de logro).",
            overall_score, percentage
        );

        info!(
            "✓ [阶段 C] 结构化评分完成: {:.1} 分（{:.1}%）",
            overall_score, percentage
        );

        let mut result = EvaluationResult::completed(
            general_feedback,
            overall_score,
            STRUCTURED_CONFIDENCE,
            detailed_scores,
        );
        result.original_overall_score_percentage = Some(round_to(percentage, 1));
        result
    }
}

fn student_answer<'a>(answers: &'a StudentAnswers, id: &str) -> &'a str {
    answers.get(id).map(String::as_str).unwrap_or(ANSWER_NOT_FOUND)
}

/// 合法评分：对象且 `score` 为数值
fn scored_item(
    judgment: &JsonValue,
    student_ans: &str,
    correct: &str,
) -> Option<DetailedScoreItem> {
    let fields = judgment.as_object()?;
    let raw = fields.get("score")?.as_f64()?;

    Some(DetailedScoreItem {
        student_answer: student_ans.to_string(),
        correct_answer: correct.to_string(),
        evaluation: fields
            .get("evaluation")
            .and_then(JsonValue::as_str)
            .map(Evaluation::from_label)
            .unwrap_or_else(|| Evaluation::Other("No evaluado".to_string())),
        feedback: fields
            .get("feedback")
            .and_then(JsonValue::as_str)
            .unwrap_or("Sin feedback específico.")
            .to_string(),
        score: rescale_item(raw),
        original_score_0_10: raw,
        extra: Map::new(),
    })
}

fn penalty_item(
    judgment: Option<&JsonValue>,
    id: &str,
    student_ans: &str,
    correct: &str,
) -> DetailedScoreItem {
    let raw = judgment.map_or_else(|| "sin respuesta".to_string(), |j| j.to_string());
    DetailedScoreItem {
        student_answer: student_ans.to_string(),
        correct_answer: correct.to_string(),
        evaluation: Evaluation::FormatError,
        feedback: format!(
            "El LLM no devolvió una evaluación válida para la pregunta {}. Respuesta: {}",
            id,
            truncate_text(&raw, 200)
        ),
        score: MIN_GRADE,
        original_score_0_10: 0.0,
        extra: Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::llm_client::soft_failure;
    use crate::error::AppResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedBackend {
        responses: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        fn is_configured(&self) -> bool {
            true
        }

        async fn complete(&self, _prompt: &str, _model_hint: Option<&str>) -> AppResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            Ok(if responses.is_empty() {
                String::new()
            } else {
                responses.remove(0)
            })
        }
    }

    fn two_questions() -> ExamStructure {
        ExamStructure::from_value(&json!({
            "total_questions": 2,
            "numbering_format": "1.",
            "questions": [
                {"id": "1", "text": "Capital de Chile", "answer": "Santiago"},
                {"id": "2", "text": "2 + 2", "answer": "4"}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_extract_answers_short_circuits_on_failed_structure() {
        let backend = ScriptedBackend::new(&[]);
        let evaluator = LegacyEvaluator::new(backend.clone());

        let upstream: StageOutcome<ExamStructure> = Err(StageError::Api("SAFETY".into()));
        let err = evaluator.extract_answers("texto", &upstream).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Dependency);
        assert_eq!(err.to_sentinel()["details"]["error_api"], "SAFETY");
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_extract_answers_short_circuits_on_empty_structure() {
        let backend = ScriptedBackend::new(&[]);
        let evaluator = LegacyEvaluator::new(backend.clone());

        let err = evaluator
            .extract_answers("texto", &Ok(ExamStructure::default()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Dependency);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_extract_answers_maps_null_to_sentinel() {
        let backend = ScriptedBackend::new(&[r#"{"1": "Santiago", "2": null}"#]);
        let evaluator = LegacyEvaluator::new(backend);

        let answers = evaluator
            .extract_answers("texto", &Ok(two_questions()))
            .await
            .unwrap();

        assert_eq!(answers["1"], "Santiago");
        assert_eq!(answers["2"], ANSWER_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_evaluate_structured_prerequisite_error() {
        let backend = ScriptedBackend::new(&[]);
        let evaluator = LegacyEvaluator::new(backend.clone());

        let answers: StageOutcome<StudentAnswers> = Err(StageError::Parsing("roto".into()));
        let result = evaluator
            .evaluate_structured(&answers, &two_questions(), "a", "b")
            .await;

        assert_eq!(result.error_kind(), Some(ErrorKind::Prerequisite));
        assert_eq!(result.overall_score, MIN_GRADE);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_evaluate_structured_penalizes_missing_judgments() {
        let backend = ScriptedBackend::new(&[
            r#"{"1": {"evaluation": "Correcta", "feedback": "Bien", "score": 10}, "2": {"evaluation": "Incorrecta"}}"#,
        ]);
        let evaluator = LegacyEvaluator::new(backend);

        let answers: StageOutcome<StudentAnswers> =
            Ok(BTreeMap::from([("1".to_string(), "Santiago".to_string())]));
        let result = evaluator
            .evaluate_structured(&answers, &two_questions(), "a", "b")
            .await;

        assert!(!result.is_error());
        assert_eq!(result.detailed_scores.len(), 2);

        let q1 = &result.detailed_scores["1"];
        assert_eq!(q1.score, 7.0);
        assert_eq!(q1.original_score_0_10, 10.0);

        let q2 = &result.detailed_scores["2"];
        assert_eq!(q2.evaluation, Evaluation::FormatError);
        assert_eq!(q2.score, MIN_GRADE);
        assert_eq!(q2.original_score_0_10, 0.0);
        assert_eq!(q2.student_answer, ANSWER_NOT_FOUND);

        // 10 / 20 → 50% → 4.0
        assert_eq!(result.original_overall_score_percentage, Some(50.0));
        assert_eq!(result.overall_score, 4.0);
        assert_eq!(result.confidence, STRUCTURED_CONFIDENCE);
        assert_eq!(
            result.general_feedback,
            "El estudiante obtuvo una nota final de 4.0 (equivalente a 50.0% de logro)."
        );
    }

    #[tokio::test]
    async fn test_evaluate_structured_non_object_judgment() {
        let backend = ScriptedBackend::new(&["[1, 2, 3]"]);
        let evaluator = LegacyEvaluator::new(backend);

        let result = evaluator
            .evaluate_structured(&Ok(BTreeMap::new()), &two_questions(), "a", "b")
            .await;

        assert!(result
            .detailed_scores
            .values()
            .all(|item| item.evaluation == Evaluation::FormatError));
        assert_eq!(result.overall_score, MIN_GRADE);
    }

    #[tokio::test]
    async fn test_legacy_full_structured_path() {
        let backend = ScriptedBackend::new(&[
            r#"{"total_questions": 2, "numbering_format": "1.", "questions": [{"id": "1", "text": "Capital", "answer": "Santiago"}, {"id": "2", "text": "Suma", "answer": "4"}]}"#,
            "```json\n{\"1\": \"Santiago\", \"2\": \"5\"}\n```",
            r#"{"1": {"evaluation": "Correcta", "score": 10}, "2": {"evaluation": "Incorrecta", "score": 0}}"#,
        ]);
        let evaluator = LegacyEvaluator::new(backend.clone());

        let result = evaluator.evaluate_legacy("respuestas", "pauta").await;

        assert_eq!(backend.calls(), 3);
        assert!(!result.is_error());
        assert_eq!(result.overall_score, 4.0);
        assert_eq!(result.detailed_scores["2"].student_answer, "5");
        assert!(result.structure_analysis_warning.is_none());
    }

    #[tokio::test]
    async fn test_legacy_extraction_failure() {
        let backend = ScriptedBackend::new(&[
            r#"{"questions": [{"id": "1", "text": "Capital", "answer": "Santiago"}]}"#,
            soft_failure("Generación detenida", Some("SAFETY")).as_str(),
        ]);
        let evaluator = LegacyEvaluator::new(backend.clone());

        let result = evaluator.evaluate_legacy("respuestas", "pauta").await;

        assert_eq!(backend.calls(), 2);
        assert_eq!(result.error_kind(), Some(ErrorKind::DetailExtraction));
        assert_eq!(result.error_message(), Some("SAFETY"));
    }

    #[tokio::test]
    async fn test_legacy_falls_back_when_structure_fails() {
        let backend = ScriptedBackend::new(&[
            "no es json",
            r#"{"overall_score": 70, "general_feedback": "Aceptable", "detailed_scores": {}}"#,
        ]);
        let evaluator = LegacyEvaluator::new(backend.clone());

        let result = evaluator.evaluate_legacy("respuestas", "pauta").await;

        assert_eq!(backend.calls(), 2);
        assert!(!result.is_error());
        let warning = result.structure_analysis_warning.as_deref().unwrap();
        assert!(warning.starts_with("Fallo en análisis de estructura"));
        assert!(result.general_feedback.starts_with("Advertencia: "));
        assert!(result.general_feedback.ends_with("Aceptable"));
        assert_eq!(result.overall_score, 5.2);
    }

    #[tokio::test]
    async fn test_legacy_fallback_failure_keeps_warning() {
        let backend = ScriptedBackend::new(&[r#"{"questions": []}"#, "tampoco json"]);
        let evaluator = LegacyEvaluator::new(backend.clone());

        let result = evaluator.evaluate_legacy("respuestas", "pauta").await;

        assert_eq!(result.error_kind(), Some(ErrorKind::Parsing));
        assert!(result.structure_analysis_warning.is_some());
    }

    #[tokio::test]
    async fn test_legacy_empty_input() {
        let backend = ScriptedBackend::new(&[]);
        let evaluator = LegacyEvaluator::new(backend.clone());

        let result = evaluator.evaluate_legacy("   ", "pauta").await;

        assert_eq!(result.error_kind(), Some(ErrorKind::Input));
        assert_eq!(result.overall_score, MIN_GRADE);
        assert_eq!(backend.calls(), 0);
    }
}
