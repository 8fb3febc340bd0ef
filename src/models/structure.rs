//! 答案要点（pauta）结构与学生答案

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// 找不到学生答案时的哨兵值
pub const ANSWER_NOT_FOUND: &str = "No encontrada";

/// 一道题：编号、题干、标准答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionEntry {
    pub id: String,
    pub text: String,
    pub answer: String,
}

/// 结构分析结果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExamStructure {
    pub total_questions: u32,
    pub numbering_format: String,
    pub questions: Vec<QuestionEntry>,
}

impl ExamStructure {
    /// 宽松地从 LLM 输出读取结构
    ///
    /// 只读取 `questions[*].id/text/answer`；编号缺失时按位置补 `1..n`，
    /// 数字编号转成字符串。
    pub fn from_value(value: &JsonValue) -> Option<Self> {
        let obj = value.as_object()?;

        let questions: Vec<QuestionEntry> = obj
            .get("questions")
            .and_then(|q| q.as_array())
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| {
                        let item = item.as_object()?;
                        Some(QuestionEntry {
                            id: item
                                .get("id")
                                .and_then(scalar_to_string)
                                .unwrap_or_else(|| (i + 1).to_string()),
                            text: item
                                .get("text")
                                .and_then(scalar_to_string)
                                .unwrap_or_else(|| "Pregunta sin texto".to_string()),
                            answer: item
                                .get("answer")
                                .and_then(scalar_to_string)
                                .unwrap_or_else(|| {
                                    "Respuesta no especificada en pauta".to_string()
                                }),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let total_questions = obj
            .get("total_questions")
            .and_then(|v| v.as_u64())
            .map(|n| n as u32)
            .unwrap_or(questions.len() as u32);

        let numbering_format = obj
            .get("numbering_format")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Some(Self {
            total_questions,
            numbering_format,
            questions,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// 学生答案：题号 → 答案
pub type StudentAnswers = BTreeMap<String, String>;

/// 从 LLM 输出读取学生答案；非字符串值转成文本，null 视为未找到
pub fn student_answers_from_value(value: &JsonValue) -> Option<StudentAnswers> {
    let obj = value.as_object()?;
    Some(
        obj.iter()
            .map(|(id, answer)| {
                let answer = match answer {
                    JsonValue::Null => ANSWER_NOT_FOUND.to_string(),
                    other => scalar_to_string(other).unwrap_or_else(|| other.to_string()),
                };
                (id.clone(), answer)
            })
            .collect(),
    )
}

/// 标量转字符串：字符串原样，数字/布尔转文本，其余返回 None
pub(crate) fn scalar_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
