//! 文本规范化服务 - 业务能力层
//!
//! 用 LLM 清理 OCR 文本，可选再过滤掉与作答无关的内容。
//!
//! 规范化是"尽力而为"的：凭证缺失、文本太短、LLM 失败时都原样返回输入，从不报错。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clients::CompletionBackend;
use crate::services::json_recovery::soft_failure_detail;
use crate::services::prompts;
use crate::utils::logging::truncate_text;

/// 少于该字符数的文本不做规范化
const MIN_NORMALIZE_CHARS: usize = 10;

/// 规范化结果常见的开场白
const NORMALIZE_PREFACES: &[&str] = &[
    "¡Claro!",
    "Claro,",
    "A continuación",
    "Aquí está",
    "Aquí tienes",
    "Texto normalizado:",
    "El texto normalizado es:",
    "TEXTO NORMALIZADO:",
    "Sure!",
    "Sure,",
    "Here is",
    "Normalized text:",
];

/// 过滤结果常见的开场白
const FILTER_PREFACES: &[&str] = &[
    "¡Claro!",
    "A continuación",
    "Aquí está",
    "Contenido relevante:",
    "El contenido relevante es:",
    "TEXTO RELEVANTE:",
    "Este es el contenido relevante:",
    "Sure!",
    "Here is",
    "Relevant content:",
];

/// 模型在结尾追加的说明
const TRAILING_MARKERS: &[&str] = &[
    "He corregido los errores",
    "He normalizado el texto",
    "La estructura original",
    "I have corrected",
    "I have normalized",
];

/// 文本来源，决定提示词里的保留规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizeContext {
    /// 学生试卷
    #[default]
    Exam,
    /// 标准答案
    AnswerKey,
    /// 其他
    Generic,
}

impl fmt::Display for NormalizeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NormalizeContext::Exam => "prueba",
            NormalizeContext::AnswerKey => "pauta",
            NormalizeContext::Generic => "general",
        };
        f.write_str(name)
    }
}

impl FromStr for NormalizeContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prueba" | "exam" => Ok(NormalizeContext::Exam),
            "pauta" | "answer_key" | "answer-key" => Ok(NormalizeContext::AnswerKey),
            "general" | "generic" => Ok(NormalizeContext::Generic),
            other => Err(format!("contexto desconocido: {}", other)),
        }
    }
}

/// 文本规范化服务
pub struct TextNormalizer {
    llm: Arc<dyn CompletionBackend>,
    model_hint: Option<String>,
}

impl TextNormalizer {
    /// # 参数
    /// - `llm`: LLM 后端
    /// - `model_hint`: 规范化使用的轻量模型（为空时用后端默认模型）
    pub fn new(llm: Arc<dyn CompletionBackend>, model_hint: Option<String>) -> Self {
        Self { llm, model_hint }
    }

    /// 规范化 OCR 文本
    ///
    /// # 参数
    /// - `raw_text`: OCR 原始文本
    /// - `context`: 文本来源
    /// - `filter_content`: 规范化后是否再过滤无关内容
    ///
    /// # 返回
    /// 规范化后的文本；任何失败都返回原文
    pub async fn normalize(
        &self,
        raw_text: &str,
        context: NormalizeContext,
        filter_content: bool,
    ) -> String {
        if !self.llm.is_configured() {
            error!("LLM 凭证未配置，跳过文本规范化");
            return raw_text.to_string();
        }

        if raw_text.trim().chars().count() < MIN_NORMALIZE_CHARS {
            debug!("文本过短，跳过规范化");
            return raw_text.to_string();
        }

        info!(
            "🧹 规范化 OCR 文本（{}，{} 个字符）",
            context,
            raw_text.chars().count()
        );

        let prompt = prompts::normalize_prompt(raw_text, context);
        let cleaned = match self.ask(&prompt).await {
            Some(completion) => {
                strip_trailing_markers(strip_prefaces(&completion, NORMALIZE_PREFACES))
            }
            None => return raw_text.to_string(),
        };

        if cleaned.is_empty() {
            warn!("规范化结果为空，保留原文");
            return raw_text.to_string();
        }

        info!("✓ 规范化完成，{} 个字符", cleaned.chars().count());

        if filter_content {
            self.filter_relevant(&cleaned, context).await
        } else {
            cleaned
        }
    }

    /// 过滤与作答无关的内容
    ///
    /// 与 `normalize` 相同的短路规则：凭证缺失或文本过短时原样返回，失败时也返回输入。
    pub async fn filter_relevant(&self, text: &str, context: NormalizeContext) -> String {
        if !self.llm.is_configured() {
            error!("LLM 凭证未配置，跳过内容过滤");
            return text.to_string();
        }

        if text.trim().chars().count() < MIN_NORMALIZE_CHARS {
            debug!("文本过短，跳过内容过滤");
            return text.to_string();
        }

        info!("🔎 过滤无关内容（{}）", context);

        let prompt = prompts::filter_prompt(text, context);
        let Some(completion) = self.ask(&prompt).await else {
            return text.to_string();
        };

        // 过滤结果只去开场白，结尾说明标记可能是正文
        let filtered = strip_prefaces(&completion, FILTER_PREFACES).to_string();
        if filtered.is_empty() {
            warn!("过滤结果为空，保留过滤前文本");
            return text.to_string();
        }

        debug!("过滤后文本预览: {}", truncate_text(&filtered, 200));
        filtered
    }

    /// 调用 LLM；错误和软失败都返回 `None`
    async fn ask(&self, prompt: &str) -> Option<String> {
        let completion = match self.llm.complete(prompt, self.model_hint.as_deref()).await {
            Ok(text) => text,
            Err(e) => {
                error!("规范化调用 LLM 失败: {}", e);
                return None;
            }
        };

        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&completion) {
            if let Some(detail) = soft_failure_detail(&value) {
                warn!("规范化 LLM 返回错误: {}", detail);
                return None;
            }
        }

        if completion.trim().is_empty() {
            warn!("规范化 LLM 返回为空");
            return None;
        }

        Some(completion)
    }
}

/// 去掉开场白
fn strip_prefaces<'a>(completion: &'a str, prefaces: &[&str]) -> &'a str {
    let mut cleaned = completion.trim();
    for preface in prefaces {
        if let Some(rest) = strip_prefix_ci(cleaned, preface) {
            cleaned = rest.trim_start();
        }
    }
    cleaned.trim()
}

/// 去掉模型在结尾追加的说明
fn strip_trailing_markers(text: &str) -> String {
    let mut cleaned = text.trim().to_string();
    for marker in TRAILING_MARKERS {
        // 只截掉出现在后半段的说明，避免误伤正文
        if let Some(pos) = rfind_ci(&cleaned, marker) {
            if pos > cleaned.len() / 2 {
                cleaned = cleaned[..pos].trim().to_string();
            }
        }
    }
    cleaned
}

/// 忽略大小写的前缀匹配，返回去掉前缀后的剩余部分
fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let n = prefix.chars().count();
    let end = text
        .char_indices()
        .nth(n)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    (text[..end].to_lowercase() == prefix.to_lowercase()).then(|| &text[end..])
}

/// 忽略大小写的最后一次出现位置（字节下标，落在字符边界上）
fn rfind_ci(text: &str, needle: &str) -> Option<usize> {
    text.char_indices()
        .rev()
        .map(|(i, _)| i)
        .find(|&i| strip_prefix_ci(&text[i..], needle).is_some())
}
