//! 业务能力层（Services）
//!
//! 只描述"我能做什么"，不关心流程顺序：
//! - `json_recovery` - 从 LLM 输出中恢复 JSON
//! - `scoring` - 分数换算到 1-7 分制
//! - `normalizer` - OCR 文本规范化与过滤
//! - `prompts` - 提示词模板

pub mod json_recovery;
pub mod normalizer;
pub mod prompts;
pub mod scoring;

pub use json_recovery::{recover_json, soft_failure_detail, JsonRecoveryError};
pub use normalizer::{NormalizeContext, TextNormalizer};
pub use scoring::{clamp_grade, rescale, rescale_item, rescale_percentage, MAX_GRADE, MIN_GRADE};
