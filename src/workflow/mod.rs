//! 流程层（Workflow）
//!
//! 定义"一份作答"的评分流程，只依赖 `CompletionBackend`，不关心文件来源：
//! - `rubric_evaluator` - 按评分细则整卷评分
//! - `direct_evaluator` - 对照标准答案整卷评分
//! - `legacy_evaluator` - 结构分析 → 提取答案 → 逐题评分，失败时退回整卷评分
//! - `grader` - 按评分依据分发
//! - `stage` - 各流程共用的 LLM 调用与结果换算

pub mod direct_evaluator;
pub mod grader;
pub mod legacy_evaluator;
pub mod rubric_evaluator;
pub mod stage;

pub use direct_evaluator::DirectEvaluator;
pub use grader::{Grader, GradingInput};
pub use legacy_evaluator::LegacyEvaluator;
pub use rubric_evaluator::RubricEvaluator;
