//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层持有全部外部协作方，负责把"一份试卷"或"一批提交"驱动完整的流水线。
//!
//! ## 模块划分
//!
//! ### `pipeline` - 单份试卷评分流水线
//! - 解析下载地址、下载、OCR
//! - 规范化并过滤 OCR 文本
//! - 调用流程层评分，组装带元数据和耗时的响应
//!
//! ### `batch_processor` - 批量评分处理器
//! - 按顺序逐份处理提交
//! - 在提交边界隔离失败
//! - 输出批次统计
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Submission>)
//!     ↓
//! pipeline (处理单份试卷)
//!     ↓
//! workflow::Grader (评分流程)
//!     ↓
//! services (能力层：JSON 恢复 / 分数换算 / 规范化)
//!     ↓
//! clients (协作方：LLM / OCR / 下载)
//! ```

pub mod batch_processor;
pub mod pipeline;

// 重新导出主要类型
pub use batch_processor::{evaluate_batch, run_batch};
pub use pipeline::{Collaborators, GradingPipeline, ProcessedDocument};
