//! # Insight Grader
//!
//! 无状态的试卷自动评分流水线：下载扫描试卷 → OCR → 文本规范化 → LLM 评分 → 换算到 1-7 分制
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 协作方（Clients）
//! - `clients/` - 外部服务，以 trait 暴露，可替换
//! - `LlmClient` - OpenAI 协议的文本补全（`CompletionBackend`）
//! - `VisionOcr` - Google Cloud Vision 文字识别（`TextExtractor`）
//! - `HttpFetcher` / `StorageResolver` - 文件下载与地址解析
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `json_recovery` - 从 LLM 自由文本恢复 JSON
//! - `scoring` - 分数换算
//! - `TextNormalizer` - OCR 文本规范化与过滤
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一份作答"的评分流程
//! - `RubricEvaluator` / `DirectEvaluator` - 整卷评分
//! - `LegacyEvaluator` - 结构分析 → 提取答案 → 逐题评分
//! - `Grader` - 按评分依据分发
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/pipeline` - 单份试卷的完整流水线
//! - `orchestrator/batch_processor` - 顺序批量评分，逐份隔离失败
//!
//! ## 错误处理
//!
//! 评分入口从不返回 `Err`：所有失败都写进结果的 `error_*` 字段，总分取最低分。

pub mod clients;
pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, StageError, StageOutcome};
pub use models::{
    BatchRequest, BatchResponse, DirectEvaluationRequest, EvaluationResponse, EvaluationResult,
};
pub use orchestrator::{evaluate_batch, run_batch, Collaborators, GradingPipeline};
pub use workflow::{Grader, GradingInput};
