//! 外部协作方：LLM、OCR、文件下载
//!
//! 每个协作方都以 trait 暴露，评分流程只依赖 trait，测试时可替换为桩实现。

pub mod document_fetcher;
pub mod llm_client;
pub mod vision_client;

pub use document_fetcher::{
    DocumentFetcher, FetchedDocument, HttpFetcher, SourceResolver, StorageResolver,
};
pub use llm_client::{CompletionBackend, LlmClient};
pub use vision_client::{TextExtractor, VisionOcr};
