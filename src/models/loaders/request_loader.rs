use crate::models::submission::{BatchRequest, DirectEvaluationRequest};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::path::Path;
use tokio::fs;

/// 从 JSON 或 TOML 文件加载批量评分请求
pub async fn load_batch_request(path: &Path) -> Result<BatchRequest> {
    load_document(path).await
}

/// 从 JSON 或 TOML 文件加载单份评分请求
pub async fn load_direct_request(path: &Path) -> Result<DirectEvaluationRequest> {
    load_document(path).await
}

/// 加载评分标准（JSON）
pub async fn load_rubric(path: &Path) -> Result<JsonValue> {
    load_document(path).await
}

/// 读取纯文本（学生作答或答案要点）
pub async fn load_text(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取文本文件: {}", path.display()))
}

/// 按扩展名选择解析器：`.toml` 走 TOML，其余按 JSON
async fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取文件: {}", path.display()))?;

    let is_toml = path.extension().and_then(|s| s.to_str()) == Some("toml");
    if is_toml {
        toml::from_str(&content)
            .with_context(|| format!("无法解析TOML文件: {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("无法解析JSON文件: {}", path.display()))
    }
}
