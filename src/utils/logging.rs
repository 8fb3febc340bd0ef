/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing 日志
///
/// 优先使用 `RUST_LOG`；未设置时按 `verbose` 选择 debug / info。
/// 重复调用不会报错。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "insight_grader={},grader={}",
            default_level, default_level
        ))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `model`: 使用的 LLM 模型
/// - `llm_configured`: LLM 凭证是否可用
pub fn log_startup(model: &str, llm_configured: bool) {
    info!("{}", "=".repeat(60));
    info!("🚀 评分服务启动 - 无状态流水线模式");
    info!("🤖 LLM 模型: {}", model);
    if llm_configured {
        info!("🔑 LLM 凭证: 已配置");
    } else {
        info!("🔑 LLM 凭证: 未配置（评分将返回 error_config）");
    }
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `total`: 提交总数
/// - `graded_by`: 评分人
pub fn log_batch_start(total: usize, graded_by: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始批量评分: 共 {} 份提交", total);
    info!("👤 评分人: {}", graded_by);
    info!("💡 逐份顺序处理，单份失败不影响其余");
    info!("{}", "=".repeat(60));
}

/// 记录单份提交开始
pub fn log_submission_start(index: usize, total: usize, submission_id: i64) {
    info!("\n{}", "─".repeat(60));
    info!("[提交 {}] 处理第 {}/{} 份", submission_id, index, total);
}

/// 打印批次最终统计
///
/// # 参数
/// - `success`: 成功数量
/// - `failed`: 失败数量
/// - `total`: 总数
pub fn print_final_stats(success: usize, failed: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📊 批量评分完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hola", 10), "hola");
        assert_eq!(truncate_text("evaluación", 4), "eval...");
        assert_eq!(truncate_text("", 3), "");
    }
}
