//! 批量评分处理器 - 编排层
//!
//! ## 职责
//!
//! 按输入顺序逐份评分，单份失败在提交边界被捕获并转成错误响应，
//! 不影响后续提交。
//!
//! ## 设计特点
//!
//! - **顺序处理**：一次只处理一份，限制对 LLM / OCR 后端的压力
//! - **逐份隔离**：错误与 panic 都在循环边界捕获
//! - **逐份计时**：每份响应带自己的 `processing_time_seconds`
//! - **向下委托**：单份试卷的处理交给 `GradingPipeline::process_document`

use serde_json::{Map, Value as JsonValue};
use std::time::Instant;
use tracing::{error, info};

use crate::models::{BatchRequest, BatchResponse, EvaluationResponse, Submission};
use crate::orchestrator::pipeline::{GradingPipeline, ProcessedDocument};
use crate::utils::logging::{log_batch_start, log_submission_start, print_final_stats};
use crate::workflow::stage::catch_critical;

/// 批量评分
///
/// # 参数
/// - `pipeline`: 评分流水线
/// - `submissions`: 待评分提交（按顺序处理）
/// - `rubric`: 所有提交共用的评分细则
/// - `test_metadata`: 试卷元数据（名称、编号等）
///
/// # 返回
/// 与输入等长、同序的响应列表；LLM 凭证缺失时整批直接返回配置错误，不下载任何文件
pub async fn evaluate_batch(
    pipeline: &GradingPipeline,
    submissions: &[Submission],
    rubric: &JsonValue,
    test_metadata: &Map<String, JsonValue>,
) -> Vec<EvaluationResponse> {
    let total = submissions.len();

    if let Err(e) = pipeline.ensure_llm_configured() {
        error!("❌ {}，整批拒绝 {} 份提交", e, total);
        return submissions
            .iter()
            .map(|submission| {
                EvaluationResponse::failed(
                    e.to_string(),
                    format!("Error procesando submission: {}", e),
                    Some(submission.identity_metadata()),
                    0.0,
                )
            })
            .collect();
    }

    let mut results = Vec::with_capacity(total);
    let mut stats = BatchStats::default();

    for (index, submission) in submissions.iter().enumerate() {
        log_submission_start(index + 1, total, submission.submission_id);
        let start = Instant::now();

        let outcome = catch_critical(
            "evaluate_batch",
            pipeline.process_document(
                submission.test_url.as_deref(),
                submission.test_key.as_deref(),
                rubric,
            ),
            |msg| Err(crate::error::AppError::Other(format!("Error crítico: {}", msg))),
        )
        .await;
        let elapsed = start.elapsed().as_secs_f64();

        let response = match outcome {
            Ok(processed) => {
                stats.success += 1;
                log_submission_success(submission.submission_id, &processed, elapsed);
                let metadata = submission_metadata(submission, &processed, test_metadata);
                EvaluationResponse::completed(processed.result, metadata, elapsed)
            }
            Err(e) => {
                stats.failed += 1;
                error!("[提交 {}] ❌ 评分失败: {}", submission.submission_id, e);
                EvaluationResponse::failed(
                    e.to_string(),
                    format!("Error procesando submission: {}", e),
                    Some(submission.identity_metadata()),
                    elapsed,
                )
            }
        };
        results.push(response);
    }

    print_final_stats(stats.success, stats.failed, total);
    results
}

/// 处理完整的批量请求
pub async fn run_batch(pipeline: &GradingPipeline, request: &BatchRequest) -> BatchResponse {
    log_batch_start(request.submissions.len(), &request.graded_by);

    let results = evaluate_batch(
        pipeline,
        &request.submissions,
        &request.rubric_data,
        &request.test_data,
    )
    .await;

    BatchResponse {
        message: format!(
            "Evaluación por lotes completada para {} submissions.",
            results.len()
        ),
        graded_by: request.graded_by.clone(),
        results,
    }
}

/// 批次统计
#[derive(Debug, Default)]
struct BatchStats {
    success: usize,
    failed: usize,
}

fn submission_metadata(
    submission: &Submission,
    processed: &ProcessedDocument,
    test_metadata: &Map<String, JsonValue>,
) -> JsonValue {
    let mut metadata = match submission.identity_metadata() {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    };
    metadata.insert("download_url".into(), processed.download_url.clone().into());
    metadata.insert("text_length".into(), processed.text_length.into());
    for (key, target) in [("name", "test_name"), ("id", "test_id")] {
        if let Some(value) = test_metadata.get(key) {
            metadata.insert(target.into(), value.clone());
        }
    }
    JsonValue::Object(metadata)
}

// ========== 日志辅助函数 ==========

fn log_submission_success(submission_id: i64, processed: &ProcessedDocument, elapsed: f64) {
    info!(
        "[提交 {}] ✅ 评分完成: {:.1} 分，耗时 {:.2} 秒",
        submission_id, processed.result.overall_score, elapsed
    );
}
