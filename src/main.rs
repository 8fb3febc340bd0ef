use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use insight_grader::models::loaders;
use insight_grader::services::NormalizeContext;
use insight_grader::utils::logging;
use insight_grader::{run_batch, Config, GradingInput, GradingPipeline};

/// 试卷自动评分工具
#[derive(Debug, Parser)]
#[command(name = "grader", version, about = "Evaluación automática de pruebas escaneadas")]
struct Cli {
    /// TOML 配置文件（环境变量优先）
    #[arg(long, global = true, env = "GRADER_CONFIG")]
    config: Option<PathBuf>,

    /// 输出 debug 日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 评分单份试卷（JSON / TOML 请求文件）
    Evaluate {
        #[arg(long)]
        request: PathBuf,
    },
    /// 批量评分
    Batch {
        #[arg(long)]
        request: PathBuf,
    },
    /// 直接对文本评分（不经过下载和 OCR）
    GradeText {
        /// 学生作答文本文件
        #[arg(long)]
        student: PathBuf,
        /// 评分细则（JSON / TOML）
        #[arg(long, conflicts_with = "answer_key", required_unless_present = "answer_key")]
        rubric: Option<PathBuf>,
        /// 标准答案文本文件
        #[arg(long)]
        answer_key: Option<PathBuf>,
        /// 评分前先规范化文本
        #[arg(long)]
        normalize: bool,
    },
    /// 检查配置状态
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_toml_file(path)
            .with_context(|| format!("无法加载配置文件: {}", path.display()))?,
        None => Config::from_env(),
    };

    logging::init(cli.verbose || config.verbose_logging);
    logging::log_startup(&config.llm_model_name, config.llm_configured());

    if let Err(e) = config.validate() {
        warn!("⚠️ {}", e);
    }

    let pipeline = GradingPipeline::from_config(&config);

    match cli.command {
        Command::Evaluate { request } => {
            let request = loaders::load_direct_request(&request).await?;
            let response = pipeline.evaluate_document(&request).await;
            print_json(&response)?;
        }
        Command::Batch { request } => {
            let request = loaders::load_batch_request(&request).await?;
            let response = run_batch(&pipeline, &request).await;
            print_json(&response)?;
        }
        Command::GradeText {
            student,
            rubric,
            answer_key,
            normalize,
        } => {
            let mut student_text = loaders::load_text(&student).await?;

            let input = match (rubric, answer_key) {
                (Some(path), _) => GradingInput::Rubric(loaders::load_rubric(&path).await?),
                (None, Some(path)) => {
                    let mut key_text = loaders::load_text(&path).await?;
                    if normalize {
                        key_text = pipeline
                            .normalizer()
                            .normalize(&key_text, NormalizeContext::AnswerKey, false)
                            .await;
                    }
                    GradingInput::AnswerKey(key_text)
                }
                (None, None) => anyhow::bail!("se requiere --rubric o --answer-key"),
            };

            if normalize {
                student_text = pipeline
                    .normalizer()
                    .normalize(&student_text, NormalizeContext::Exam, true)
                    .await;
            }

            let result = pipeline.grader().evaluate(&student_text, &input).await;
            print_json(&result)?;
        }
        Command::Health => {
            print_json(&pipeline.health())?;
        }
    }

    info!("✓ 完成");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("无法序列化输出")?;
    println!("{}", output);
    Ok(())
}
