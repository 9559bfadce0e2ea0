//! Triad 命令行
//!
//! - `run-episode`: 运行一次 Episode，向 stdout 打印 JSON 摘要
//! - `build-trajectories`: 把追踪目录导出为微调数据集

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use triad::config::{load_config, Overrides};
use triad::dataset::build_trajectory_dataset;
use triad::EpisodeRunner;

#[derive(Parser)]
#[command(name = "triad", version, about = "Planner / Executor / Reviewer agent loop")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 运行一次 Episode
    RunEpisode(RunEpisodeArgs),
    /// 导出追踪为 JSONL 数据集
    BuildTrajectories {
        #[arg(long, default_value = "artifacts/traces")]
        trace_dir: PathBuf,
        #[arg(long, default_value = "artifacts/datasets/trajectories.jsonl")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct RunEpisodeArgs {
    #[arg(long)]
    goal: String,
    /// 额外的 TOML 配置文件
    #[arg(long)]
    config: Option<PathBuf>,
    /// 强制使用确定性策略
    #[arg(long)]
    mock: bool,
    /// 开启追踪
    #[arg(long)]
    trace: bool,
    #[arg(long)]
    max_steps: Option<u32>,
    #[arg(long)]
    seed: Option<i64>,
    /// codeact | react
    #[arg(long)]
    agentic_mode: Option<String>,
    #[arg(long)]
    no_dynamic_replanning: bool,
    #[arg(long)]
    use_cot: bool,
    #[arg(long)]
    environment: Option<String>,
    #[arg(long)]
    prompts_dir: Option<PathBuf>,
    #[arg(long)]
    planner_model: Option<String>,
    #[arg(long)]
    executor_model: Option<String>,
    #[arg(long)]
    reviewer_model: Option<String>,
    /// 打印合并后的配置后退出
    #[arg(long)]
    print_effective_config: bool,
}

impl RunEpisodeArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            force_mock: self.mock,
            trace: self.trace,
            seed: self.seed,
            max_steps: self.max_steps,
            agentic_mode: self.agentic_mode.clone(),
            dynamic_replanning: self.no_dynamic_replanning.then_some(false),
            use_cot: self.use_cot,
            environment: self.environment.clone(),
            prompts_dir: self.prompts_dir.clone(),
            planner_model: self.planner_model.clone(),
            executor_model: self.executor_model.clone(),
            reviewer_model: self.reviewer_model.clone(),
        }
    }
}

async fn run_episode(args: RunEpisodeArgs) -> Result<()> {
    let cfg = load_config(args.config.clone())
        .context("Failed to load config")?
        .apply_overrides(&args.overrides());
    cfg.validate()?;

    if args.print_effective_config {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(());
    }

    let mock = cfg.runtime.force_mock;
    let runner = EpisodeRunner::new(cfg)?;
    let outcome = runner.run(&args.goal).await.context("Episode failed")?;
    println!("{}", serde_json::to_string_pretty(&outcome.summary(mock))?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    triad::observability::init();

    match Cli::parse().command {
        Command::RunEpisode(args) => run_episode(args).await,
        Command::BuildTrajectories { trace_dir, output } => {
            let summary = build_trajectory_dataset(&trace_dir, &output)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}
