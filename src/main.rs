use clap::{Parser, Subcommand};
use fleetsync_lib::commands::sync::{analyze_job, start_sync};
use fleetsync_lib::logging::{LogConfig, SizeRotatingWriter};
use fleetsync_lib::{AppContext, JobKind};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fleetsync", version, about = "Encompass -> Samsara 记录同步")]
struct Cli {
    /// 配置文件路径
    #[arg(long, short, default_value = "config.json")]
    config: PathBuf,

    /// 只分析差异，不发送请求
    #[arg(long)]
    dry_run: bool,

    /// 以 JSON 输出结果
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    job: JobCommand,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum JobCommand {
    /// 新增缺失的客户地址
    Addresses,
    /// 新增缺失的在职司机
    Drivers,
    /// 停用离职司机
    Deactivate,
}

impl From<JobCommand> for JobKind {
    fn from(cmd: JobCommand) -> Self {
        match cmd {
            JobCommand::Addresses => JobKind::Addresses,
            JobCommand::Drivers => JobKind::Drivers,
            JobCommand::Deactivate => JobKind::Deactivate,
        }
    }
}

/// 初始化日志系统
fn init_logging(config_path: &Path) {
    let config = LogConfig::load(config_path);

    let mut env_filter = EnvFilter::from_default_env().add_directive(config.tracing_level().into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = if config.enabled {
        match SizeRotatingWriter::new(&config.log_dir(config_path), config.max_size_mb) {
            Ok(writer) => Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false),
            ),
            Err(e) => {
                eprintln!("无法创建日志文件，只输出到控制台: {}", e);
                None
            }
        }
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = AppContext::new(&cli.config)?;
    let job = JobKind::from(cli.job);

    if cli.dry_run {
        let diff = analyze_job(&ctx, job).await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&diff)?);
        } else {
            println!(
                "{}: 待同步 {}，未映射 {}，无需处理 {}",
                diff.job, diff.mutation_count, diff.unmapped_count, diff.unchanged_count
            );
        }
        return Ok(());
    }

    let report = start_sync(&ctx, job).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{}: 处理 {}，成功 {}，失败 {}，未映射 {}",
            report.job,
            report.tally.processed,
            report.tally.successful,
            report.tally.failed,
            report.tally.skipped_unmapped
        );
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.config);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("运行终止: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
