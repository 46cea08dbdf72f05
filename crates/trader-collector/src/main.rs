//! Minute-bar collector CLI.

use std::collections::HashSet;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trader_collector::modules::{
    self, CheckpointStatus, CheckpointStore, CollectorContext, CsvBarSink, HeartbeatWriter,
    YahooMinuteProvider,
};
use trader_collector::{CollectorConfig, CollectorError, Result};
use trader_core::env::split_list;
use trader_core::{exit_code, normalize_code};

#[derive(Parser)]
#[command(name = "trader-collector")]
#[command(about = "Rate-limited, resumable minute-bar collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// 1분봉 수집 (기본 명령, 체크포인트에서 재개)
    Collect {
        /// 특정 심볼만 수집 (쉼표로 구분, 예: "005930,000660")
        #[arg(long)]
        symbols: Option<String>,

        /// 이전 실행에서 실패한 심볼도 다시 시도
        #[arg(long)]
        retry_failed: bool,
    },

    /// 체크포인트 조회/초기화
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// 심볼별 진행 상태 출력
    List {
        /// 이 상태만 출력 (pending, in_progress, done, failed)
        #[arg(long)]
        status: Option<String>,
    },

    /// 심볼 진행 상태 초기화
    Reset {
        /// 초기화할 심볼 코드
        ids: Vec<String>,

        /// `failed` 심볼 전체 초기화
        #[arg(long, conflicts_with = "all")]
        failed: bool,

        /// 모든 기록 삭제
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    tracing::info!(pid = std::process::id(), "Minute-bar collector 시작");

    match run(cli).await {
        Ok(()) => {
            tracing::info!("Minute-bar collector 종료");
            ExitCode::from(exit_code::SUCCESS as u8)
        }
        Err(e) => {
            let code = e.exit_code();
            tracing::error!(error = %e, exit_code = code, "Minute-bar collector 비정상 종료");
            ExitCode::from(code as u8)
        }
    }
}

/// 로깅 초기화 (`LOG_FORMAT=json`이면 JSON 출력)
fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("trader_collector={0},trader_core={0}", log_level).into()
    });
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = CollectorConfig::from_env()?;
    tracing::debug!(
        checkpoint = %config.paths.checkpoint_path.display(),
        output_dir = %config.paths.output_dir.display(),
        heartbeat = %config.paths.heartbeat_path.display(),
        launch_id = ?config.paths.launch_id,
        "설정 로드 완료"
    );

    match cli.command {
        None => run_collect(config, None).await,
        Some(Commands::Collect {
            symbols,
            retry_failed,
        }) => {
            if retry_failed {
                config.collect.retry_failed = true;
            }
            run_collect(config, symbols).await
        }
        Some(Commands::Checkpoint { action }) => run_checkpoint(&config, action),
    }
}

async fn run_collect(config: CollectorConfig, filter: Option<String>) -> Result<()> {
    let mut symbols = modules::load_symbols(&config.paths.symbol_files)?;
    if let Some(filter) = filter {
        let wanted: HashSet<String> = split_list(&filter)
            .iter()
            .filter_map(|s| normalize_code(s))
            .collect();
        symbols.retain(|s| wanted.contains(&s.id));
    }
    if symbols.is_empty() {
        return Err(CollectorError::SymbolSource(format!(
            "수집할 심볼이 없습니다 (SYMBOL_FILES: {:?})",
            config.paths.symbol_files
        )));
    }

    let store = CheckpointStore::load(&config.paths.checkpoint_path)?;
    let provider = YahooMinuteProvider::new(&config.provider)?;
    let sink = CsvBarSink::new(&config.paths.output_dir);
    let heartbeat = HeartbeatWriter::new(&config.paths.heartbeat_path)
        .with_launch_id(config.paths.launch_id.clone());

    let mut ctx = CollectorContext::new(&config, provider, sink, store, heartbeat);
    let stats = modules::collect_minute_bars(&mut ctx, &symbols).await?;
    stats.log_summary("1분봉 수집");

    let counts = ctx.store.status_counts();
    tracing::info!(
        pending = counts.pending,
        in_progress = counts.in_progress,
        done = counts.done,
        failed = counts.failed,
        "체크포인트 현황"
    );

    let failed: Vec<&str> = ctx
        .store
        .entries()
        .iter()
        .filter(|(_, cp)| cp.status == CheckpointStatus::Failed)
        .map(|(id, _)| id.as_str())
        .collect();
    if !failed.is_empty() {
        tracing::warn!(
            count = failed.len(),
            symbols = %failed.join(","),
            "실패 심볼 (--retry-failed 또는 checkpoint reset --failed로 재시도)"
        );
    }

    Ok(())
}

fn run_checkpoint(config: &CollectorConfig, action: CheckpointAction) -> Result<()> {
    let mut store = CheckpointStore::load(&config.paths.checkpoint_path)?;

    match action {
        CheckpointAction::List { status } => {
            if let Some(run) = store.run() {
                println!(
                    "기간: {} ~ {} (실행 {}회, 마지막 {})",
                    run.window_start.format("%Y-%m-%d"),
                    run.window_end.format("%Y-%m-%d"),
                    run.runs,
                    run.last_run_at.format("%Y-%m-%d %H:%M:%S")
                );
            }

            println!(
                "{:<8} {:<12} {:>5} {:>8} {:>9} {:<12} 마지막 에러",
                "심볼", "상태", "시도", "페이지", "행", "커서"
            );
            for (id, cp) in store.entries() {
                if status.as_deref().is_some_and(|s| s != cp.status.as_str()) {
                    continue;
                }
                println!(
                    "{:<8} {:<12} {:>5} {:>8} {:>9} {:<12} {}",
                    id,
                    cp.status.as_str(),
                    cp.attempts,
                    cp.pages,
                    cp.rows_written,
                    cp.cursor.as_ref().map(|c| c.as_str()).unwrap_or("-"),
                    cp.last_error.as_deref().unwrap_or("")
                );
            }

            let counts = store.status_counts();
            println!(
                "\n합계: pending {} / in_progress {} / done {} / failed {}",
                counts.pending, counts.in_progress, counts.done, counts.failed
            );
        }
        CheckpointAction::Reset { ids, failed, all } => {
            let now = chrono::Utc::now();
            let cleared = if all {
                store.reset_all()?
            } else if failed {
                store.reset_failed(now)?
            } else if ids.is_empty() {
                return Err(CollectorError::Config(
                    "초기화할 심볼 코드 또는 --failed/--all을 지정하세요".to_string(),
                ));
            } else {
                let ids: Vec<String> = ids.iter().filter_map(|s| normalize_code(s)).collect();
                store.reset(ids, now)?
            };
            tracing::info!(cleared, path = %store.path().display(), "체크포인트 초기화");
        }
    }

    Ok(())
}
