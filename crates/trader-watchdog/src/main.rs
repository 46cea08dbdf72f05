//! Collector watchdog CLI.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trader_core::heartbeat::HeartbeatFile;
use trader_watchdog::{FinalState, ProcessLauncher, Supervisor, SystemClock, WatchdogConfig};

#[derive(Parser)]
#[command(name = "trader-watchdog")]
#[command(about = "Restarts the minute-bar collector when its heartbeat stalls", long_about = None)]
#[command(version)]
struct Cli {
    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 무응답 허용 시간 (초, TIMEOUT_SEC 대체)
    #[arg(long)]
    timeout_sec: Option<u64>,

    /// 정지 후 재시작 대기 (초, RESTART_COOLDOWN_SEC 대체)
    #[arg(long)]
    cooldown_sec: Option<u64>,

    /// 재시작 한도 (0이면 무제한, MAX_RESTARTS 대체)
    #[arg(long)]
    max_restarts: Option<u32>,

    /// 실행할 수집 명령 (기본: 같은 디렉토리의 trader-collector)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut config = WatchdogConfig::from_env().context("설정 로드 실패")?;
    if let Some(secs) = cli.timeout_sec {
        config.supervisor.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = cli.cooldown_sec {
        config.supervisor.restart_cooldown = Duration::from_secs(secs);
    }
    if let Some(max) = cli.max_restarts {
        config.supervisor.max_restarts = max;
    }
    if !cli.command.is_empty() {
        config.command = cli.command;
    }
    if config.command.is_empty() {
        config.command = vec![default_collector_command()?];
    }

    let launcher = ProcessLauncher::new(&config.command, &config.heartbeat_path)?;
    tracing::info!(
        command = %config.command.join(" "),
        heartbeat = %config.heartbeat_path.display(),
        timeout_sec = config.supervisor.timeout.as_secs(),
        cooldown_sec = config.supervisor.restart_cooldown.as_secs(),
        max_restarts = config.supervisor.max_restarts,
        "Collector watchdog 시작"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let mut supervisor = Supervisor::new(
        config.supervisor.clone(),
        launcher,
        HeartbeatFile::new(&config.heartbeat_path),
        SystemClock,
        shutdown,
    );
    let report = supervisor.run().await?;
    report.log_summary();

    Ok(match report.final_state {
        FinalState::Completed => ExitCode::SUCCESS,
        FinalState::Cancelled => ExitCode::from(130),
        FinalState::Aborted(_) | FinalState::Running => ExitCode::FAILURE,
    })
}

/// 로깅 초기화 (`LOG_FORMAT=json`이면 JSON 출력)
fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("trader_watchdog={}", log_level).into());
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

/// 감시 프로세스와 같은 디렉토리의 `trader-collector`
fn default_collector_command() -> anyhow::Result<String> {
    let exe = std::env::current_exe().context("실행 파일 경로 확인 실패")?;
    let name = format!("trader-collector{}", std::env::consts::EXE_SUFFIX);
    let path = exe
        .parent()
        .map(|dir| dir.join(&name))
        .context("실행 파일 디렉토리 확인 실패")?;
    Ok(path.to_string_lossy().into_owned())
}
