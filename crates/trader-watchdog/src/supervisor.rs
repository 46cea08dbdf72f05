//! 수집 프로세스 감시 상태 머신.
//!
//! 자식 프로세스를 실행하고 하트비트 상태 파일로 "진행 여부"를 판단합니다.
//! 프로세스가 살아 있는 것(OS)과 진행 중인 것(애플리케이션)은 다르며,
//! 정지 판정에는 후자만 사용합니다.
//!
//! 하트비트는 실행마다 부여한 토큰(`launch_id`)으로 현재 자식의 것인지 확인합니다.
//! 자식이 래퍼 명령(`sh -c`, `cargo run` 등)이면 하트비트를 기록하는 프로세스의
//! pid가 직접 자식과 다르기 때문입니다.
//!
//! # 상태 전이
//!
//! ```text
//! spawning → running → healthy ─┐
//!               │         │     │ 진행 없이 timeout 경과
//!               └─────────┴→ stalled → killed → (cooldown) → spawning
//! ```
//!
//! 자식 종료 후:
//! - 정상 종료(0) → `stopped`, 감시 종료
//! - 복구 불가 코드(78) → 감시 중단
//! - 그 외 비정상 종료 → 즉시 재시작
//! - 정지로 종료시킴 → cooldown 후 재시작

use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use trader_core::exit_code;
use trader_core::heartbeat::HeartbeatFile;
use trader_core::HeartbeatRecord;

use crate::config::SupervisorConfig;
use crate::error::WatchdogError;
use crate::Result;

/// 자식 프로세스 종료 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Success,
    /// 비정상 종료. 시그널로 종료되면 코드가 없습니다.
    Failed { code: Option<i32> },
}

impl From<ExitStatus> for ChildExit {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            Self::Success
        } else {
            Self::Failed {
                code: status.code(),
            }
        }
    }
}

/// 감시 대상 자식 프로세스.
#[async_trait]
pub trait ChildProcess: Send {
    /// OS 프로세스 ID (이미 회수되었으면 `None`)
    fn id(&self) -> Option<u32>;

    /// 이번 실행에 부여한 토큰. 자식의 하트비트에 그대로 기록됩니다.
    fn launch_id(&self) -> &str;

    /// 종료 대기. `select!` 안에서 취소되어도 안전해야 합니다.
    async fn wait(&mut self) -> std::io::Result<ChildExit>;

    /// 강제 종료 후 회수까지 대기합니다. 자식이 실행한 하위 프로세스도 함께 종료합니다.
    async fn kill(&mut self) -> std::io::Result<()>;

    /// 자식 종료 후 남은 하위 프로세스 정리
    async fn cleanup(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// 자식 프로세스 실행기.
pub trait Launcher: Send {
    type Child: ChildProcess;

    fn launch(&mut self) -> Result<Self::Child>;
}

/// 하트비트 조회.
pub trait HeartbeatSource: Send + Sync {
    /// 마지막 하트비트. 아직 없거나 읽을 수 없으면 `None`.
    fn latest(&self) -> Option<HeartbeatRecord>;
}

impl HeartbeatSource for HeartbeatFile {
    fn latest(&self) -> Option<HeartbeatRecord> {
        match self.read() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "하트비트 읽기 실패");
                None
            }
        }
    }
}

/// 현재 시각 (하트비트 시각과 같은 기준)
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 시스템 시계
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 자식 프로세스 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Spawning,
    /// 실행됨, 아직 하트비트 없음
    Running,
    /// 하트비트 확인됨
    Healthy,
    Stalled,
    Killed,
    /// 정상 종료 (터미널)
    Stopped,
}

impl ChildState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spawning => "spawning",
            Self::Running => "running",
            Self::Healthy => "healthy",
            Self::Stalled => "stalled",
            Self::Killed => "killed",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ChildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 감시 종료 사유
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FinalState {
    /// 아직 실행 중
    #[default]
    Running,
    /// 수집 완료 (자식 정상 종료)
    Completed,
    /// 재시작으로 복구할 수 없어 중단
    Aborted(String),
    /// 사용자 중단
    Cancelled,
}

/// 감시 실행 요약
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchdogReport {
    /// 자식 실행 횟수
    pub launches: u32,
    /// 정지로 종료시킨 횟수
    pub stalls: u32,
    /// 비정상 종료 횟수
    pub crashes: u32,
    pub final_state: FinalState,
}

impl WatchdogReport {
    /// 재시작 횟수 (첫 실행 제외)
    pub fn restarts(&self) -> u32 {
        self.stalls + self.crashes
    }

    /// 요약 로그 출력
    pub fn log_summary(&self) {
        tracing::info!(
            launches = self.launches,
            stalls = self.stalls,
            crashes = self.crashes,
            final_state = ?self.final_state,
            "감시 종료"
        );
    }
}

/// 자식 하나의 감시 결과
#[derive(Debug)]
enum ChildOutcome {
    Exited(ChildExit),
    Stalled,
    Cancelled,
}

/// 대기 중 발생한 이벤트
enum Event {
    Exited(std::io::Result<ChildExit>),
    Tick,
    Cancelled,
}

/// 수집 프로세스 감시자.
pub struct Supervisor<L, H, C = SystemClock> {
    config: SupervisorConfig,
    launcher: L,
    heartbeat: H,
    clock: C,
    shutdown: CancellationToken,
    state: ChildState,
}

impl<L, H, C> Supervisor<L, H, C>
where
    L: Launcher,
    H: HeartbeatSource,
    C: Clock,
{
    pub fn new(
        config: SupervisorConfig,
        launcher: L,
        heartbeat: H,
        clock: C,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            launcher,
            heartbeat,
            clock,
            shutdown,
            state: ChildState::Spawning,
        }
    }

    /// 현재 자식 상태
    pub fn state(&self) -> ChildState {
        self.state
    }

    fn transition(&mut self, to: ChildState) {
        if self.state != to {
            tracing::debug!(from = %self.state, to = %to, "자식 상태 전이");
            self.state = to;
        }
    }

    /// 감시 루프 실행.
    ///
    /// 자식이 정상 종료하거나, 복구 불가로 중단되거나, 종료 신호를 받으면 반환합니다.
    pub async fn run(&mut self) -> Result<WatchdogReport> {
        self.config.validate()?;
        let mut report = WatchdogReport::default();

        loop {
            if self.shutdown.is_cancelled() {
                tracing::info!("[STOP] 종료 신호 수신");
                report.final_state = FinalState::Cancelled;
                return Ok(report);
            }

            self.transition(ChildState::Spawning);
            let mut child = self.launcher.launch()?;
            report.launches += 1;
            self.transition(ChildState::Running);
            tracing::info!(
                pid = ?child.id(),
                launch_id = child.launch_id(),
                launch = report.launches,
                timeout_sec = self.config.timeout.as_secs(),
                "[RUN] 수집 프로세스 시작 (타임아웃 {}초)",
                self.config.timeout.as_secs()
            );

            let cooldown = match self.watch(&mut child).await? {
                ChildOutcome::Exited(ChildExit::Success) => {
                    self.transition(ChildState::Stopped);
                    tracing::info!("[OK] 정상 종료 → 감시 종료");
                    report.final_state = FinalState::Completed;
                    return Ok(report);
                }
                ChildOutcome::Exited(ChildExit::Failed { code })
                    if code.is_some_and(exit_code::is_unrecoverable) =>
                {
                    let reason = format!("복구 불가 종료 코드 {:?}", code);
                    tracing::error!(code = ?code, "[ABORT] {} → 감시 중단", reason);
                    report.final_state = FinalState::Aborted(reason);
                    return Ok(report);
                }
                ChildOutcome::Exited(ChildExit::Failed { code }) => {
                    report.crashes += 1;
                    tracing::warn!(code = ?code, "수집 프로세스 비정상 종료");
                    Duration::ZERO
                }
                ChildOutcome::Stalled => {
                    report.stalls += 1;
                    self.config.restart_cooldown
                }
                ChildOutcome::Cancelled => {
                    tracing::info!("[STOP] 종료 신호 수신, 수집 프로세스 종료");
                    report.final_state = FinalState::Cancelled;
                    return Ok(report);
                }
            };

            let restarts = report.restarts();
            if self.config.max_restarts > 0 && restarts > self.config.max_restarts {
                let reason = format!("재시작 한도 초과({})", self.config.max_restarts);
                tracing::error!("[ABORT] {} → 감시 중단", reason);
                report.final_state = FinalState::Aborted(reason);
                return Ok(report);
            }

            tracing::info!(
                restarts,
                cooldown_sec = cooldown.as_secs(),
                "[RESTART] {}초 후 재시작 (누적 {})",
                cooldown.as_secs(),
                restarts
            );
            if !cooldown.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(cooldown) => {}
                    _ = self.shutdown.cancelled() => {}
                }
            }
        }
    }

    /// 자식 하나를 종료될 때까지 감시합니다.
    async fn watch(&mut self, child: &mut L::Child) -> Result<ChildOutcome> {
        let timeout = chrono::Duration::from_std(self.config.timeout)
            .map_err(|_| WatchdogError::Config("TIMEOUT_SEC 범위 초과".to_string()))?;
        let spawned_at = self.clock.now();
        let pid = child.id();
        let launch_id = child.launch_id().to_string();
        let mut last_sequence: Option<u64> = None;

        loop {
            // 이번 실행의 하트비트만 사용 (이전 실행이 남긴 파일은 무시)
            let heartbeat = self
                .heartbeat
                .latest()
                .filter(|hb| hb.launch_id.as_deref() == Some(launch_id.as_str()));

            let baseline = match &heartbeat {
                Some(hb) => {
                    if last_sequence != Some(hb.sequence) {
                        last_sequence = Some(hb.sequence);
                        if self.state == ChildState::Running {
                            tracing::info!(
                                pid = hb.pid,
                                symbol = ?hb.current_symbol,
                                "[OK] 하트비트 확인"
                            );
                        } else {
                            tracing::debug!(
                                sequence = hb.sequence,
                                phase = hb.phase.as_str(),
                                symbol = ?hb.current_symbol,
                                "[OK] 진행"
                            );
                        }
                        self.transition(ChildState::Healthy);
                    }
                    spawned_at.max(hb.progress_baseline())
                }
                None => spawned_at,
            };

            let now = self.clock.now();
            let deadline = baseline + timeout;
            if now >= deadline {
                self.transition(ChildState::Stalled);
                tracing::warn!(
                    pid = ?pid,
                    idle_sec = (now - baseline).num_seconds(),
                    symbol = ?heartbeat.as_ref().and_then(|hb| hb.current_symbol.clone()),
                    "[TIMEOUT] {}초 무응답 → 프로세스 재시작",
                    self.config.timeout.as_secs()
                );
                child.kill().await?;
                self.transition(ChildState::Killed);
                return Ok(ChildOutcome::Stalled);
            }

            let until_deadline = (deadline - now).to_std().unwrap_or(Duration::ZERO);
            let sleep_for = self.config.poll_interval.min(until_deadline);

            let event = tokio::select! {
                exit = child.wait() => Event::Exited(exit),
                _ = tokio::time::sleep(sleep_for) => Event::Tick,
                _ = self.shutdown.cancelled() => Event::Cancelled,
            };

            match event {
                Event::Exited(Ok(exit)) => {
                    if let Err(e) = child.cleanup().await {
                        tracing::warn!(error = %e, "하위 프로세스 정리 실패");
                    }
                    return Ok(ChildOutcome::Exited(exit));
                }
                Event::Exited(Err(e)) => {
                    tracing::warn!(error = %e, "수집 프로세스 대기 실패, 비정상 종료로 처리");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "수집 프로세스 종료 실패");
                    }
                    return Ok(ChildOutcome::Exited(ChildExit::Failed { code: None }));
                }
                Event::Tick => {}
                Event::Cancelled => {
                    child.kill().await?;
                    self.transition(ChildState::Killed);
                    return Ok(ChildOutcome::Cancelled);
                }
            }
        }
    }
}
