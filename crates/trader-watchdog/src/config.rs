//! 환경변수 기반 설정 모듈.

use std::path::PathBuf;
use std::time::Duration;

use trader_core::env::{env_var_parse, env_var_string};

use crate::error::WatchdogError;
use crate::Result;

/// Watchdog 전체 설정
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// 감시 정책
    pub supervisor: SupervisorConfig,
    /// 하트비트 상태 파일 (자식에게 `HEARTBEAT_PATH`로 전달)
    pub heartbeat_path: PathBuf,
    /// 자식 명령 (`COLLECTOR_COMMAND`, 비어 있으면 기본 수집기)
    pub command: Vec<String>,
}

/// 감시 정책
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// 진행 없이 허용하는 최대 시간
    pub timeout: Duration,
    /// 정지로 종료시킨 뒤 재시작 전 대기 시간
    pub restart_cooldown: Duration,
    /// 재시작 한도 (0이면 무제한)
    pub max_restarts: u32,
    /// 하트비트 확인 주기
    pub poll_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(240),
            restart_cooldown: Duration::from_secs(15),
            max_restarts: 0,
            poll_interval: Duration::from_millis(1000),
        }
    }
}

impl WatchdogConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            supervisor: SupervisorConfig {
                timeout: Duration::from_secs(env_var_parse("TIMEOUT_SEC", 240)),
                restart_cooldown: Duration::from_secs(env_var_parse("RESTART_COOLDOWN_SEC", 15)),
                max_restarts: env_var_parse("MAX_RESTARTS", 0),
                poll_interval: Duration::from_millis(env_var_parse("POLL_INTERVAL_MS", 1000)),
            },
            heartbeat_path: env_var_string("HEARTBEAT_PATH", "heartbeat.json").into(),
            command: std::env::var("COLLECTOR_COMMAND")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        };

        config.supervisor.validate()?;
        Ok(config)
    }
}

impl SupervisorConfig {
    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(WatchdogError::Config(
                "TIMEOUT_SEC는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(WatchdogError::Config(
                "POLL_INTERVAL_MS는 1 이상이어야 합니다".to_string(),
            ));
        }
        if chrono::Duration::from_std(self.timeout).is_err() {
            return Err(WatchdogError::Config(format!(
                "TIMEOUT_SEC 범위 초과: {:?}",
                self.timeout
            )));
        }
        Ok(())
    }
}
