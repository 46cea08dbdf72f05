//! 에러 타입 정의.

use thiserror::Error;

/// Watchdog 에러 타입
#[derive(Debug, Error)]
pub enum WatchdogError {
    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// 자식 프로세스 실행 실패
    #[error("수집 프로세스 실행 실패 ({program}): {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// 자식 프로세스 종료/대기 실패
    #[error("Process error: {0}")]
    Process(#[from] std::io::Error),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, WatchdogError>;
