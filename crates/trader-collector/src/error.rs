//! 에러 타입 정의.

use thiserror::Error;
use trader_core::{exit_code, CoreError};

use crate::modules::checkpoint::CheckpointError;

/// Collector 에러 타입
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// 체크포인트 저장소 에러 (손상 포함)
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// 출력 기록 에러
    #[error("Output sink error: {0}")]
    Sink(String),

    /// 종목 목록 에러
    #[error("Symbol source error: {0}")]
    SymbolSource(String),

    /// 세션/인증 상실 (새 프로세스로 재시작 필요)
    #[error("Session lost: {0}")]
    SessionLost(String),

    /// 공유 상태 파일 에러
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CollectorError {
    /// 프로세스 종료 코드.
    ///
    /// 감시 프로세스는 이 값으로 재시작 여부를 결정합니다.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SessionLost(_) => exit_code::SESSION_LOST,
            // 기록 실패는 일시적일 수 있으므로 재시작 대상
            Self::Checkpoint(CheckpointError::Write(_)) => exit_code::FAILURE,
            Self::Config(_) | Self::Checkpoint(_) | Self::SymbolSource(_) => {
                exit_code::FATAL_CONFIG
            }
            Self::Sink(_) | Self::Core(_) => exit_code::FAILURE,
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
