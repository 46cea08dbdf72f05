//! 공통 에러 타입.

use std::path::PathBuf;
use thiserror::Error;

/// 파일 기반 공유 상태(하트비트, 원자적 교체) 처리 중 발생하는 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 파일 입출력 에러
    #[error("파일 입출력 에러 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 직렬화/역직렬화 에러
    #[error("직렬화 에러 ({path}): {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// 공통 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;
