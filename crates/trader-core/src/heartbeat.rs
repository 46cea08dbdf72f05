//! 하트비트 레코드와 상태 파일.
//!
//! 수집 프로세스는 진행이 있을 때마다 작은 JSON 상태 파일을 원자적으로 다시 씁니다.
//! 감시 프로세스는 이 파일만 읽어 "진행 중인가"를 판단하며, 프로세스 생존 여부와
//! 진행 여부를 구분합니다.
//!
//! ```json
//! {
//!   "pid": 4242,
//!   "launch_id": "6f1c2e0a-8f3d-4a51-9a0e-2b7d4c1e9f20",
//!   "sequence": 118,
//!   "last_progress_at": "2025-01-06T02:13:44Z",
//!   "current_symbol": "005930",
//!   "phase": "collecting",
//!   "idle_until": null
//! }
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::fs::write_json_atomic;

/// 감시 프로세스가 실행마다 부여하는 토큰을 전달하는 환경변수
pub const LAUNCH_ID_ENV: &str = "HEARTBEAT_LAUNCH_ID";

/// 수집 프로세스의 현재 단계.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatPhase {
    /// 프로세스 기동, 체크포인트 로드 중
    Starting,
    /// 페이지 조회 중
    Collecting,
    /// 출력/체크포인트 기록 중
    Writing,
    /// 의도된 대기 (제공자 요청에 따른 백오프 등)
    Idle,
}

impl HeartbeatPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Collecting => "collecting",
            Self::Writing => "writing",
            Self::Idle => "idle",
        }
    }
}

/// 하트비트 레코드.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    /// 기록한 프로세스 ID
    pub pid: u32,
    /// 감시 프로세스가 부여한 실행 토큰 (이전 실행이 남긴 파일 식별용).
    /// 래퍼 명령으로 실행되면 `pid`는 직접 자식과 다르므로 토큰으로 구분합니다.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_id: Option<String>,
    /// 기록마다 1씩 증가하는 일련번호
    pub sequence: u64,
    /// 마지막 진행 시각
    pub last_progress_at: DateTime<Utc>,
    /// 현재 처리 중인 종목 코드
    pub current_symbol: Option<String>,
    /// 현재 단계
    pub phase: HeartbeatPhase,
    /// `Idle` 단계의 예정 재개 시각
    #[serde(default)]
    pub idle_until: Option<DateTime<Utc>>,
}

impl HeartbeatRecord {
    /// 정지 판정의 기준 시각.
    ///
    /// 의도된 대기 중이면 예정 재개 시각까지는 진행으로 간주합니다.
    pub fn progress_baseline(&self) -> DateTime<Utc> {
        match (self.phase, self.idle_until) {
            (HeartbeatPhase::Idle, Some(until)) => self.last_progress_at.max(until),
            _ => self.last_progress_at,
        }
    }
}

/// 하트비트 상태 파일.
#[derive(Debug, Clone)]
pub struct HeartbeatFile {
    path: PathBuf,
}

impl HeartbeatFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 레코드를 원자적으로 기록합니다.
    pub fn write(&self, record: &HeartbeatRecord) -> CoreResult<()> {
        write_json_atomic(&self.path, record)
    }

    /// 레코드를 읽습니다. 파일이 아직 없으면 `None`.
    pub fn read(&self) -> CoreResult<Option<HeartbeatRecord>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CoreError::io(&self.path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CoreError::Serialization {
                path: self.path.clone(),
                source,
            })
    }
}
