//! 심볼별 체크포인트 저장소.
//!
//! 장시간 실행되는 분봉 수집의 중단/재개를 지원합니다.
//!
//! # 주요 기능
//!
//! - **심볼별 상태**: `pending → in_progress → {done | failed}`
//! - **커서 저장**: 출력 기록이 확정된 페이지까지만 커서를 전진
//! - **원자적 교체**: 임시 파일 기록 후 rename, 강제 종료에도 부분 기록이 보이지 않음
//! - **손상 감지**: 읽을 수 없는 파일은 빈 저장소로 취급하지 않고 시작 에러로 보고
//!
//! # 사용 예
//!
//! ```rust,ignore
//! let mut store = CheckpointStore::load("checkpoint.json")?;
//!
//! // 페이지 기록이 끝난 뒤
//! let mut cp = store.get("005930").cloned().unwrap_or_else(|| SymbolCheckpoint::pending(now));
//! cp.advance(next_cursor, rows, now);
//! store.save("005930", cp)?;
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trader_core::fs::write_json_atomic;
use trader_core::CoreError;

use super::provider::PageCursor;

/// 체크포인트 파일 형식 버전
pub const CHECKPOINT_VERSION: u32 = 1;

/// 체크포인트 저장소 에러
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// 파일을 읽을 수 없음
    #[error("체크포인트 파일을 읽을 수 없습니다 ({path}): {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 파일 내용 손상
    #[error("체크포인트 파일이 손상되었습니다 ({path}): {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// 지원하지 않는 형식 버전
    #[error("지원하지 않는 체크포인트 버전 {found} ({path})")]
    UnsupportedVersion { path: PathBuf, found: u32 },

    /// 기록 실패
    #[error("체크포인트 기록 실패: {0}")]
    Write(#[from] CoreError),
}

/// 체크포인트 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// 대기 중
    Pending,
    /// 수집 중 (중단되었다면 커서부터 재개)
    InProgress,
    /// 완료됨
    Done,
    /// 재시도 한도 초과
    Failed,
}

impl CheckpointStatus {
    /// 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// 심볼 하나의 진행 상태.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolCheckpoint {
    pub status: CheckpointStatus,
    /// 다음에 조회할 페이지 위치. `None`이면 기간 시작부터.
    pub cursor: Option<PageCursor>,
    /// 연속 실패 횟수
    pub attempts: u32,
    pub last_updated: DateTime<Utc>,
    /// 기록된 페이지 수
    #[serde(default)]
    pub pages: u64,
    /// 기록된 행 수 (재조회로 덮어쓴 행 포함)
    #[serde(default)]
    pub rows_written: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SymbolCheckpoint {
    /// 처음 상태
    pub fn pending(now: DateTime<Utc>) -> Self {
        Self {
            status: CheckpointStatus::Pending,
            cursor: None,
            attempts: 0,
            last_updated: now,
            pages: 0,
            rows_written: 0,
            last_error: None,
        }
    }

    /// 수집 시작 표시 (커서는 유지)
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = CheckpointStatus::InProgress;
        self.last_updated = now;
    }

    /// 기록이 확정된 페이지 반영
    pub fn advance(&mut self, next_cursor: Option<PageCursor>, rows: usize, now: DateTime<Utc>) {
        self.status = CheckpointStatus::InProgress;
        self.cursor = next_cursor;
        self.attempts = 0;
        self.pages += 1;
        self.rows_written += rows as u64;
        self.last_error = None;
        self.last_updated = now;
    }

    /// 실패 1회 기록
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.attempts += 1;
        self.last_error = Some(error.into());
        self.last_updated = now;
    }

    pub fn mark_done(&mut self, now: DateTime<Utc>) {
        self.status = CheckpointStatus::Done;
        self.attempts = 0;
        self.last_error = None;
        self.last_updated = now;
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = CheckpointStatus::Failed;
        self.last_updated = now;
    }
}

/// 실행 메타데이터.
///
/// 대상 기간은 첫 실행에서 고정되어 이후 재개 실행에서도 그대로 쓰입니다.
/// 그래야 저장된 커서가 같은 기간을 가리킵니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// 첫 실행 시각
    pub started_at: DateTime<Utc>,
    /// 마지막 실행 시각
    pub last_run_at: DateTime<Utc>,
    /// 대상 기간 시작
    pub window_start: DateTime<Utc>,
    /// 대상 기간 끝
    pub window_end: DateTime<Utc>,
    /// 실행(재시작 포함) 횟수
    pub runs: u32,
    /// 최근 제공자 호출 시각. 재시작한 프로세스가 호출 한도 윈도우를 이어받습니다.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_calls: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointFile {
    version: u32,
    #[serde(default)]
    run: Option<RunMetadata>,
    #[serde(default)]
    symbols: BTreeMap<String, SymbolCheckpoint>,
}

impl Default for CheckpointFile {
    fn default() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            run: None,
            symbols: BTreeMap::new(),
        }
    }
}

/// 상태별 심볼 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub failed: usize,
}

/// 파일 기반 체크포인트 저장소.
///
/// 수집 프로세스만 기록하며, 모든 `save`는 파일 전체를 원자적으로 교체합니다.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    state: CheckpointFile,
}

impl CheckpointStore {
    /// 체크포인트 로드.
    ///
    /// 파일이 없으면 빈 저장소를 반환합니다. 읽기 실패나 손상은 에러입니다.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let path = path.into();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "체크포인트 없음, 새로 시작");
                return Ok(Self {
                    path,
                    state: CheckpointFile::default(),
                });
            }
            Err(source) => return Err(CheckpointError::Unreadable { path, source }),
        };

        let state: CheckpointFile = match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(source) => return Err(CheckpointError::Corrupt { path, source }),
        };
        if state.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                path,
                found: state.version,
            });
        }

        tracing::info!(
            path = %path.display(),
            symbols = state.symbols.len(),
            "체크포인트 로드 완료"
        );
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, symbol_id: &str) -> Option<&SymbolCheckpoint> {
        self.state.symbols.get(symbol_id)
    }

    /// 전체 심볼 상태 (심볼 코드 순)
    pub fn entries(&self) -> &BTreeMap<String, SymbolCheckpoint> {
        &self.state.symbols
    }

    pub fn is_empty(&self) -> bool {
        self.state.symbols.is_empty() && self.state.run.is_none()
    }

    pub fn run(&self) -> Option<&RunMetadata> {
        self.state.run.as_ref()
    }

    /// 실행 시작 기록.
    ///
    /// 저장된 대상 기간이 있으면 유지하고, 없으면 `window`로 고정합니다.
    pub fn begin_run(
        &mut self,
        now: DateTime<Utc>,
        window: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<RunMetadata, CheckpointError> {
        let run = match self.state.run.take() {
            Some(mut run) => {
                run.last_run_at = now;
                run.runs += 1;
                run
            }
            None => RunMetadata {
                started_at: now,
                last_run_at: now,
                window_start: window.0,
                window_end: window.1,
                runs: 1,
                recent_calls: Vec::new(),
            },
        };
        self.state.run = Some(run.clone());
        self.persist()?;
        Ok(run)
    }

    /// 심볼 하나의 상태를 덮어쓰고 디스크에 반영합니다.
    ///
    /// 반환 시점에는 새 값이 안정 저장소에 기록되어 있습니다.
    /// 기록에 실패하면 메모리 상태도 이전 값으로 되돌립니다.
    pub fn save(
        &mut self,
        symbol_id: &str,
        checkpoint: SymbolCheckpoint,
    ) -> Result<(), CheckpointError> {
        let previous = self
            .state
            .symbols
            .insert(symbol_id.to_string(), checkpoint);

        if let Err(e) = self.persist() {
            match previous {
                Some(prev) => self.state.symbols.insert(symbol_id.to_string(), prev),
                None => self.state.symbols.remove(symbol_id),
            };
            return Err(e);
        }
        Ok(())
    }

    /// 최근 제공자 호출 시각을 저장합니다.
    ///
    /// 호출 직전에 기록해야 강제 종료 후에도 그 호출이 한도 계산에 남습니다.
    pub fn record_calls(&mut self, calls: Vec<DateTime<Utc>>) -> Result<(), CheckpointError> {
        match self.state.run.as_mut() {
            Some(run) => run.recent_calls = calls,
            None => return Ok(()),
        }
        self.persist()
    }

    /// 지정한 심볼들을 `pending`으로 초기화합니다. 초기화된 수를 반환합니다.
    pub fn reset<I, S>(
        &mut self,
        symbol_ids: I,
        now: DateTime<Utc>,
    ) -> Result<usize, CheckpointError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut count = 0;
        for id in symbol_ids {
            if let Some(cp) = self.state.symbols.get_mut(id.as_ref()) {
                *cp = SymbolCheckpoint::pending(now);
                count += 1;
            }
        }
        if count > 0 {
            self.persist()?;
        }
        Ok(count)
    }

    /// `failed` 심볼 전체를 `pending`으로 초기화
    pub fn reset_failed(&mut self, now: DateTime<Utc>) -> Result<usize, CheckpointError> {
        let failed: Vec<String> = self
            .state
            .symbols
            .iter()
            .filter(|(_, cp)| cp.status == CheckpointStatus::Failed)
            .map(|(id, _)| id.clone())
            .collect();
        self.reset(failed, now)
    }

    /// 저장소 전체 초기화 (대상 기간 포함)
    pub fn reset_all(&mut self) -> Result<usize, CheckpointError> {
        let count = self.state.symbols.len();
        self.state = CheckpointFile::default();
        self.persist()?;
        Ok(count)
    }

    /// 상태별 심볼 수
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for cp in self.state.symbols.values() {
            match cp.status {
                CheckpointStatus::Pending => counts.pending += 1,
                CheckpointStatus::InProgress => counts.in_progress += 1,
                CheckpointStatus::Done => counts.done += 1,
                CheckpointStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    fn persist(&self) -> Result<(), CheckpointError> {
        write_json_atomic(&self.path, &self.state)?;
        Ok(())
    }
}
