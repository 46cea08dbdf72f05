//! 수집 프로세스 하트비트 발행.
//!
//! 페이지 기록마다 상태 파일을 다시 써서 감시 프로세스에 진행을 알립니다.
//! 상태 파일 기록 실패는 수집을 멈추지 않습니다 (경고만 남김).

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use trader_core::heartbeat::HeartbeatFile;
use trader_core::{HeartbeatPhase, HeartbeatRecord};

/// 하트비트 발행기
#[derive(Debug)]
pub struct HeartbeatWriter {
    file: Option<HeartbeatFile>,
    pid: u32,
    launch_id: Option<String>,
    sequence: u64,
    last: Option<HeartbeatRecord>,
}

impl HeartbeatWriter {
    /// 상태 파일에 기록하는 발행기
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(HeartbeatFile::new(path)),
            pid: std::process::id(),
            launch_id: None,
            sequence: 0,
            last: None,
        }
    }

    /// 파일 없이 마지막 레코드만 유지하는 발행기
    pub fn in_memory() -> Self {
        Self {
            file: None,
            pid: std::process::id(),
            launch_id: None,
            sequence: 0,
            last: None,
        }
    }

    /// 감시 프로세스가 부여한 실행 토큰을 레코드에 포함합니다.
    pub fn with_launch_id(mut self, launch_id: Option<String>) -> Self {
        self.launch_id = launch_id;
        self
    }

    /// 진행 알림
    pub fn beat(&mut self, phase: HeartbeatPhase, symbol: Option<&str>) {
        self.publish(phase, symbol, None);
    }

    /// 의도된 대기 알림. 기록 시각부터 `wait` 동안은 정지로 판정되지 않습니다.
    pub fn idle_for(&mut self, wait: Duration, symbol: Option<&str>) {
        let wait = chrono::Duration::from_std(wait).unwrap_or(chrono::Duration::MAX);
        self.publish(HeartbeatPhase::Idle, symbol, Some(wait));
    }

    /// 마지막으로 발행한 레코드
    pub fn last(&self) -> Option<&HeartbeatRecord> {
        self.last.as_ref()
    }

    fn publish(
        &mut self,
        phase: HeartbeatPhase,
        symbol: Option<&str>,
        idle: Option<chrono::Duration>,
    ) {
        self.sequence += 1;
        let now = Utc::now();
        let record = HeartbeatRecord {
            pid: self.pid,
            launch_id: self.launch_id.clone(),
            sequence: self.sequence,
            last_progress_at: now,
            current_symbol: symbol.map(str::to_string),
            phase,
            idle_until: idle.map(|wait| idle_deadline(now, wait)),
        };

        if let Some(file) = &self.file {
            if let Err(e) = file.write(&record) {
                tracing::warn!(error = %e, "하트비트 기록 실패");
            }
        }
        self.last = Some(record);
    }
}

fn idle_deadline(now: DateTime<Utc>, wait: chrono::Duration) -> DateTime<Utc> {
    now.checked_add_signed(wait).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
