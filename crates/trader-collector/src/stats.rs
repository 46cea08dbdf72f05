//! 수집 통계 구조체.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 수집 실행 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    /// 대상 심볼 수
    pub total: usize,
    /// 이번 실행에서 완료된 심볼
    pub done: usize,
    /// 이번 실행에서 재시도 한도를 넘긴 심볼
    pub failed: usize,
    /// 이미 완료(또는 실패 확정)되어 건너뛴 심볼
    pub skipped: usize,
    /// 이전 실행의 커서에서 재개한 심볼
    pub resumed: usize,
    /// 기록한 페이지 수
    pub pages: usize,
    /// 기록한 행 수
    pub rows: usize,
    /// 재시도 횟수
    pub retries: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
    /// 호출 한도로 대기한 시간
    #[serde(skip)]
    pub rate_limit_wait: Duration,
}

impl CollectionStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 처리(완료 + 실패)된 심볼 중 완료 비율 (%)
    pub fn success_rate(&self) -> f64 {
        let attempted = self.done + self.failed;
        if attempted == 0 {
            0.0
        } else {
            (self.done as f64 / attempted as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            done = self.done,
            failed = self.failed,
            skipped = self.skipped,
            resumed = self.resumed,
            pages = self.pages,
            rows = self.rows,
            retries = self.retries,
            success_rate = format!("{:.1}%", self.success_rate()),
            rate_limit_wait = format!("{:.1}s", self.rate_limit_wait.as_secs_f64()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "수집 완료"
        );
    }
}
