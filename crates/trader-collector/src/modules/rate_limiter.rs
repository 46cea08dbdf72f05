//! 슬라이딩 윈도우 호출 한도 모듈.
//!
//! 외부 API의 "W초 동안 최대 K회" 제한을 호출 측에서 지킵니다.
//! 고정 구간 카운터가 아니라 최근 호출 시각의 큐를 유지하므로,
//! 구간 경계에서 2K회가 몰리는 버스트가 생기지 않습니다.
//!
//! 호출 시각 `t`는 `[t, t + W)` 구간 동안 한도를 차지합니다.
//!
//! 윈도우는 프로세스 재시작을 넘어 이어집니다. 최근 호출 시각을 벽시계 기준으로
//! 내보내 체크포인트에 저장하고, 새 프로세스는 시작할 때 이를 복원합니다.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// 최근 호출 시각 윈도우 (RateWindow).
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    max_calls: usize,
    window: Duration,
    calls: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: VecDeque::with_capacity(max_calls),
        }
    }

    /// 윈도우를 벗어난 호출 제거
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.calls.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// `now`에 호출하려면 기다려야 하는 시간. 바로 호출 가능하면 0.
    pub fn wait_time(&mut self, now: Instant) -> Duration {
        self.prune(now);
        if self.calls.len() < self.max_calls {
            return Duration::ZERO;
        }
        match self.calls.front() {
            Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// 호출 시각 기록
    pub fn record(&mut self, now: Instant) {
        self.calls.push_back(now);
    }

    /// 이전 호출 시각으로 윈도우를 채웁니다.
    ///
    /// 한도 계산에는 최근 `max_calls`개만 필요하므로 그보다 오래된 항목은 버립니다.
    pub fn seed(&mut self, calls: impl IntoIterator<Item = Instant>, now: Instant) {
        let mut calls: Vec<Instant> = calls.into_iter().map(|t| t.min(now)).collect();
        calls.sort();
        self.calls.extend(calls);
        self.prune(now);
        while self.calls.len() > self.max_calls {
            self.calls.pop_front();
        }
    }

    /// 윈도우 안의 호출 시각 (오래된 순)
    pub fn calls(&self) -> impl Iterator<Item = Instant> + '_ {
        self.calls.iter().copied()
    }

    /// 현재 윈도우 안의 호출 수
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }
}

/// 호출 한도 게이트.
///
/// 수집 루프는 단일 태스크에서 직렬로 호출하므로 `&mut self`로 충분합니다.
#[derive(Debug)]
pub struct RateLimiter {
    window: SlidingWindow,
    total_wait: Duration,
    /// 단조 시계와 벽시계의 대응점 (호출 시각 저장/복원용)
    epoch: Instant,
    epoch_wall: DateTime<Utc>,
}

impl RateLimiter {
    /// 윈도우(`window`)당 최대 `max_calls`회 호출을 허용하는 limiter 생성
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            window: SlidingWindow::new(max_calls, window),
            total_wait: Duration::ZERO,
            epoch: Instant::now(),
            epoch_wall: Utc::now(),
        }
    }

    /// 단조 시계 `instant`가 벽시계 `wall`에 해당한다고 지정합니다.
    pub fn with_epoch(mut self, instant: Instant, wall: DateTime<Utc>) -> Self {
        self.epoch = instant;
        self.epoch_wall = wall;
        self
    }

    fn to_wall(&self, at: Instant) -> DateTime<Utc> {
        if at >= self.epoch {
            self.epoch_wall + chrono::Duration::from_std(at - self.epoch).unwrap_or_default()
        } else {
            self.epoch_wall - chrono::Duration::from_std(self.epoch - at).unwrap_or_default()
        }
    }

    fn to_instant(&self, wall: DateTime<Utc>) -> Option<Instant> {
        let offset = wall - self.epoch_wall;
        match offset.to_std() {
            Ok(ahead) => Some(self.epoch + ahead),
            Err(_) => self.epoch.checked_sub((-offset).to_std().ok()?),
        }
    }

    /// 윈도우 안의 최근 호출 시각 (벽시계, 오래된 순)
    pub fn recent_calls(&self) -> Vec<DateTime<Utc>> {
        self.window.calls().map(|at| self.to_wall(at)).collect()
    }

    /// 이전 프로세스가 남긴 호출 시각을 윈도우에 복원합니다.
    ///
    /// 미래 시각(시계 역행)은 현재 호출로 취급합니다. 복원된 항목 수를 반환합니다.
    pub fn restore(&mut self, calls: &[DateTime<Utc>]) -> usize {
        let now = Instant::now();
        let instants: Vec<Instant> = calls.iter().filter_map(|&c| self.to_instant(c)).collect();
        self.window.seed(instants, now);
        self.window.in_flight()
    }

    /// 지금 `acquire`하면 기다려야 하는 시간 (기록하지 않음)
    pub fn next_wait(&mut self) -> Duration {
        self.window.wait_time(Instant::now())
    }

    /// 호출 한 번을 예약합니다.
    ///
    /// 한도를 넘지 않을 때까지 대기한 뒤 현재 시각을 기록하고 반환합니다.
    /// 실패하지 않으며 지연만 발생합니다.
    pub async fn acquire(&mut self) {
        loop {
            let now = Instant::now();
            let wait = self.window.wait_time(now);
            if wait.is_zero() {
                self.window.record(now);
                return;
            }

            tracing::debug!(
                wait_ms = wait.as_millis() as u64,
                in_flight = self.window.in_flight(),
                "호출 한도 도달, 대기"
            );
            self.total_wait += wait;
            tokio::time::sleep(wait).await;
        }
    }

    /// 누적 대기 시간
    pub fn total_wait(&self) -> Duration {
        self.total_wait
    }
}
