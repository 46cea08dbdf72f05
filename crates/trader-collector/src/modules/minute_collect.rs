//! 1분봉 수집 루프.
//!
//! 심볼 목록을 순서대로 돌며 심볼마다 페이지를 커서 순으로 조회합니다.
//!
//! # 페이지 처리 순서
//!
//! 1. 호출 한도 예약 (`RateLimiter::acquire`) 후 호출 시각을 체크포인트에 기록
//! 2. 제공자 조회 `(심볼, 커서)`
//! 3. 출력 기록 (키 덮어쓰기)
//! 4. 체크포인트 저장 (출력 기록 확정 후에만)
//! 5. 하트비트 발행
//!
//! 3과 4 사이에 종료되면 다음 실행은 같은 페이지를 다시 조회하지만,
//! 출력이 키 덮어쓰기라 중복 행이 생기지 않습니다.
//!
//! 호출 시각은 호출 전에 저장되므로 재시작한 프로세스도 같은 윈도우 안에서
//! 한도를 넘겨 호출하지 않습니다.

use std::time::Instant;

use chrono::{DateTime, Utc};
use trader_core::{HeartbeatPhase, Symbol};

use super::checkpoint::{CheckpointStatus, CheckpointStore, RunMetadata, SymbolCheckpoint};
use super::heartbeat::HeartbeatWriter;
use super::provider::{BarPage, CollectionTask, FetchError, MinuteBarProvider, PageCursor};
use super::rate_limiter::RateLimiter;
use super::sink::BarSink;
use crate::config::CollectorConfig;
use crate::error::CollectorError;
use crate::{CollectionStats, Result};

/// 수집 정책
#[derive(Debug, Clone)]
pub struct CollectPolicy {
    /// 연속 실패 허용 횟수
    pub max_retries: u32,
    /// 이전 실행의 `failed` 심볼 재시도 여부
    pub retry_failed: bool,
    /// 대상 기간 (여유 포함)
    pub target_window: chrono::Duration,
}

impl CollectPolicy {
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self {
            max_retries: config.collect.max_retries_per_symbol,
            retry_failed: config.collect.retry_failed,
            target_window: config.collect.total_window(),
        }
    }
}

/// 심볼 하나의 최종 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolOutcome {
    Done,
    Failed,
}

/// 수집 실행 컨텍스트.
///
/// 실행 상태(제공자 세션, 호출 한도, 체크포인트, 출력)를 한 곳에 모아
/// 루프에 명시적으로 전달합니다.
pub struct CollectorContext<P, S> {
    pub provider: P,
    pub sink: S,
    pub store: CheckpointStore,
    pub limiter: RateLimiter,
    pub heartbeat: HeartbeatWriter,
    pub policy: CollectPolicy,
}

impl<P, S> CollectorContext<P, S>
where
    P: MinuteBarProvider,
    S: BarSink,
{
    /// 설정값으로 컨텍스트 구성
    pub fn new(
        config: &CollectorConfig,
        provider: P,
        sink: S,
        store: CheckpointStore,
        heartbeat: HeartbeatWriter,
    ) -> Self {
        Self {
            provider,
            sink,
            store,
            limiter: RateLimiter::new(
                config.rate_limit.calls_per_window,
                config.rate_limit.window(),
            ),
            heartbeat,
            policy: CollectPolicy::from_config(config),
        }
    }
}

/// 수집 대상 기간 계산: `[오늘 - 기간, 어제 23:59:59]` (UTC, 당일 제외)
pub fn target_window(
    now: DateTime<Utc>,
    length: chrono::Duration,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc();
    (today - length, today - chrono::Duration::seconds(1))
}

/// 1분봉 수집 실행
///
/// 세션 상실 등 치명적 에러에서만 `Err`를 반환합니다. 심볼 단위 실패는
/// 체크포인트에 `failed`로 기록하고 다음 심볼로 넘어갑니다.
pub async fn collect_minute_bars<P, S>(
    ctx: &mut CollectorContext<P, S>,
    symbols: &[Symbol],
) -> Result<CollectionStats>
where
    P: MinuteBarProvider,
    S: BarSink,
{
    let start = Instant::now();
    let mut stats = CollectionStats::new();
    stats.total = symbols.len();

    ctx.heartbeat.beat(HeartbeatPhase::Starting, None);

    let now = Utc::now();
    let run = ctx
        .store
        .begin_run(now, target_window(now, ctx.policy.target_window))?;

    tracing::info!(
        provider = ctx.provider.name(),
        symbols = symbols.len(),
        run = run.runs,
        window_start = %run.window_start,
        window_end = %run.window_end,
        "1분봉 수집 시작"
    );

    let restored = ctx.limiter.restore(&run.recent_calls);
    if restored > 0 {
        tracing::info!(
            restored,
            wait_ms = ctx.limiter.next_wait().as_millis() as u64,
            "이전 실행의 호출 기록 복원"
        );
    }

    if symbols.is_empty() {
        tracing::warn!("수집할 심볼이 없습니다");
    }

    let result = collect_all(ctx, symbols, &run, &mut stats).await;

    stats.elapsed = start.elapsed();
    stats.rate_limit_wait = ctx.limiter.total_wait();
    ctx.heartbeat.beat(HeartbeatPhase::Idle, None);

    result.map(|_| stats)
}

async fn collect_all<P, S>(
    ctx: &mut CollectorContext<P, S>,
    symbols: &[Symbol],
    run: &RunMetadata,
    stats: &mut CollectionStats,
) -> Result<()>
where
    P: MinuteBarProvider,
    S: BarSink,
{
    for (idx, symbol) in symbols.iter().enumerate() {
        let progress = format!("{}/{}", idx + 1, symbols.len());
        let existing = ctx.store.get(&symbol.id).cloned();

        match existing.as_ref().map(|cp| cp.status) {
            Some(CheckpointStatus::Done) => {
                stats.skipped += 1;
                tracing::debug!(symbol = %symbol.id, progress, "이미 완료, 건너뜀");
                continue;
            }
            Some(CheckpointStatus::Failed) if !ctx.policy.retry_failed => {
                stats.skipped += 1;
                tracing::debug!(symbol = %symbol.id, progress, "이전 실행에서 실패, 건너뜀");
                continue;
            }
            Some(CheckpointStatus::InProgress) => {
                stats.resumed += 1;
                tracing::info!(
                    symbol = %symbol.id,
                    cursor = ?existing.as_ref().and_then(|cp| cp.cursor.as_ref()),
                    "중단된 지점부터 재개"
                );
            }
            _ => {}
        }

        tracing::info!(symbol = %symbol.id, name = %symbol.name, progress, "수집 시작");

        let task = CollectionTask {
            symbol: symbol.clone(),
            window_start: run.window_start,
            window_end: run.window_end,
        };

        match collect_symbol(ctx, &task, existing, stats).await? {
            SymbolOutcome::Done => stats.done += 1,
            SymbolOutcome::Failed => stats.failed += 1,
        }
    }
    Ok(())
}

/// 심볼 하나를 완료 또는 실패까지 수집합니다.
async fn collect_symbol<P, S>(
    ctx: &mut CollectorContext<P, S>,
    task: &CollectionTask,
    existing: Option<SymbolCheckpoint>,
    stats: &mut CollectionStats,
) -> Result<SymbolOutcome>
where
    P: MinuteBarProvider,
    S: BarSink,
{
    let id = task.symbol.id.as_str();
    let mut cp = existing.unwrap_or_else(|| SymbolCheckpoint::pending(Utc::now()));
    if cp.status == CheckpointStatus::Failed {
        // 재시도 요청된 실패 심볼: 기록된 커서에서 새 재시도 예산으로 시작
        cp.attempts = 0;
    }
    cp.start(Utc::now());
    ctx.store.save(id, cp.clone())?;
    ctx.heartbeat.beat(HeartbeatPhase::Collecting, Some(id));

    loop {
        let wait = ctx.limiter.next_wait();
        if !wait.is_zero() {
            ctx.heartbeat.idle_for(wait, Some(id));
        }
        ctx.limiter.acquire().await;
        ctx.store.record_calls(ctx.limiter.recent_calls())?;

        let fetched = ctx
            .provider
            .fetch_page(task, cp.cursor.as_ref())
            .await
            .and_then(|page| validate_page(page, cp.cursor.as_ref()));

        match fetched {
            Ok(page) => {
                ctx.heartbeat.beat(HeartbeatPhase::Writing, Some(id));
                let written = ctx
                    .sink
                    .write_rows(&task.symbol, &page.rows)
                    .map_err(|e| CollectorError::Sink(e.to_string()))?;

                let now = Utc::now();
                cp.advance(page.next_cursor.clone(), page.rows.len(), now);
                if page.exhausted {
                    cp.mark_done(now);
                }
                ctx.store.save(id, cp.clone())?;

                stats.pages += 1;
                stats.rows += page.rows.len();
                ctx.heartbeat.beat(HeartbeatPhase::Collecting, Some(id));

                tracing::debug!(
                    symbol = id,
                    rows = page.rows.len(),
                    inserted = written.inserted,
                    replaced = written.replaced,
                    next_cursor = ?page.next_cursor,
                    "페이지 기록"
                );

                if page.exhausted {
                    tracing::info!(
                        symbol = id,
                        pages = cp.pages,
                        rows = written.total,
                        "saved {} rows",
                        written.total
                    );
                    return Ok(SymbolOutcome::Done);
                }
            }
            Err(e) if e.is_session_fatal() => {
                tracing::error!(symbol = id, error = %e, "세션 상실, 수집 중단");
                return Err(CollectorError::SessionLost(e.to_string()));
            }
            Err(e) => {
                let now = Utc::now();
                cp.record_failure(e.to_string(), now);

                if cp.attempts > ctx.policy.max_retries {
                    cp.mark_failed(now);
                    ctx.store.save(id, cp.clone())?;
                    tracing::error!(
                        symbol = id,
                        attempts = cp.attempts,
                        error = %e,
                        "재시도 한도 초과, 실패 처리"
                    );
                    return Ok(SymbolOutcome::Failed);
                }

                ctx.store.save(id, cp.clone())?;
                stats.retries += 1;
                tracing::warn!(
                    symbol = id,
                    attempt = cp.attempts,
                    max_retries = ctx.policy.max_retries,
                    error = %e,
                    "조회 실패, 재시도"
                );

                if let FetchError::RateLimited { retry_after } = e {
                    ctx.heartbeat.idle_for(retry_after, Some(id));
                    tokio::time::sleep(retry_after).await;
                }
            }
        }
    }
}

/// 페이지 계약 검사: 마지막 페이지가 아니면 커서가 전진해야 합니다.
fn validate_page(
    page: BarPage,
    current: Option<&PageCursor>,
) -> std::result::Result<BarPage, FetchError> {
    if page.exhausted {
        return Ok(page);
    }
    match page.next_cursor.as_ref() {
        None => Err(FetchError::Transient(
            "마지막 페이지가 아닌데 다음 커서가 없습니다".to_string(),
        )),
        Some(next) if Some(next) == current => Err(FetchError::Transient(format!(
            "커서가 전진하지 않았습니다: {}",
            next
        ))),
        Some(_) => Ok(page),
    }
}
