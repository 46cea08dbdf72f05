//! 수집 루프 통합 테스트.
//!
//! 스크립트 제공자와 임시 디렉토리로 실제 파일 체크포인트/CSV 출력을 검증합니다:
//! - 세션 상실 후 재시작 시 커서에서 재개
//! - 재개 결과가 중단 없는 실행과 동일
//! - 한 심볼 실패가 다른 심볼에 영향 없음
//! - 모든 호출 구간에서 호출 한도 준수 (재시작을 넘어서도)
//! - 출력 기록 후 체크포인트 저장 전 종료 시 중복 없음
//! - 임의 시점 강제 종료 후 재실행 결과가 중단 없는 실행과 동일
//! - 의도된 대기 전에 idle 하트비트 발행

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::Instant;
use trader_collector::modules::{
    collect_minute_bars, BarPage, BarSink, CheckpointStatus, CheckpointStore, CollectPolicy,
    CollectionTask, CollectorContext, CsvBarSink, FetchError, HeartbeatWriter,
    MemoryBarSink, MinuteBarProvider, PageCursor, RateLimiter, SinkError, WriteOutcome,
};
use trader_collector::CollectorError;
use trader_core::heartbeat::HeartbeatFile;
use trader_core::{exit_code, HeartbeatPhase, HeartbeatRecord, KrMarket, MinuteBar, Symbol};

// ============================================================================
// 테스트 헬퍼
// ============================================================================

const MAX_CALLS: usize = 2;
const WINDOW: Duration = Duration::from_secs(10);
const ROWS_PER_PAGE: usize = 5;

#[derive(Debug, Clone)]
struct Call {
    symbol: String,
    cursor: Option<String>,
    at: Instant,
    /// 호출 시점의 하트비트 파일 내용
    heartbeat: Option<HeartbeatRecord>,
}

/// 페이지 수와 실패를 미리 정해 둔 제공자.
///
/// 커서는 `p{n}` 형식이며 커서 없음은 0번 페이지입니다.
#[derive(Default)]
struct ScriptedProvider {
    pages: HashMap<String, usize>,
    always_fail: HashSet<String>,
    injected: Mutex<HashMap<(String, usize), VecDeque<FetchError>>>,
    calls: Mutex<Vec<Call>>,
    heartbeat: Option<PathBuf>,
}

impl ScriptedProvider {
    fn with_pages(pages: &[(&str, usize)]) -> Self {
        Self {
            pages: pages.iter().map(|(id, n)| (id.to_string(), *n)).collect(),
            ..Default::default()
        }
    }

    fn always_failing(mut self, symbol_id: &str) -> Self {
        self.always_fail.insert(symbol_id.to_string());
        self
    }

    fn inject(self, symbol_id: &str, page: usize, error: FetchError) -> Self {
        self.injected
            .lock()
            .unwrap()
            .entry((symbol_id.to_string(), page))
            .or_default()
            .push_back(error);
        self
    }

    /// 호출마다 하트비트 파일을 읽어 함께 기록
    fn observing(mut self, heartbeat_path: PathBuf) -> Self {
        self.heartbeat = Some(heartbeat_path);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

fn page_index(cursor: Option<&PageCursor>) -> usize {
    cursor
        .map(|c| c.as_str().trim_start_matches('p').parse().unwrap())
        .unwrap_or(0)
}

/// 심볼/페이지별로 결정적인 분봉 생성
fn bars_for(symbol_id: &str, page: usize) -> Vec<MinuteBar> {
    let base = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
    let offset: i64 = symbol_id.parse::<i64>().unwrap() % 100;
    (0..ROWS_PER_PAGE)
        .map(|i| {
            let n = (page * ROWS_PER_PAGE + i) as i64;
            let price = dec!(1000) + Decimal::from(offset * 10 + n);
            MinuteBar {
                time: base + chrono::Duration::minutes(n),
                open: price,
                high: price + dec!(5),
                low: price - dec!(5),
                close: price + dec!(1),
                volume: 100 + n as u64,
            }
        })
        .collect()
}

#[async_trait]
impl MinuteBarProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_page(
        &self,
        task: &CollectionTask,
        cursor: Option<&PageCursor>,
    ) -> Result<BarPage, FetchError> {
        let id = task.symbol.id.clone();
        let page = page_index(cursor);
        self.calls.lock().unwrap().push(Call {
            symbol: id.clone(),
            cursor: cursor.map(|c| c.as_str().to_string()),
            at: Instant::now(),
            heartbeat: self
                .heartbeat
                .as_ref()
                .and_then(|path| HeartbeatFile::new(path).read().unwrap()),
        });

        if self.always_fail.contains(&id) {
            return Err(FetchError::Transient("connection reset".to_string()));
        }
        if let Some(err) = self
            .injected
            .lock()
            .unwrap()
            .get_mut(&(id.clone(), page))
            .and_then(|queue| queue.pop_front())
        {
            return Err(err);
        }

        let total = self.pages.get(&id).copied().unwrap_or(1);
        let last = page + 1 >= total;
        Ok(BarPage {
            rows: bars_for(&id, page),
            next_cursor: (!last).then(|| PageCursor::new(format!("p{}", page + 1))),
            exhausted: last,
        })
    }
}

/// 지정 횟수째 기록에서 실패하는 출력
struct FailingSink {
    inner: MemoryBarSink,
    fail_on_write: usize,
    attempts: usize,
}

impl BarSink for FailingSink {
    fn write_rows(
        &mut self,
        symbol: &Symbol,
        rows: &[MinuteBar],
    ) -> Result<WriteOutcome, SinkError> {
        self.attempts += 1;
        if self.attempts == self.fail_on_write {
            return Err(SinkError::Io {
                path: "memory".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.inner.write_rows(symbol, rows)
    }
}

fn symbols() -> Vec<Symbol> {
    vec![
        Symbol::new("000001", "A", KrMarket::Kospi),
        Symbol::new("000002", "B", KrMarket::Kospi),
        Symbol::new("000003", "C", KrMarket::Kosdaq),
    ]
}

fn scenario_provider() -> ScriptedProvider {
    ScriptedProvider::with_pages(&[("000001", 3), ("000002", 3), ("000003", 4)])
        .always_failing("000002")
}

fn policy(retry_failed: bool) -> CollectPolicy {
    CollectPolicy {
        max_retries: 3,
        retry_failed,
        target_window: chrono::Duration::days(30),
    }
}

fn context<P: MinuteBarProvider>(
    dir: &Path,
    provider: P,
    retry_failed: bool,
) -> CollectorContext<P, CsvBarSink> {
    CollectorContext {
        provider,
        sink: CsvBarSink::new(dir.join("out")),
        store: CheckpointStore::load(dir.join("checkpoint.json")).unwrap(),
        limiter: RateLimiter::new(MAX_CALLS, WINDOW),
        heartbeat: HeartbeatWriter::new(dir.join("heartbeat.json")),
        policy: policy(retry_failed),
    }
}

fn assert_rate_safe(calls: &[Call]) {
    for pair in calls.windows(MAX_CALLS + 1) {
        let span = pair[MAX_CALLS].at.duration_since(pair[0].at);
        assert!(
            span >= WINDOW,
            "{}회 호출이 {:?} 안에 발생: {:?}",
            MAX_CALLS + 1,
            span,
            pair
        );
    }
}

fn assert_unique_keys(bars: &[MinuteBar]) {
    let keys: HashSet<_> = bars.iter().map(|b| b.key()).collect();
    assert_eq!(keys.len(), bars.len(), "중복 키 존재");
}

/// 세션 상실 없이 끝까지 수집한 결과
async fn uninterrupted_output(symbol_id: &str) -> Vec<MinuteBar> {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path(), scenario_provider(), false);
    collect_minute_bars(&mut ctx, &symbols()).await.unwrap();
    ctx.sink.read_bars(symbol_id).unwrap()
}

// ============================================================================
// 재개 시나리오
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_session_loss_then_restart_resumes_from_cursor() {
    let dir = tempfile::tempdir().unwrap();

    // 1차 실행: C의 2번 페이지에서 세션 상실
    let provider = scenario_provider().inject(
        "000003",
        2,
        FetchError::SessionLost("login expired".to_string()),
    );
    let mut ctx = context(dir.path(), provider, false);
    let err = collect_minute_bars(&mut ctx, &symbols()).await.unwrap_err();
    assert!(matches!(err, CollectorError::SessionLost(_)));
    assert_eq!(err.exit_code(), exit_code::SESSION_LOST);

    let first_calls = ctx.provider.calls();
    // A 3페이지 + B 4회 시도 + C 3회 (마지막이 세션 상실)
    assert_eq!(first_calls.len(), 3 + 4 + 3);
    assert_rate_safe(&first_calls);
    drop(ctx);

    // 디스크 상태 확인
    let store = CheckpointStore::load(dir.path().join("checkpoint.json")).unwrap();
    assert_eq!(store.get("000001").unwrap().status, CheckpointStatus::Done);
    let b = store.get("000002").unwrap();
    assert_eq!(b.status, CheckpointStatus::Failed);
    assert_eq!(b.attempts, 4);
    assert!(b.last_error.as_deref().unwrap().contains("connection reset"));
    let c = store.get("000003").unwrap();
    assert_eq!(c.status, CheckpointStatus::InProgress);
    assert_eq!(c.cursor, Some(PageCursor::new("p2")));
    assert_eq!(c.rows_written, (2 * ROWS_PER_PAGE) as u64);

    // 2차 실행: 새 프로세스처럼 저장소를 다시 로드
    let mut ctx = context(dir.path(), scenario_provider(), false);
    let stats = collect_minute_bars(&mut ctx, &symbols()).await.unwrap();
    assert_eq!(stats.done, 1);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.resumed, 1);

    let second_calls = ctx.provider.calls();
    assert!(second_calls.iter().all(|c| c.symbol == "000003"));
    assert_eq!(second_calls[0].cursor.as_deref(), Some("p2"));
    assert_eq!(second_calls.len(), 2);
    assert_rate_safe(&second_calls);

    let store = CheckpointStore::load(dir.path().join("checkpoint.json")).unwrap();
    assert_eq!(store.get("000001").unwrap().status, CheckpointStatus::Done);
    assert_eq!(store.get("000002").unwrap().status, CheckpointStatus::Failed);
    assert_eq!(store.get("000003").unwrap().status, CheckpointStatus::Done);
    assert_eq!(store.run().unwrap().runs, 2);

    let c_rows = ctx.sink.read_bars("000003").unwrap();
    assert_eq!(c_rows.len(), 4 * ROWS_PER_PAGE);
    assert_unique_keys(&c_rows);
    assert_eq!(c_rows, uninterrupted_output("000003").await);
    assert_eq!(
        ctx.sink.read_bars("000001").unwrap(),
        uninterrupted_output("000001").await
    );
    assert!(ctx.sink.read_bars("000002").unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_replayed_page_after_crash_does_not_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let provider = scenario_provider().inject(
        "000003",
        2,
        FetchError::SessionLost("login expired".to_string()),
    );
    let mut ctx = context(dir.path(), provider, false);
    collect_minute_bars(&mut ctx, &symbols()).await.unwrap_err();

    // 2번 페이지를 출력에 기록한 직후, 체크포인트 저장 전에 종료된 상황
    let c = Symbol::new("000003", "C", KrMarket::Kosdaq);
    ctx.sink.write_rows(&c, &bars_for("000003", 2)).unwrap();
    drop(ctx);

    let mut ctx = context(dir.path(), scenario_provider(), false);
    collect_minute_bars(&mut ctx, &symbols()).await.unwrap();

    // 같은 페이지를 다시 받아 덮어쓰므로 행 수가 늘지 않음
    assert_eq!(ctx.provider.calls()[0].cursor.as_deref(), Some("p2"));
    let rows = ctx.sink.read_bars("000003").unwrap();
    assert_unique_keys(&rows);
    assert_eq!(rows, uninterrupted_output("000003").await);
}

#[tokio::test(start_paused = true)]
async fn test_retry_failed_resumes_failed_symbol() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path(), scenario_provider(), false);
    let stats = collect_minute_bars(&mut ctx, &symbols()).await.unwrap();
    assert_eq!(stats.done, 2);
    assert_eq!(stats.failed, 1);
    drop(ctx);

    // 제공자 복구 후 실패 심볼만 재시도
    let healthy = ScriptedProvider::with_pages(&[("000001", 3), ("000002", 3), ("000003", 4)]);
    let mut ctx = context(dir.path(), healthy, true);
    let stats = collect_minute_bars(&mut ctx, &symbols()).await.unwrap();

    assert_eq!(stats.done, 1);
    assert_eq!(stats.skipped, 2);
    assert!(ctx.provider.calls().iter().all(|c| c.symbol == "000002"));
    let b = ctx.store.get("000002").unwrap();
    assert_eq!(b.status, CheckpointStatus::Done);
    assert_eq!(b.attempts, 0);
    assert_eq!(ctx.sink.read_bars("000002").unwrap().len(), 3 * ROWS_PER_PAGE);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_session_loss_keeps_rate_window() {
    let dir = tempfile::tempdir().unwrap();
    // 두 프로세스가 같은 벽시계를 보도록 기준점 고정
    let (epoch, wall) = (Instant::now(), Utc::now());
    let symbols = vec![Symbol::new("000001", "A", KrMarket::Kospi)];

    // 1차 실행: 두 번째 호출에서 세션 상실
    let provider = ScriptedProvider::with_pages(&[("000001", 3)]).inject(
        "000001",
        1,
        FetchError::SessionLost("login expired".to_string()),
    );
    let mut ctx = context(dir.path(), provider, false);
    ctx.limiter = RateLimiter::new(MAX_CALLS, WINDOW).with_epoch(epoch, wall);
    let err = collect_minute_bars(&mut ctx, &symbols).await.unwrap_err();
    assert_eq!(err.exit_code(), exit_code::SESSION_LOST);
    let first_calls = ctx.provider.calls();
    assert_eq!(first_calls.len(), 2);
    drop(ctx);

    let store = CheckpointStore::load(dir.path().join("checkpoint.json")).unwrap();
    assert_eq!(store.run().unwrap().recent_calls, vec![wall, wall]);

    // 감시 프로세스가 대기 없이 재시작한 새 프로세스
    let provider = ScriptedProvider::with_pages(&[("000001", 3)]);
    let mut ctx = context(dir.path(), provider, false);
    ctx.limiter = RateLimiter::new(MAX_CALLS, WINDOW).with_epoch(epoch, wall);
    collect_minute_bars(&mut ctx, &symbols).await.unwrap();
    let second_calls = ctx.provider.calls();
    assert_eq!(second_calls[0].cursor.as_deref(), Some("p1"));
    assert_eq!(second_calls[0].at.duration_since(epoch), WINDOW);

    let all: Vec<Call> = first_calls.into_iter().chain(second_calls).collect();
    assert_eq!(all.len(), 4);
    assert_rate_safe(&all);
}

#[tokio::test(start_paused = true)]
async fn test_abort_at_any_point_then_rerun_matches_uninterrupted() {
    let ids = ["000001", "000002", "000003"];
    let mut expected = HashMap::new();
    for id in ids {
        expected.insert(id, uninterrupted_output(id).await);
    }

    let mut interrupted = 0;
    for cut_ms in (0..=60_000u64).step_by(1_250) {
        let cut = Duration::from_millis(cut_ms);
        let dir = tempfile::tempdir().unwrap();

        let mut ctx = context(dir.path(), scenario_provider(), false);
        let run = tokio::time::timeout(cut, collect_minute_bars(&mut ctx, &symbols())).await;
        if run.is_err() {
            interrupted += 1;
        }
        drop(ctx);

        let mut ctx = context(dir.path(), scenario_provider(), false);
        collect_minute_bars(&mut ctx, &symbols()).await.unwrap();

        for id in ids {
            let rows = ctx.sink.read_bars(id).unwrap();
            assert_unique_keys(&rows);
            assert_eq!(rows, expected[id], "중단 시점 {:?}, 심볼 {}", cut, id);
        }
        let store = CheckpointStore::load(dir.path().join("checkpoint.json")).unwrap();
        assert_eq!(store.get("000001").unwrap().status, CheckpointStatus::Done);
        assert_eq!(store.get("000003").unwrap().status, CheckpointStatus::Done);
        let b = store.get("000002").unwrap();
        assert_eq!(b.status, CheckpointStatus::Failed, "중단 시점 {:?}", cut);
        assert_eq!(b.attempts, 4, "중단 시점 {:?}", cut);
    }
    // 대부분의 시점은 수집 도중 (중단 없는 실행은 약 50초)
    assert!(interrupted >= 30, "중단된 실행 {}회", interrupted);
}

// ============================================================================
// 실패 처리
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_transient_failures_reset_after_progress() {
    let dir = tempfile::tempdir().unwrap();
    let transient = || FetchError::Transient("timeout".to_string());
    // 페이지마다 3회씩 실패해도 연속 실패가 한도(3)를 넘지 않으면 완료
    let provider = ScriptedProvider::with_pages(&[("000001", 2)])
        .inject("000001", 0, transient())
        .inject("000001", 0, transient())
        .inject("000001", 0, transient())
        .inject("000001", 1, transient())
        .inject("000001", 1, transient())
        .inject("000001", 1, transient());
    let mut ctx = context(dir.path(), provider, false);
    let symbols = vec![Symbol::new("000001", "A", KrMarket::Kospi)];

    let stats = collect_minute_bars(&mut ctx, &symbols).await.unwrap();

    assert_eq!(stats.done, 1);
    assert_eq!(stats.retries, 6);
    assert_eq!(ctx.provider.calls().len(), 8);
    assert_rate_safe(&ctx.provider.calls());
    let cp = ctx.store.get("000001").unwrap();
    assert_eq!(cp.status, CheckpointStatus::Done);
    assert_eq!(cp.attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_cursor_counts_as_failure() {
    struct StuckProvider;

    #[async_trait]
    impl MinuteBarProvider for StuckProvider {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn fetch_page(
            &self,
            task: &CollectionTask,
            _cursor: Option<&PageCursor>,
        ) -> Result<BarPage, FetchError> {
            Ok(BarPage {
                rows: bars_for(&task.symbol.id, 0),
                next_cursor: Some(PageCursor::new("p1")),
                exhausted: false,
            })
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path(), StuckProvider, false);
    let symbols = vec![Symbol::new("000001", "A", KrMarket::Kospi)];

    let stats = collect_minute_bars(&mut ctx, &symbols).await.unwrap();

    // 첫 페이지는 전진, 이후 같은 커서가 반복되어 실패 처리
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pages, 1);
    let cp = ctx.store.get("000001").unwrap();
    assert_eq!(cp.status, CheckpointStatus::Failed);
    assert_eq!(cp.cursor, Some(PageCursor::new("p1")));
}

#[tokio::test(start_paused = true)]
async fn test_provider_rate_limit_waits_and_marks_idle() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::with_pages(&[("000001", 2)])
        .inject(
            "000001",
            1,
            FetchError::RateLimited {
                retry_after: Duration::from_secs(30),
            },
        )
        .observing(dir.path().join("heartbeat.json"));
    let mut ctx = context(dir.path(), provider, false);
    let symbols = vec![Symbol::new("000001", "A", KrMarket::Kospi)];
    let start = Instant::now();

    let stats = collect_minute_bars(&mut ctx, &symbols).await.unwrap();

    assert_eq!(stats.done, 1);
    assert_eq!(stats.retries, 1);
    let calls = ctx.provider.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[2].at.duration_since(calls[1].at) >= Duration::from_secs(30));
    assert!(Instant::now().duration_since(start) >= Duration::from_secs(30));

    // 대기 동안 감시 프로세스가 본 상태: 요청된 시간만큼 idle
    let idle = calls[2].heartbeat.as_ref().unwrap();
    assert_eq!(idle.phase, HeartbeatPhase::Idle);
    assert_eq!(idle.current_symbol.as_deref(), Some("000001"));
    assert_eq!(
        idle.idle_until,
        Some(idle.last_progress_at + chrono::Duration::seconds(30))
    );
    assert_eq!(idle.progress_baseline(), idle.idle_until.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limiter_wait_published_as_idle() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::with_pages(&[("000001", 3)])
        .observing(dir.path().join("heartbeat.json"));
    let mut ctx = context(dir.path(), provider, false);
    let symbols = vec![Symbol::new("000001", "A", KrMarket::Kospi)];

    collect_minute_bars(&mut ctx, &symbols).await.unwrap();

    let calls = ctx.provider.calls();
    assert_eq!(calls.len(), 3);
    // 한도 안의 호출은 수집 중 상태
    for call in &calls[..2] {
        let hb = call.heartbeat.as_ref().unwrap();
        assert_eq!(hb.phase, HeartbeatPhase::Collecting);
        assert!(hb.idle_until.is_none());
    }
    // 세 번째 호출은 윈도우가 빌 때까지 대기
    assert_eq!(calls[2].at.duration_since(calls[0].at), WINDOW);
    let idle = calls[2].heartbeat.as_ref().unwrap();
    assert_eq!(idle.phase, HeartbeatPhase::Idle);
    assert_eq!(
        idle.idle_until,
        Some(idle.last_progress_at + chrono::Duration::from_std(WINDOW).unwrap())
    );
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_keeps_checkpoint_behind_output() {
    let dir = tempfile::tempdir().unwrap();
    let sink = FailingSink {
        inner: MemoryBarSink::new(),
        fail_on_write: 2,
        attempts: 0,
    };
    let mut ctx = CollectorContext {
        provider: ScriptedProvider::with_pages(&[("000001", 3)]),
        sink,
        store: CheckpointStore::load(dir.path().join("checkpoint.json")).unwrap(),
        limiter: RateLimiter::new(MAX_CALLS, WINDOW),
        heartbeat: HeartbeatWriter::in_memory(),
        policy: policy(false),
    };
    let symbols = vec![Symbol::new("000001", "A", KrMarket::Kospi)];

    let err = collect_minute_bars(&mut ctx, &symbols).await.unwrap_err();
    assert!(matches!(err, CollectorError::Sink(_)));
    assert_eq!(err.exit_code(), exit_code::FAILURE);

    // 기록이 실패한 페이지는 체크포인트에 반영되지 않음
    let store = CheckpointStore::load(dir.path().join("checkpoint.json")).unwrap();
    let cp = store.get("000001").unwrap();
    assert_eq!(cp.status, CheckpointStatus::InProgress);
    assert_eq!(cp.cursor, Some(PageCursor::new("p1")));
    assert_eq!(cp.pages, 1);
    assert_eq!(ctx.sink.inner.bars("000001").len(), ROWS_PER_PAGE);
}

// ============================================================================
// 하트비트
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_published_through_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(
        dir.path(),
        ScriptedProvider::with_pages(&[("000001", 3), ("000003", 1)]),
        false,
    );
    let symbols = vec![
        Symbol::new("000001", "A", KrMarket::Kospi),
        Symbol::new("000003", "C", KrMarket::Kosdaq),
    ];

    collect_minute_bars(&mut ctx, &symbols).await.unwrap();

    let record = HeartbeatFile::new(dir.path().join("heartbeat.json"))
        .read()
        .unwrap()
        .unwrap();
    assert_eq!(record.pid, std::process::id());
    assert_eq!(record.phase, HeartbeatPhase::Idle);
    assert!(record.idle_until.is_none());
    // 시작 + 심볼별 시작 + 페이지당 2회 + 종료, 호출 한도 대기마다 1회 추가
    assert!(record.sequence >= 1 + 2 + 2 * 4 + 1);
    assert!(!dir.path().join("heartbeat.json.tmp").exists());
}
