//! 1분봉 수집 모듈.

pub mod checkpoint;
pub mod heartbeat;
pub mod minute_collect;
pub mod provider;
pub mod rate_limiter;
pub mod sink;
pub mod symbol_source;
pub mod yahoo;

pub use checkpoint::{
    CheckpointError, CheckpointStatus, CheckpointStore, RunMetadata, StatusCounts,
    SymbolCheckpoint,
};
pub use heartbeat::HeartbeatWriter;
pub use minute_collect::{
    collect_minute_bars, target_window, CollectPolicy, CollectorContext, SymbolOutcome,
};
pub use provider::{BarPage, CollectionTask, FetchError, MinuteBarProvider, PageCursor};
pub use rate_limiter::{RateLimiter, SlidingWindow};
pub use sink::{BarSink, CsvBarSink, MemoryBarSink, SinkError, WriteOutcome};
pub use symbol_source::{load_symbols, parse_symbols};
pub use yahoo::YahooMinuteProvider;
