//! Resumable minute-bar collector.
//!
//! 외부 API의 호출 한도 안에서 종목별 1분봉을 페이지 단위로 수집합니다:
//! - 슬라이딩 윈도우 호출 한도
//! - 원자적 체크포인트 (중단 지점부터 재개)
//! - 키 덮어쓰기 CSV 출력
//! - 감시 프로세스용 하트비트

pub mod config;
pub mod error;
pub mod modules;
pub mod stats;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use stats::CollectionStats;
