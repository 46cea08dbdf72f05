//! # Trader Core
//!
//! 분봉 수집기(`trader-collector`)와 감시 프로세스(`trader-watchdog`)가 공유하는
//! 핵심 타입을 제공합니다:
//! - 심볼 및 시장 구분 (KOSPI/KOSDAQ)
//! - 1분봉 레코드
//! - 하트비트 레코드와 상태 파일 입출력
//! - 원자적 파일 교체 (임시 파일 작성 후 rename)
//! - 환경변수 파싱 헬퍼
//! - 프로세스 종료 코드 규약

pub mod env;
pub mod error;
pub mod exit_code;
pub mod fs;
pub mod heartbeat;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use heartbeat::{HeartbeatPhase, HeartbeatRecord};
pub use types::*;
