//! Collector watchdog.
//!
//! 수집 프로세스를 자식으로 실행하고, 하트비트가 일정 시간 갱신되지 않으면
//! 강제 종료 후 다시 실행합니다. 수집기는 체크포인트에서 재개하므로
//! 재시작 시 손실되는 작업은 마지막 페이지 하나뿐입니다.

pub mod config;
pub mod error;
pub mod process;
pub mod supervisor;

pub use config::{SupervisorConfig, WatchdogConfig};
pub use error::{Result, WatchdogError};
pub use process::{ProcessChild, ProcessLauncher};
pub use supervisor::{
    ChildExit, ChildProcess, ChildState, Clock, FinalState, HeartbeatSource, Launcher,
    Supervisor, SystemClock, WatchdogReport,
};
