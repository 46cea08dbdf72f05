//! 분봉 데이터 제공자 경계.
//!
//! 수집 루프는 제공자를 `(심볼, 커서) → 페이지` 함수로만 봅니다.
//! 로그인/세션 처리, HTTP 형식 등은 구현체 내부의 일입니다.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trader_core::{MinuteBar, Symbol};

/// 제공자가 정의하는 페이지 위치.
///
/// 수집 루프는 내용을 해석하지 않고 저장/전달만 합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(String);

impl PageCursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 수집 작업: 심볼 하나와 대상 기간.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTask {
    pub symbol: Symbol,
    /// 대상 기간 시작 (포함)
    pub window_start: DateTime<Utc>,
    /// 대상 기간 끝 (포함)
    pub window_end: DateTime<Utc>,
}

/// 조회된 한 페이지.
#[derive(Debug, Clone, Default)]
pub struct BarPage {
    /// 시간 오름차순 분봉
    pub rows: Vec<MinuteBar>,
    /// 다음 페이지 위치
    pub next_cursor: Option<PageCursor>,
    /// 마지막 페이지 여부
    pub exhausted: bool,
}

/// 제공자 조회 에러
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// 네트워크/일시적 제공자 오류 (재시도 대상)
    #[error("일시적 조회 실패: {0}")]
    Transient(String),

    /// 제공자 호출 한도 초과 (지정 시간 후 재시도)
    #[error("제공자 호출 한도 초과 (재시도 대기 {retry_after:?})")]
    RateLimited { retry_after: Duration },

    /// 세션/인증 상실 (프로세스 재시작 필요)
    #[error("세션 상실: {0}")]
    SessionLost(String),
}

impl FetchError {
    /// 수집 전체를 중단해야 하는 에러인지 확인합니다.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::SessionLost(_))
    }
}

/// 분봉 페이지 제공자.
///
/// 구현체는 커서 순서대로 시간 오름차순 페이지를 돌려줘야 합니다.
/// 같은 커서로 다시 호출하면 같은 구간을 돌려줘야 합니다 (재개 시 재조회).
#[async_trait]
pub trait MinuteBarProvider: Send + Sync {
    /// 제공자 이름 (로그용)
    fn name(&self) -> &str;

    /// `cursor` 위치의 페이지를 조회합니다. `None`이면 기간 시작부터.
    async fn fetch_page(
        &self,
        task: &CollectionTask,
        cursor: Option<&PageCursor>,
    ) -> Result<BarPage, FetchError>;
}
