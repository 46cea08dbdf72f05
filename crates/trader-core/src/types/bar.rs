//! 1분봉 레코드.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 1분봉 캔들.
///
/// 한 종목 안에서 `time`이 레코드의 키입니다. 같은 시각의 봉을 다시 기록하면
/// 기존 값을 덮어씁니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteBar {
    /// 캔들 시작 시각 (UTC)
    pub time: DateTime<Utc>,
    /// 시가
    pub open: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 종가
    pub close: Decimal,
    /// 거래량 (주)
    pub volume: u64,
}

impl MinuteBar {
    /// 레코드 키 (종목 내 시각)
    pub fn key(&self) -> DateTime<Utc> {
        self.time
    }
}
