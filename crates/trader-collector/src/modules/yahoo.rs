//! Yahoo Finance 차트 API 기반 1분봉 제공자.
//!
//! ## 페이지 규칙
//! - 커서는 다음 페이지의 시작 날짜 (`YYYY-MM-DD`, UTC)
//! - 한 페이지는 `page_days`일 구간이며 날짜 오름차순으로 진행
//! - 페이지 끝이 대상 기간 끝에 닿으면 `exhausted`
//!
//! Yahoo는 1분봉을 최근 약 30일만 제공합니다. 그보다 오래된 커서는
//! 제공 가능 구간 시작으로 건너뛰며, 그 이전 구간은 빈 데이터로 취급합니다.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use trader_core::MinuteBar;

use super::provider::{BarPage, CollectionTask, FetchError, MinuteBarProvider, PageCursor};
use crate::config::ProviderConfig;
use crate::error::CollectorError;

/// 1분봉 제공 가능 기간 (일)
const MINUTE_HORIZON_DAYS: i64 = 29;

/// 429 응답에 Retry-After가 없을 때의 대기 시간
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

const CURSOR_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    data_granularity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<u64>>>,
}

/// Yahoo 차트 API 1분봉 제공자
pub struct YahooMinuteProvider {
    client: Client,
    base_url: String,
    page_days: i64,
}

impl YahooMinuteProvider {
    /// 제공자 생성.
    ///
    /// 잘못된 URL이나 클라이언트 생성 실패는 재시작으로 해결되지 않으므로 설정 에러입니다.
    pub fn new(config: &ProviderConfig) -> crate::Result<Self> {
        reqwest::Url::parse(&config.base_url).map_err(|e| {
            CollectorError::Config(format!(
                "PROVIDER_BASE_URL 형식 오류: {} ({})",
                config.base_url, e
            ))
        })?;

        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CollectorError::Config(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_days: config.page_days.max(1),
        })
    }

    async fn request(
        &self,
        yahoo_symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MinuteBar>, FetchError> {
        let url = format!(
            "{}/{}?period1={}&period2={}&interval=1m&includePrePost=false",
            self.base_url,
            yahoo_symbol,
            from.timestamp(),
            to.timestamp()
        );
        tracing::debug!(url = %url, "Yahoo 1분봉 요청");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("요청 실패: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::SessionLost(format!("인증 거부: {}", status)));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(FetchError::RateLimited { retry_after });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transient(format!("응답 읽기 실패: {}", e)))?;

        if !status.is_success() {
            return Err(FetchError::Transient(format!(
                "Yahoo Finance API error: {} - {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        parse_chart(&body)
    }
}

#[async_trait]
impl MinuteBarProvider for YahooMinuteProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch_page(
        &self,
        task: &CollectionTask,
        cursor: Option<&PageCursor>,
    ) -> Result<BarPage, FetchError> {
        let horizon = (Utc::now() - chrono::Duration::days(MINUTE_HORIZON_DAYS)).date_naive();
        let plan = plan_page(task, cursor, self.page_days, horizon)?;
        if plan.skipped_to_horizon {
            tracing::debug!(
                symbol = %task.symbol.id,
                start = %plan.start,
                "1분봉 제공 기간 시작으로 건너뜀"
            );
        }

        let rows = if plan.beyond_horizon {
            tracing::debug!(symbol = %task.symbol.id, "1분봉 제공 기간 이전 구간, 요청 생략");
            Vec::new()
        } else {
            let from = day_start(plan.start);
            let to = day_start(plan.end + chrono::Duration::days(1));
            self.request(&task.symbol.yahoo_symbol(), from, to)
                .await?
                .into_iter()
                .filter(|bar| bar.time >= task.window_start && bar.time <= task.window_end)
                .collect()
        };

        Ok(BarPage {
            rows,
            next_cursor: plan.next_cursor,
            exhausted: plan.exhausted,
        })
    }
}

/// 커서로부터 계산한 페이지 구간
#[derive(Debug, Clone, PartialEq, Eq)]
struct PagePlan {
    start: NaiveDate,
    end: NaiveDate,
    next_cursor: Option<PageCursor>,
    exhausted: bool,
    /// 제공 가능 구간 시작으로 건너뜀
    skipped_to_horizon: bool,
    /// 남은 구간 전체가 제공 기간 이전 (요청 불필요)
    beyond_horizon: bool,
}

fn plan_page(
    task: &CollectionTask,
    cursor: Option<&PageCursor>,
    page_days: i64,
    horizon: NaiveDate,
) -> Result<PagePlan, FetchError> {
    let window_first = task.window_start.date_naive();
    let window_last = task.window_end.date_naive();

    let requested = match cursor {
        Some(c) => NaiveDate::parse_from_str(c.as_str(), CURSOR_FORMAT)
            .map_err(|e| FetchError::Transient(format!("잘못된 커서 {}: {}", c, e)))?,
        None => window_first,
    };

    if requested < horizon && horizon > window_last {
        return Ok(PagePlan {
            start: requested,
            end: window_last,
            next_cursor: None,
            exhausted: true,
            skipped_to_horizon: false,
            beyond_horizon: true,
        });
    }

    let skipped_to_horizon = requested < horizon;
    let start = requested.max(horizon);
    let end = (start + chrono::Duration::days(page_days - 1)).min(window_last);
    let exhausted = end >= window_last;
    let next_cursor = if exhausted {
        None
    } else {
        Some(PageCursor::new(
            (end + chrono::Duration::days(1))
                .format(CURSOR_FORMAT)
                .to_string(),
        ))
    };

    Ok(PagePlan {
        start,
        end,
        next_cursor,
        exhausted,
        skipped_to_horizon,
        beyond_horizon: false,
    })
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// 차트 응답 JSON을 분봉 목록으로 변환
fn parse_chart(body: &str) -> Result<Vec<MinuteBar>, FetchError> {
    let response: ChartResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::Transient(format!("응답 파싱 실패: {}", e)))?;

    if let Some(error) = response.chart.error {
        return Err(FetchError::Transient(format!(
            "Yahoo Finance error: {} - {}",
            error.code, error.description
        )));
    }

    let result = match response.chart.result.and_then(|r| r.into_iter().next()) {
        Some(result) => result,
        None => return Ok(Vec::new()),
    };

    // 일봉으로 대체된 응답은 분봉이 아님
    if let Some(granularity) = result.meta.data_granularity.as_deref() {
        if granularity != "1m" {
            return Err(FetchError::Transient(format!(
                "분봉 대신 {} 데이터 수신",
                granularity
            )));
        }
    }

    let timestamps = result.timestamp.unwrap_or_default();
    let quote = match result.indicators.quote.into_iter().next() {
        Some(q) => q,
        None => return Ok(Vec::new()),
    };
    let opens = quote.open.unwrap_or_default();
    let highs = quote.high.unwrap_or_default();
    let lows = quote.low.unwrap_or_default();
    let closes = quote.close.unwrap_or_default();
    let volumes = quote.volume.unwrap_or_default();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let values = (
            value_at(&opens, i),
            value_at(&highs, i),
            value_at(&lows, i),
            value_at(&closes, i),
        );
        let (Some(open), Some(high), Some(low), Some(close)) = values else {
            continue;
        };
        let Some(time) = DateTime::from_timestamp(*ts, 0) else {
            continue;
        };
        bars.push(MinuteBar {
            time,
            open,
            high,
            low,
            close,
            volume: volumes.get(i).copied().flatten().unwrap_or(0),
        });
    }

    bars.sort_by_key(|b| b.time);
    bars.dedup_by_key(|b| b.time);
    Ok(bars)
}

fn value_at(values: &[Option<f64>], i: usize) -> Option<Decimal> {
    values
        .get(i)
        .copied()
        .flatten()
        .and_then(Decimal::from_f64)
        .map(|d| d.round_dp(4).normalize())
}
