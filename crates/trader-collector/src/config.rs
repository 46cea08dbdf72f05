//! 환경변수 기반 설정 모듈.

use std::path::PathBuf;
use std::time::Duration;

use trader_core::env::{env_var_bool, env_var_list, env_var_parse, env_var_string};
use trader_core::heartbeat::LAUNCH_ID_ENV;

use crate::error::CollectorError;
use crate::Result;

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 호출 한도 설정
    pub rate_limit: RateLimitConfig,
    /// 수집 정책 설정
    pub collect: CollectConfig,
    /// 파일 경로 설정
    pub paths: PathConfig,
    /// 데이터 제공자 설정
    pub provider: ProviderConfig,
}

/// 슬라이딩 윈도우 호출 한도 설정
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 윈도우당 최대 호출 수 (K)
    pub calls_per_window: usize,
    /// 윈도우 길이 (초, W)
    pub window_seconds: u64,
}

/// 수집 정책 설정
#[derive(Debug, Clone)]
pub struct CollectConfig {
    /// 수집 대상 기간 (일)
    pub target_window_days: i64,
    /// 기간 시작에 더하는 여유 일수
    pub target_window_buffer_days: i64,
    /// 연속 실패 허용 횟수 (초과 시 심볼 `failed`)
    pub max_retries_per_symbol: u32,
    /// 이전 실행에서 `failed`가 된 심볼 재시도 여부
    pub retry_failed: bool,
}

/// 파일 경로 설정
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// 체크포인트 파일
    pub checkpoint_path: PathBuf,
    /// 분봉 CSV 출력 디렉토리
    pub output_dir: PathBuf,
    /// 하트비트 상태 파일
    pub heartbeat_path: PathBuf,
    /// 감시 프로세스가 부여한 실행 토큰 (단독 실행이면 `None`)
    pub launch_id: Option<String>,
    /// 종목 메타 CSV 목록
    pub symbol_files: Vec<PathBuf>,
}

/// 데이터 제공자 설정
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// 페이지당 일수
    pub page_days: i64,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 차트 API 기본 URL
    pub base_url: String,
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let window_spec = env_var_string("TARGET_WINDOW_DURATION", "2y");
        let target_window_days = parse_window_days(&window_spec).ok_or_else(|| {
            CollectorError::Config(format!(
                "TARGET_WINDOW_DURATION 형식 오류: {} (예: 2y, 26w, 30d)",
                window_spec
            ))
        })?;

        let config = Self {
            rate_limit: RateLimitConfig {
                calls_per_window: env_var_parse("CALLS_PER_WINDOW", 13),
                window_seconds: env_var_parse("WINDOW_SECONDS", 60),
            },
            collect: CollectConfig {
                target_window_days,
                target_window_buffer_days: env_var_parse("TARGET_WINDOW_BUFFER_DAYS", 7),
                max_retries_per_symbol: env_var_parse("MAX_RETRIES_PER_SYMBOL", 3),
                retry_failed: env_var_bool("RETRY_FAILED", false),
            },
            paths: PathConfig {
                checkpoint_path: env_var_string("CHECKPOINT_PATH", "checkpoint.json").into(),
                output_dir: env_var_string("OUTPUT_DIR", "out_csv").into(),
                heartbeat_path: env_var_string("HEARTBEAT_PATH", "heartbeat.json").into(),
                launch_id: std::env::var(LAUNCH_ID_ENV)
                    .ok()
                    .filter(|v| !v.trim().is_empty()),
                symbol_files: env_var_list(
                    "SYMBOL_FILES",
                    &[
                        "split_meta_market/yahoo_meta_kospi.csv",
                        "split_meta_market/yahoo_meta_kosdaq.csv",
                    ],
                )
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            },
            provider: ProviderConfig {
                page_days: env_var_parse("PROVIDER_PAGE_DAYS", 7),
                request_timeout_secs: env_var_parse("PROVIDER_TIMEOUT_SEC", 30),
                base_url: env_var_string(
                    "PROVIDER_BASE_URL",
                    "https://query1.finance.yahoo.com/v8/finance/chart",
                ),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.calls_per_window == 0 {
            return Err(CollectorError::Config(
                "CALLS_PER_WINDOW는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.rate_limit.window_seconds == 0 {
            return Err(CollectorError::Config(
                "WINDOW_SECONDS는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.provider.page_days <= 0 {
            return Err(CollectorError::Config(
                "PROVIDER_PAGE_DAYS는 1 이상이어야 합니다".to_string(),
            ));
        }
        Ok(())
    }
}

impl RateLimitConfig {
    /// 윈도우 길이를 Duration으로 반환
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl CollectConfig {
    /// 기간 시작 계산에 쓰이는 총 일수 (대상 기간 + 여유)
    pub fn total_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.target_window_days + self.target_window_buffer_days)
    }
}

impl ProviderConfig {
    /// 요청 타임아웃을 Duration으로 반환
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 기간 문자열을 일수로 변환 (`2y` → 730, `26w` → 182, `30d`/`30` → 30)
pub fn parse_window_days(s: &str) -> Option<i64> {
    let s = s.trim().to_lowercase();
    let (number, unit) = match s.char_indices().find(|(_, c)| c.is_alphabetic()) {
        Some((idx, _)) => (&s[..idx], &s[idx..]),
        None => (s.as_str(), "d"),
    };
    let n: i64 = number.trim().parse().ok()?;
    if n <= 0 {
        return None;
    }
    match unit {
        "d" | "day" | "days" => Some(n),
        "w" | "week" | "weeks" => Some(n * 7),
        "y" | "year" | "years" => Some(n * 365),
        _ => None,
    }
}
