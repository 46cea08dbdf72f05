//! 환경변수 파싱 헬퍼.
//!
//! 설정 모듈은 `dotenvy::dotenv()` 호출 후 이 함수들로 값을 읽습니다.
//! 값이 없거나 파싱에 실패하면 기본값을 사용합니다.

use std::str::FromStr;

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
pub fn env_var_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
pub fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

/// 환경변수에서 문자열 값 조회 (빈 문자열은 기본값으로 취급)
pub fn env_var_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// 쉼표로 구분된 목록 파싱
pub fn env_var_list(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => split_list(&v),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// 쉼표 구분 문자열을 공백 제거 후 분리합니다.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
