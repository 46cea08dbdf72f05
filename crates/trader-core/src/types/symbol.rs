//! 심볼 및 시장 구분 정의.
//!
//! 이 모듈은 수집 대상 종목 관련 타입을 정의합니다:
//! - `KrMarket` - 상장 시장 (KOSPI: 유가증권시장, KOSDAQ: 코스닥)
//! - `Symbol` - 종목 코드, 종목명, 시장으로 구성된 수집 대상
//! - `normalize_code` - 다양한 표기(네이버, 야후, 증권사)를 6자리 종목 코드로 정규화

use serde::{Deserialize, Serialize};
use std::fmt;

/// 상장 시장 구분.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KrMarket {
    /// 유가증권시장 (주 시장)
    Kospi,
    /// 코스닥 (보조 시장)
    Kosdaq,
}

impl KrMarket {
    /// 문자열에서 시장 파싱
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_uppercase();
        if s.contains("KOSDAQ") || s.contains("코스닥") || s == ".KQ" || s == "KQ" {
            Some(Self::Kosdaq)
        } else if s.contains("KOSPI")
            || s.contains("코스피")
            || s.contains("유가증권")
            || s == ".KS"
            || s == "KS"
        {
            Some(Self::Kospi)
        } else {
            None
        }
    }

    /// 야후 심볼 접미사에서 시장 추정 (`005930.KS` → KOSPI)
    pub fn from_yahoo_symbol(s: &str) -> Option<Self> {
        let s = s.trim().to_uppercase();
        if s.ends_with(".KQ") {
            Some(Self::Kosdaq)
        } else if s.ends_with(".KS") {
            Some(Self::Kospi)
        } else {
            None
        }
    }

    /// Yahoo Finance 접미사 반환
    pub fn yahoo_suffix(&self) -> &'static str {
        match self {
            Self::Kospi => ".KS",
            Self::Kosdaq => ".KQ",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kospi => "KOSPI",
            Self::Kosdaq => "KOSDAQ",
        }
    }
}

impl fmt::Display for KrMarket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 수집 대상 종목.
///
/// `id`는 실행 내내 변하지 않는 6자리 종목 코드이며 체크포인트와 출력 파일의 키로 쓰입니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    /// 종목 코드 (예: 005930)
    pub id: String,
    /// 종목명 (예: 삼성전자)
    pub name: String,
    /// 상장 시장
    pub market: KrMarket,
}

impl Symbol {
    /// 새 심볼을 생성합니다.
    pub fn new(id: impl Into<String>, name: impl Into<String>, market: KrMarket) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            market,
        }
    }

    /// Yahoo Finance 형식 심볼 (예: 005930.KS)
    pub fn yahoo_symbol(&self) -> String {
        format!("{}{}", self.id, self.market.yahoo_suffix())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{} {}", self.id, self.name)
        }
    }
}

/// 종목 코드를 6자리 숫자 문자열로 정규화합니다.
///
/// 지원 형식: `005930`, `5930`, `005930.KS`, `035720.KQ`, `A005930`, `삼성전자(005930)`.
/// 숫자가 없거나 6자리를 넘으면 `None`.
pub fn normalize_code(raw: &str) -> Option<String> {
    let s = raw.trim().to_uppercase();
    if s.is_empty() {
        return None;
    }

    let digits: String = match parenthesized(&s) {
        Some(inner) if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) => {
            inner.to_string()
        }
        _ => {
            let base = s
                .strip_suffix(".KS")
                .or_else(|| s.strip_suffix(".KQ"))
                .unwrap_or(&s);
            base.chars().filter(|c| c.is_ascii_digit()).collect()
        }
    };

    if digits.is_empty() || digits.len() > 6 {
        return None;
    }
    Some(format!("{:0>6}", digits))
}

fn parenthesized(s: &str) -> Option<&str> {
    let open = s.rfind('(')?;
    let close = s[open..].find(')')? + open;
    Some(&s[open + 1..close])
}
