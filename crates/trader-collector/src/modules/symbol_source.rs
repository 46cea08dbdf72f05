//! 종목 목록 로드 모듈.
//!
//! 종목 메타 CSV(네이버/야후 형식)에서 수집 대상 심볼을 읽습니다.
//! 한 실행 동안 고정된 스냅샷으로 사용됩니다.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use trader_core::{normalize_code, KrMarket, Symbol};

use crate::error::CollectorError;
use crate::Result;

const CODE_COLUMNS: &[&str] = &[
    "code", "Code", "symbol", "Symbol", "ticker", "Ticker", "종목코드", "YahooSymbol",
];
const NAME_COLUMNS: &[&str] = &["name", "Name", "종목명"];
const MARKET_COLUMNS: &[&str] = &["market", "Market", "시장"];
const YAHOO_COLUMNS: &[&str] = &["YahooSymbol", "yahoo_symbol"];

/// 여러 CSV에서 심볼 목록 로드 (중복 제거, 코드 순 정렬)
///
/// 없는 파일은 경고 후 건너뜁니다.
pub fn load_symbols(paths: &[PathBuf]) -> Result<Vec<Symbol>> {
    let mut merged: BTreeMap<String, Symbol> = BTreeMap::new();

    for path in paths {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "종목 파일 없음, 건너뜀");
            continue;
        }

        let file = std::fs::File::open(path).map_err(|e| {
            CollectorError::SymbolSource(format!("{} 열기 실패: {}", path.display(), e))
        })?;
        let symbols = parse_symbols(file, market_hint(path)).map_err(|e| {
            CollectorError::SymbolSource(format!("{} 파싱 실패: {}", path.display(), e))
        })?;

        tracing::info!(path = %path.display(), count = symbols.len(), "종목 파일 로드");
        for symbol in symbols {
            merged.entry(symbol.id.clone()).or_insert(symbol);
        }
    }

    Ok(merged.into_values().collect())
}

/// 파일명에서 시장 추정 (`yahoo_meta_kosdaq.csv` → KOSDAQ)
fn market_hint(path: &Path) -> Option<KrMarket> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    if name.contains("kosdaq") {
        Some(KrMarket::Kosdaq)
    } else if name.contains("kospi") {
        Some(KrMarket::Kospi)
    } else {
        None
    }
}

/// CSV 한 개 파싱.
///
/// 코드 열은 알려진 이름 중 첫 번째로 찾은 열, 없으면 첫 열을 사용합니다.
/// 시장은 시장 열 → 야후 접미사 → `default_market` → KOSPI 순으로 결정합니다.
pub fn parse_symbols<R: Read>(
    reader: R,
    default_market: Option<KrMarket>,
) -> std::result::Result<Vec<Symbol>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let find = |candidates: &[&str]| {
        candidates
            .iter()
            .find_map(|c| headers.iter().position(|h| h == c))
    };
    let code_idx = find(CODE_COLUMNS).unwrap_or(0);
    let name_idx = find(NAME_COLUMNS);
    let market_idx = find(MARKET_COLUMNS);
    let yahoo_idx = find(YAHOO_COLUMNS);

    let mut symbols = Vec::new();
    for record in reader.records() {
        let record = record?;
        let raw_code = record.get(code_idx).unwrap_or_default();
        let Some(id) = normalize_code(raw_code) else {
            tracing::debug!(raw = raw_code, "종목 코드 해석 실패, 건너뜀");
            continue;
        };

        let name = name_idx
            .and_then(|i| record.get(i))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let market = market_idx
            .and_then(|i| record.get(i))
            .and_then(KrMarket::parse)
            .or_else(|| {
                yahoo_idx
                    .and_then(|i| record.get(i))
                    .and_then(KrMarket::from_yahoo_symbol)
            })
            .or_else(|| KrMarket::from_yahoo_symbol(raw_code))
            .or(default_market)
            .unwrap_or(KrMarket::Kospi);

        symbols.push(Symbol::new(id, name, market));
    }

    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_naver_export() {
        let csv = "\u{feff}종목코드,시장,종목명,YahooSymbol\n\
                   005930,KOSPI,삼성전자,005930.KS\n\
                   035720,KOSDAQ,카카오,035720.KQ\n";
        let symbols = parse_symbols(csv.as_bytes(), None).unwrap();

        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0], Symbol::new("005930", "삼성전자", KrMarket::Kospi));
        assert_eq!(symbols[1].market, KrMarket::Kosdaq);
    }

    #[test]
    fn test_parse_uses_first_column_and_suffix() {
        let csv = "ticker_raw,other\n091990.KQ,x\n5930,y\nnot-a-code,z\n";
        let symbols = parse_symbols(csv.as_bytes(), None).unwrap();

        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].id, "091990");
        assert_eq!(symbols[0].market, KrMarket::Kosdaq);
        assert_eq!(symbols[1].id, "005930");
        assert_eq!(symbols[1].market, KrMarket::Kospi);
    }

    #[test]
    fn test_default_market_applies_without_hints() {
        let csv = "code\n263750\n";
        let symbols = parse_symbols(csv.as_bytes(), Some(KrMarket::Kosdaq)).unwrap();
        assert_eq!(symbols[0].market, KrMarket::Kosdaq);
    }

    #[test]
    fn test_load_symbols_dedups_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let kospi = dir.path().join("yahoo_meta_kospi.csv");
        let kosdaq = dir.path().join("yahoo_meta_kosdaq.csv");
        std::fs::write(&kospi, "code,name\n005930,삼성전자\n000660,SK하이닉스\n").unwrap();
        std::fs::write(&kosdaq, "code,name\n035720,카카오\n005930,중복\n").unwrap();

        let symbols = load_symbols(&[
            kospi,
            kosdaq,
            dir.path().join("missing.csv"),
        ])
        .unwrap();

        let ids: Vec<&str> = symbols.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["000660", "005930", "035720"]);
        assert_eq!(symbols[1].name, "삼성전자");
        assert_eq!(symbols[2].market, KrMarket::Kosdaq);
    }
}
