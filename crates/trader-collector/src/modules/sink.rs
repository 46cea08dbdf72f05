//! 분봉 출력 모듈.
//!
//! 심볼별 데이터셋에 `(심볼, 시각)` 키로 덮어쓰기 기록합니다.
//! 같은 페이지를 다시 기록해도 행이 중복되지 않으므로, 출력 기록 후
//! 체크포인트 저장 전에 종료되어 페이지를 재조회해도 안전합니다.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use trader_core::fs::write_atomic;
use trader_core::{CoreError, MinuteBar, Symbol};

/// 출력 에러
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("출력 파일 입출력 에러 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV 처리 에러 ({path}): {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Write(#[from] CoreError),
}

/// 기록 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// 새로 추가된 행
    pub inserted: usize,
    /// 같은 키를 덮어쓴 행
    pub replaced: usize,
    /// 기록 후 데이터셋 전체 행 수
    pub total: usize,
}

/// 분봉 출력 대상.
pub trait BarSink {
    /// 행을 키 기준으로 병합 기록합니다.
    ///
    /// 반환 시점에는 안정 저장소 기록이 끝나 있어야 합니다.
    fn write_rows(
        &mut self,
        symbol: &Symbol,
        rows: &[MinuteBar],
    ) -> Result<WriteOutcome, SinkError>;
}

type BarMap = BTreeMap<DateTime<Utc>, MinuteBar>;

fn merge(target: &mut BarMap, rows: &[MinuteBar]) -> WriteOutcome {
    let mut outcome = WriteOutcome::default();
    for bar in rows {
        match target.insert(bar.key(), bar.clone()) {
            Some(_) => outcome.replaced += 1,
            None => outcome.inserted += 1,
        }
    }
    outcome.total = target.len();
    outcome
}

/// 심볼별 CSV 파일 출력 (`{out_dir}/{code}_1min.csv`).
///
/// 마지막으로 기록한 심볼의 데이터셋을 메모리에 유지하고, 매 기록마다
/// 파일 전체를 원자적으로 교체합니다.
#[derive(Debug)]
pub struct CsvBarSink {
    dir: PathBuf,
    current: Option<(String, BarMap)>,
}

impl CsvBarSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: None,
        }
    }

    /// 심볼의 출력 파일 경로
    pub fn path_for(&self, symbol_id: &str) -> PathBuf {
        self.dir.join(format!("{}_1min.csv", symbol_id))
    }

    /// 저장된 분봉 전체를 시각 순으로 읽습니다. 파일이 없으면 빈 목록.
    pub fn read_bars(&self, symbol_id: &str) -> Result<Vec<MinuteBar>, SinkError> {
        Ok(load_csv(&self.path_for(symbol_id))?.into_values().collect())
    }
}

impl BarSink for CsvBarSink {
    fn write_rows(
        &mut self,
        symbol: &Symbol,
        rows: &[MinuteBar],
    ) -> Result<WriteOutcome, SinkError> {
        let path = self.path_for(&symbol.id);
        let mut merged = match self.current.take() {
            Some((id, bars)) if id == symbol.id => bars,
            _ => load_csv(&path)?,
        };
        let outcome = merge(&mut merged, rows);

        let mut writer = csv::Writer::from_writer(Vec::new());
        for bar in merged.values() {
            writer.serialize(bar).map_err(|source| SinkError::Csv {
                path: path.clone(),
                source,
            })?;
        }
        let bytes = writer.into_inner().map_err(|e| SinkError::Io {
            path: path.clone(),
            source: e.into_error(),
        })?;
        write_atomic(&path, &bytes)?;

        // 기록 실패 시 캐시는 비워 두고 다음 기록에서 디스크 기준으로 다시 읽음
        self.current = Some((symbol.id.clone(), merged));
        Ok(outcome)
    }
}

fn load_csv(path: &Path) -> Result<BarMap, SinkError> {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            if let csv::ErrorKind::Io(io) = e.kind() {
                if io.kind() == ErrorKind::NotFound {
                    return Ok(BarMap::new());
                }
            }
            return Err(SinkError::Csv {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let mut bars = BarMap::new();
    for record in reader.deserialize::<MinuteBar>() {
        let bar = record.map_err(|source| SinkError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        bars.insert(bar.key(), bar);
    }
    Ok(bars)
}

/// 메모리 출력.
///
/// 파일 없이 같은 키 덮어쓰기 규칙을 적용합니다. 출력 계층을 감싸는 구현
/// (기록 실패 주입 등)의 내부 출력으로 씁니다.
#[derive(Debug, Default)]
pub struct MemoryBarSink {
    datasets: HashMap<String, BarMap>,
}

impl MemoryBarSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 심볼의 분봉 전체 (시각 순)
    pub fn bars(&self, symbol_id: &str) -> Vec<MinuteBar> {
        self.datasets
            .get(symbol_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl BarSink for MemoryBarSink {
    fn write_rows(
        &mut self,
        symbol: &Symbol,
        rows: &[MinuteBar],
    ) -> Result<WriteOutcome, SinkError> {
        let target = self.datasets.entry(symbol.id.clone()).or_default();
        Ok(merge(target, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use trader_core::KrMarket;

    fn bar(minute: u32, close: rust_decimal::Decimal) -> MinuteBar {
        MinuteBar {
            time: Utc.with_ymd_and_hms(2025, 1, 6, 0, minute, 0).unwrap(),
            open: dec!(100),
            high: dec!(110),
            low: dec!(90),
            close,
            volume: 10,
        }
    }

    fn symbol() -> Symbol {
        Symbol::new("005930", "삼성전자", KrMarket::Kospi)
    }

    #[test]
    fn test_rewrite_same_page_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvBarSink::new(dir.path());
        let page = vec![bar(0, dec!(101)), bar(1, dec!(102))];

        let first = sink.write_rows(&symbol(), &page).unwrap();
        let second = sink.write_rows(&symbol(), &page).unwrap();

        assert_eq!(first.inserted, 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.replaced, 2);
        assert_eq!(sink.read_bars("005930").unwrap(), page);
    }

    #[test]
    fn test_new_sink_merges_with_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvBarSink::new(dir.path());
        sink.write_rows(&symbol(), &[bar(0, dec!(101)), bar(1, dec!(102))])
            .unwrap();

        // 재시작된 프로세스: 캐시 없이 기존 파일과 병합
        let mut restarted = CsvBarSink::new(dir.path());
        let outcome = restarted
            .write_rows(&symbol(), &[bar(1, dec!(105)), bar(2, dec!(103))])
            .unwrap();

        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.replaced, 1);
        let bars = restarted.read_bars("005930").unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[1].close, dec!(105));
    }

    #[test]
    fn test_read_missing_dataset_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvBarSink::new(dir.path());
        assert!(sink.read_bars("000660").unwrap().is_empty());
    }

    #[test]
    fn test_memory_sink_dedups_by_time() {
        let mut sink = MemoryBarSink::new();
        sink.write_rows(&symbol(), &[bar(0, dec!(1)), bar(0, dec!(2))])
            .unwrap();
        assert_eq!(sink.bars("005930").len(), 1);
        assert_eq!(sink.bars("005930")[0].close, dec!(2));
    }
}
