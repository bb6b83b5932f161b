use crate::repositories::schema::record_batch_to_candles;
use async_trait::async_trait;
use auditor_application::ports::{RecordSource, SourceError};
use auditor_domain::Candle;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use shaku::Component;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reads candles back from the files written by
/// [`ParquetCandleRepository`](crate::repositories::ParquetCandleRepository).
#[derive(Component)]
#[shaku(interface = RecordSource)]
pub struct ParquetRecordSource {
    #[shaku(default = PathBuf::from("./data/"))]
    data_dir: PathBuf,
}

impl ParquetRecordSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn candidate_files(
        data_dir: &Path,
        symbol: &str,
        timeframe: &str,
    ) -> Result<Vec<PathBuf>, SourceError> {
        let entries = match fs::read_dir(data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Data directory {} does not exist yet", data_dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let prefix = format!("{}_{}_", symbol, timeframe);
        let mut files = Vec::new();

        for entry in entries {
            let path = entry?.path();

            if !path.is_file() {
                continue;
            }

            let filename = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };

            if filename.ends_with(".parquet") && filename.starts_with(&prefix) {
                files.push(path);
            }
        }

        Ok(files)
    }

    fn read_file(
        path: &Path,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, SourceError> {
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .and_then(|builder| builder.build())
            .map_err(|e| SourceError::Storage(format!("{}: {}", path.display(), e)))?;

        let mut candles = Vec::new();
        for batch in reader {
            let batch =
                batch.map_err(|e| SourceError::Storage(format!("{}: {}", path.display(), e)))?;
            let rows = record_batch_to_candles(&batch)
                .map_err(|e| SourceError::CorruptRecord(format!("{}: {}", path.display(), e)))?;

            candles.extend(rows.into_iter().filter(|c| {
                c.symbol() == symbol
                    && c.timeframe() == timeframe
                    && c.timestamp() >= start
                    && c.timestamp() < end
            }));
        }

        Ok(candles)
    }

    fn scan(
        data_dir: &Path,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, SourceError> {
        let files = Self::candidate_files(data_dir, symbol, timeframe)?;
        let mut candles = Vec::new();

        for path in &files {
            candles.extend(Self::read_file(path, symbol, timeframe, start, end)?);
        }

        debug!(
            "Scanned {} files for {} {}, {} candles in range",
            files.len(),
            symbol,
            timeframe,
            candles.len()
        );
        Ok(candles)
    }
}

#[async_trait]
impl RecordSource for ParquetRecordSource {
    async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, SourceError> {
        let data_dir = self.data_dir.clone();
        let symbol = symbol.to_string();
        let timeframe = timeframe.to_string();

        tokio::task::spawn_blocking(move || Self::scan(&data_dir, &symbol, &timeframe, start, end))
            .await
            .map_err(|e| SourceError::Storage(format!("scan task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::ParquetCandleRepository;
    use auditor_application::ports::CandleRepository;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn candle(symbol: &str, timeframe: &str, h: i64) -> Candle {
        Candle::new(
            hour(h),
            symbol.to_string(),
            timeframe.to_string(),
            dec!(42000.5),
            dec!(42100),
            dec!(41900),
            dec!(42050.12345678),
            dec!(3.25),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_reads_back_written_candles_within_window() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let repository = ParquetCandleRepository::new(dir.path());
        repository
            .save_batch((0..6).map(|h| candle("BTCUSDT", "1h", h)).collect())
            .await
            .unwrap();
        repository
            .save_batch(vec![candle("BTCUSDT", "1h", 8), candle("ETHUSDT", "1h", 2)])
            .await
            .unwrap();

        let source = ParquetRecordSource::new(dir.path());
        let mut candles = source
            .fetch_range("BTCUSDT", "1h", hour(2), hour(9))
            .await
            .unwrap();
        candles.sort_by_key(|c| c.timestamp());

        let hours: Vec<DateTime<Utc>> = candles.iter().map(|c| c.timestamp()).collect();
        assert_eq!(hours, vec![hour(2), hour(3), hour(4), hour(5), hour(8)]);
        assert_eq!(candles[0].close(), dec!(42050.12345678));
    }

    #[tokio::test]
    async fn test_other_timeframes_are_ignored() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let repository = ParquetCandleRepository::new(dir.path());
        repository
            .save_batch(vec![candle("BTCUSDT", "1h", 0), candle("BTCUSDT", "1m", 0)])
            .await
            .unwrap();

        let source = ParquetRecordSource::new(dir.path());
        let candles = source
            .fetch_range("BTCUSDT", "1m", hour(0), hour(1))
            .await
            .unwrap();

        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].timeframe(), "1m");
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let source = ParquetRecordSource::new(dir.path().join("missing"));

        let candles = source
            .fetch_range("BTCUSDT", "1h", hour(0), hour(24))
            .await
            .unwrap();

        assert!(candles.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::write(dir.path().join("BTCUSDT_1h_0_broken.parquet"), b"not parquet").unwrap();

        let source = ParquetRecordSource::new(dir.path());
        let result = source.fetch_range("BTCUSDT", "1h", hour(0), hour(24)).await;

        assert!(matches!(result, Err(SourceError::Storage(_))));
    }
}
