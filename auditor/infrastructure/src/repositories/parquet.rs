use super::schema::{candle_schema, candles_to_record_batch};
use async_trait::async_trait;
use auditor_application::ports::{CandleRepository, RepositoryError};
use auditor_domain::Candle;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use shaku::Component;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Writes each saved batch as immutable Parquet files, one per
/// (symbol, timeframe) group, named
/// `{symbol}_{timeframe}_{first_timestamp_millis}_{uuid}.parquet`.
#[derive(Component)]
#[shaku(interface = CandleRepository)]
pub struct ParquetCandleRepository {
    #[shaku(default = PathBuf::from("./data/"))]
    output_dir: PathBuf,
    #[shaku(default)]
    files_written: AtomicUsize,
}

impl ParquetCandleRepository {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            files_written: AtomicUsize::new(0),
        }
    }

    pub fn files_written(&self) -> usize {
        self.files_written.load(Ordering::SeqCst)
    }

    fn generate_file_path(&self, symbol: &str, timeframe: &str, first: &Candle) -> PathBuf {
        let filename = format!(
            "{}_{}_{}_{}.parquet",
            symbol,
            timeframe,
            first.timestamp().timestamp_millis(),
            Uuid::new_v4().simple()
        );
        self.output_dir.join(filename)
    }

    /// Writes to a temporary sibling and renames, so readers never see a
    /// half-written file.
    fn write_file(path: &Path, candles: &[Candle]) -> Result<(), RepositoryError> {
        let batch = candles_to_record_batch(candles)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        let tmp_path = path.with_extension("parquet.tmp");
        let file = File::create(&tmp_path)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let mut writer = ArrowWriter::try_new(file, candle_schema(), Some(props))
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;
        writer
            .write(&batch)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;
        writer
            .close()
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[async_trait]
impl CandleRepository for ParquetCandleRepository {
    async fn save_batch(&self, candles: Vec<Candle>) -> Result<(), RepositoryError> {
        if candles.is_empty() {
            warn!("Attempted to save empty batch, skipping");
            return Ok(());
        }

        fs::create_dir_all(&self.output_dir)?;

        let mut groups: BTreeMap<(String, String), Vec<Candle>> = BTreeMap::new();
        for candle in candles {
            groups
                .entry((candle.symbol().to_string(), candle.timeframe().to_string()))
                .or_default()
                .push(candle);
        }

        for ((symbol, timeframe), mut group) in groups {
            group.sort_by_key(|c| c.timestamp());
            let path = self.generate_file_path(&symbol, &timeframe, &group[0]);

            Self::write_file(&path, &group)?;
            self.files_written.fetch_add(1, Ordering::SeqCst);
            info!(
                "Wrote {} {} {} candles to {}",
                group.len(),
                symbol,
                timeframe,
                path.display()
            );
        }

        Ok(())
    }

    async fn flush(&self) -> Result<(), RepositoryError> {
        // Every save closes its files, nothing is buffered.
        debug!("Flush requested, parquet files are already closed");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), RepositoryError> {
        info!(
            "Shutdown: parquet repository wrote {} files to {}",
            self.files_written(),
            self.output_dir.display()
        );
        Ok(())
    }
}
