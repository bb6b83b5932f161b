mod di;

use crate::di::{create_app_module, AppModule, FeedSettings};
use auditor_application::{
    checked_tolerance, AuditScheduler, AuditorConfig, CandleRepository, GapDetector,
    IngestionService,
};
use auditor_domain::{GapInterval, GapSeverity};
use auditor_infrastructure::repositories::record_batch_to_candles;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::reader::{FileReader, SerializedFileReader};
use serde::Serialize;
use shaku::HasComponent;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "auditor")]
#[command(about = "Detects missing candles in interval-based market data", long_about = None)]
struct Cli {
    /// Candle store directory (overrides DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Gap audit log (overrides REDIS_URL)
    #[arg(long, global = true)]
    redis_url: Option<String>,

    /// Lateness allowed before a missing candle counts as a gap (overrides GAP_TOLERANCE_SECONDS)
    #[arg(long, global = true, value_parser = parse_tolerance)]
    tolerance_seconds: Option<i64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest the market feed and audit every configured pair until Ctrl+C
    Run {
        /// Audit only, without consuming the feed
        #[arg(long)]
        no_ingest: bool,

        /// Share of feed klines the mock gateway drops, between 0 and 1
        #[arg(long, default_value_t = 0.0, value_parser = parse_probability)]
        drop_probability: f64,

        #[arg(long, default_value_t = 100)]
        event_interval_ms: u64,
    },

    /// Run a single audit cycle over every configured pair
    Cycle,

    /// Detect gaps for one symbol and timeframe and print them as JSON
    Detect {
        #[arg(long)]
        symbol: String,

        #[arg(long)]
        timeframe: String,

        /// RFC 3339, defaults to `end` minus AUDIT_LOOKBACK_HOURS
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// RFC 3339, defaults to now
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },

    /// Print metadata and candle range of a parquet file
    Inspect { file: PathBuf },
}

#[derive(Serialize)]
struct DetectOutput<'a> {
    symbol: &'a str,
    timeframe: &'a str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    gaps: Vec<GapReport>,
}

#[derive(Serialize)]
struct GapReport {
    #[serde(flatten)]
    gap: GapInterval,
    severity: GapSeverity,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = AuditorConfig::from_env()?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(redis_url) = cli.redis_url {
        config.redis_url = redis_url;
    }
    if let Some(tolerance) = cli.tolerance_seconds {
        config.gap_tolerance_seconds = tolerance;
    }

    match cli.command {
        Command::Run {
            no_ingest,
            drop_probability,
            event_interval_ms,
        } => {
            let feed = FeedSettings {
                event_interval: Duration::from_millis(event_interval_ms.max(1)),
                drop_probability,
                history: config.scheduler.lookback,
                ..FeedSettings::default()
            };
            let module = create_app_module(&config, feed)?;
            run(&config, &module, !no_ingest).await
        }
        Command::Cycle => {
            let module = create_app_module(&config, FeedSettings::default())?;
            cycle(&module).await
        }
        Command::Detect {
            symbol,
            timeframe,
            start,
            end,
        } => {
            let module = create_app_module(&config, FeedSettings::default())?;
            let end = end.unwrap_or_else(Utc::now);
            let start = start.unwrap_or(end - config.scheduler.lookback);
            detect(&module, &symbol, &timeframe, start, end).await
        }
        Command::Inspect { file } => inspect(&file),
    }
}

fn parse_tolerance(value: &str) -> Result<i64, String> {
    let seconds: i64 = value.parse().map_err(|e| format!("{}", e))?;
    checked_tolerance(seconds).map_err(|e| e.to_string())
}

fn parse_probability(value: &str) -> Result<f64, String> {
    let probability: f64 = value.parse().map_err(|e| format!("{}", e))?;
    if !(0.0..=1.0).contains(&probability) {
        return Err(format!("{} is not between 0 and 1", value));
    }
    Ok(probability)
}

async fn run(
    config: &AuditorConfig,
    module: &AppModule,
    ingest: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting candle gap auditor");

    let scheduler: Arc<dyn AuditScheduler> = module.resolve();
    let repository: Arc<dyn CandleRepository> = module.resolve();
    let ingestion: Option<Arc<dyn IngestionService>> = ingest.then(|| module.resolve());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    let ingestion_run = async {
        match &ingestion {
            Some(service) => service.run(&config.symbols).await,
            None => std::future::pending().await,
        }
    };

    info!(
        "Auditing {} symbols x {} timeframes (Press Ctrl+C to stop)",
        config.symbols.len(),
        config.timeframes.len()
    );

    tokio::select! {
        result = ingestion_run => {
            match result {
                Ok(stats) => info!("Market feed ended after {} events", stats.total()),
                Err(e) => error!("Ingestion error: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, stopping gracefully...");
        }
    }

    shutdown_tx.send(true).ok();
    if let Err(e) = scheduler_task.await {
        error!("Audit scheduler task failed: {}", e);
    }

    repository.shutdown().await?;
    info!("Shutdown complete");

    Ok(())
}

async fn cycle(module: &AppModule) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler: Arc<dyn AuditScheduler> = module.resolve();

    let report = scheduler.run_cycle().await?;

    println!("Audit cycle completed:");
    println!("  Pairs audited: {}", report.pairs_audited);
    println!("  Pairs failed: {}", report.pairs_failed);
    println!("  Gaps found: {}", report.total_gaps);
    println!("  Actionable gaps: {}", report.actionable_gaps);
    println!("  Duration: {:?}", report.duration);

    Ok(())
}

async fn detect(
    module: &AppModule,
    symbol: &str,
    timeframe: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), Box<dyn std::error::Error>> {
    let detector: Arc<dyn GapDetector> = module.resolve();

    let gaps = detector.detect_gaps(symbol, timeframe, start, end).await?;

    let output = DetectOutput {
        symbol,
        timeframe,
        start,
        end,
        gaps: gaps
            .into_iter()
            .map(|gap| GapReport {
                severity: gap.severity(),
                gap,
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

fn inspect(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Inspecting parquet file: {}", path.display());

    let reader = SerializedFileReader::new(File::open(path)?)?;
    let metadata = reader.metadata();
    println!("  Num rows: {}", metadata.file_metadata().num_rows());
    println!("  Num row groups: {}", metadata.num_row_groups());

    let batches = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?.build()?;
    let mut candles = Vec::new();
    for batch in batches {
        candles.extend(record_batch_to_candles(&batch?)?);
    }

    let first = candles.iter().map(|c| c.timestamp()).min();
    let last = candles.iter().map(|c| c.timestamp()).max();
    match (candles.first(), first, last) {
        (Some(candle), Some(first), Some(last)) => {
            println!("  Series: {} {}", candle.symbol(), candle.timeframe());
            println!("  Candles: {} from {} to {}", candles.len(), first, last);
        }
        _ => println!("  No candles"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_flag_rejects_values_the_walk_cannot_hold() {
        assert_eq!(parse_tolerance("60"), Ok(60));
        assert!(parse_tolerance("-1").is_err());
        assert!(parse_tolerance("9999999999999999").is_err());
        assert!(parse_tolerance("soon").is_err());
    }

    #[test]
    fn test_drop_probability_flag_rejects_non_finite_values() {
        assert_eq!(parse_probability("0.25"), Ok(0.25));
        assert_eq!(parse_probability("1"), Ok(1.0));
        assert!(parse_probability("NaN").is_err());
        assert!(parse_probability("inf").is_err());
        assert!(parse_probability("-0.1").is_err());
        assert!(parse_probability("1.5").is_err());
    }

    #[test]
    fn test_drop_probability_flag_is_parsed_by_clap() {
        let parsed = Cli::try_parse_from(["auditor", "run", "--drop-probability", "NaN"]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from(["auditor", "run", "--drop-probability", "0.5"]);
        assert!(parsed.is_ok());
    }
}
