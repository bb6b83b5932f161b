use async_trait::async_trait;
use auditor_domain::{
    detect_gaps, parse_interval, AuditWindow, AuditWindowError, Candle, GapAuditEntry,
    GapInterval, TimeframeError,
};
use chrono::{DateTime, Utc};
use shaku::{Component, Interface};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::DEFAULT_GAP_TOLERANCE_SECONDS;
use crate::ports::{GapSink, RecordSource, SourceError};

#[async_trait]
pub trait GapDetector: Interface {
    async fn detect_gaps(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GapInterval>, GapDetectionError>;
}

#[derive(Component)]
#[shaku(interface = GapDetector)]
pub struct GapDetectorImpl {
    #[shaku(inject)]
    source: Arc<dyn RecordSource>,

    #[shaku(inject)]
    sink: Arc<dyn GapSink>,

    #[shaku(default = DEFAULT_GAP_TOLERANCE_SECONDS)]
    tolerance_seconds: i64,
}

impl GapDetectorImpl {
    pub fn new(
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn GapSink>,
        tolerance_seconds: i64,
    ) -> Self {
        Self {
            source,
            sink,
            tolerance_seconds,
        }
    }

    async fn log_gaps(&self, window: &AuditWindow, gaps: &[GapInterval]) {
        let logged_at = Utc::now();
        for gap in gaps {
            let entry = GapAuditEntry::new(window, gap, logged_at);
            if let Err(e) = self.sink.log_gap(&entry).await {
                warn!(
                    dataset_id = %entry.dataset_id,
                    gap_start = %entry.gap_start,
                    "Failed to log gap: {}",
                    e
                );
            }
        }
    }
}

#[async_trait]
impl GapDetector for GapDetectorImpl {
    async fn detect_gaps(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GapInterval>, GapDetectionError> {
        let interval_seconds = parse_interval(timeframe)?;
        let window = AuditWindow::new(symbol, timeframe, start, end)?;

        info!(
            "Detecting gaps for {} {} from {} to {}",
            symbol, timeframe, start, end
        );

        let candles = self
            .source
            .fetch_range(symbol, timeframe, start, end)
            .await?;

        if candles.is_empty() {
            warn!("No data found for {} {}", symbol, timeframe);
        }

        let timestamps = candles.iter().map(Candle::timestamp).collect();
        let gaps = detect_gaps(&window, timestamps, interval_seconds, self.tolerance_seconds);

        self.log_gaps(&window, &gaps).await;

        info!("Found {} gaps for {} {}", gaps.len(), symbol, timeframe);
        Ok(gaps)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GapDetectionError {
    #[error(transparent)]
    InvalidTimeframe(#[from] TimeframeError),

    #[error("Invalid audit window: {0}")]
    InvalidWindow(#[from] AuditWindowError),

    #[error("Record source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),
}
