use crate::ports::{CandleRepository, MarketEventGateway};
use crate::routing::{MessageRouter, RouteOutcome, RouterStats};
use async_trait::async_trait;
use auditor_domain::{Candle, MarketDataEvent};
use chrono::Utc;
use futures::StreamExt;
use shaku::{Component, Interface};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[async_trait]
pub trait IngestionService: Interface {
    /// Consumes the feed until it ends, persisting candles. Returns the
    /// router counters accumulated over the run.
    async fn run(&self, symbols: &[String]) -> Result<RouterStats, IngestionError>;
}

#[derive(Component)]
#[shaku(interface = IngestionService)]
pub struct IngestionServiceImpl {
    #[shaku(inject)]
    gateway: Arc<dyn MarketEventGateway>,
    #[shaku(inject)]
    repository: Arc<dyn CandleRepository>,
    #[shaku(default = 1000)]
    batch_size: usize,
    #[shaku(default = Duration::from_secs(5))]
    flush_interval: Duration,
}

#[async_trait]
impl IngestionService for IngestionServiceImpl {
    async fn run(&self, symbols: &[String]) -> Result<RouterStats, IngestionError> {
        info!("Starting ingestion service for symbols: {:?}", symbols);

        let mut stream = self
            .gateway
            .subscribe(symbols)
            .await
            .map_err(IngestionError::GatewayError)?;

        let mut router = MessageRouter::new();
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut flush_timer = tokio::time::interval(self.flush_interval);

        loop {
            tokio::select! {
                next = stream.next() => {
                    match next {
                        Some(Ok(message)) => {
                            let event = MarketDataEvent::from_message(message, Utc::now());
                            if let RouteOutcome::Store(candle) = router.route(event) {
                                batch.push(candle);
                                if batch.len() >= self.batch_size {
                                    self.flush_batch(&mut batch).await?;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            error!("Stream error: {}", e);
                            return Err(IngestionError::GatewayError(e));
                        }
                        None => {
                            warn!("Market data stream ended");
                            break;
                        }
                    }
                }
                _ = flush_timer.tick() => {
                    if !batch.is_empty() {
                        self.flush_batch(&mut batch).await?;
                    }
                }
            }
        }

        if !batch.is_empty() {
            self.flush_batch(&mut batch).await?;
        }

        self.repository.shutdown().await?;

        let stats = router.stats().clone();
        info!(
            "Ingestion service stopped: events={}, candles={}, rejected={}",
            stats.total(),
            stats.candles,
            stats.rejected_candles
        );
        Ok(stats)
    }
}

impl IngestionServiceImpl {
    pub fn new(
        gateway: Arc<dyn MarketEventGateway>,
        repository: Arc<dyn CandleRepository>,
        batch_size: usize,
        flush_interval: Duration,
    ) -> Self {
        Self {
            gateway,
            repository,
            batch_size: batch_size.max(1),
            flush_interval,
        }
    }

    async fn flush_batch(&self, batch: &mut Vec<Candle>) -> Result<(), IngestionError> {
        let candles = dedupe_batch(std::mem::take(batch));
        info!("Flushing {} candles to repository", candles.len());

        self.repository
            .save_batch(candles)
            .await
            .map_err(IngestionError::RepositoryError)?;

        Ok(())
    }
}

/// Collapses candles sharing a document id, keeping the latest update in the
/// position of the first occurrence.
fn dedupe_batch(batch: Vec<Candle>) -> Vec<Candle> {
    let mut positions: HashMap<(String, String), usize> = HashMap::with_capacity(batch.len());
    let mut unique: Vec<Candle> = Vec::with_capacity(batch.len());

    for candle in batch {
        let key = (candle.document_id(), candle.timeframe().to_string());
        match positions.get(&key) {
            Some(&index) => unique[index] = candle,
            None => {
                positions.insert(key, unique.len());
                unique.push(candle);
            }
        }
    }

    unique
}

#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("Gateway error: {0}")]
    GatewayError(#[from] crate::ports::GatewayError),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] crate::ports::RepositoryError),
}
