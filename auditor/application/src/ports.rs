use async_trait::async_trait;
use auditor_domain::{Candle, GapAuditEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shaku::Interface;

/// Read side of the candle store. Return order is not guaranteed.
#[async_trait]
pub trait RecordSource: Interface {
    async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, SourceError>;
}

/// Best-effort audit log for detected gaps.
#[async_trait]
pub trait GapSink: Interface {
    async fn log_gap(&self, entry: &GapAuditEntry) -> Result<(), SinkError>;
}

#[async_trait]
pub trait CandleRepository: Interface {
    async fn save_batch(&self, candles: Vec<Candle>) -> Result<(), RepositoryError>;
    async fn flush(&self) -> Result<(), RepositoryError>;
    async fn shutdown(&self) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MarketEventGateway: Interface {
    async fn subscribe(&self, symbols: &[String]) -> Result<EventStream, GatewayError>;
}

#[async_trait]
pub trait PairCatalog: Interface {
    async fn pairs(&self) -> Result<Vec<AuditPair>, CatalogError>;
}

pub type EventStream = Box<dyn futures::Stream<Item = Result<Value, GatewayError>> + Send + Unpin>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditPair {
    pub symbol: String,
    pub timeframe: String,
}

impl AuditPair {
    pub fn new(symbol: &str, timeframe: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Gap sink write failed: {0}")]
    SinkWriteFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Pair catalog unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Subscription failed for symbols {symbols:?}: {reason}")]
    SubscriptionFailed { symbols: Vec<String>, reason: String },

    #[error("Data stream error: {0}")]
    StreamError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}
