use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use auditor_application::{
    CandleRepository, EventStream, GatewayError, IngestionError, IngestionService,
    IngestionServiceImpl, MarketEventGateway, RepositoryError,
};
use auditor_domain::Candle;
use futures::stream;
use serde_json::{json, Value};
use tokio::sync::Mutex;

#[tokio::test]
async fn candles_are_routed_deduplicated_and_saved() {
    let messages = vec![
        Ok(kline("BTCUSDT", 0, "42000")),
        Ok(json!({ "e": "trade", "s": "BTCUSDT", "p": "42000", "q": "0.1" })),
        Ok(kline("BTCUSDT", 0, "42010")),
        Ok(kline("ETHUSDT", 0, "2300")),
        Ok(json!({ "e": "depthUpdate", "s": "ETHUSDT", "b": [], "a": [] })),
        Ok(json!({ "stream": "unknown@feed" })),
        Ok(kline("BTCUSDT", 1, "42020")),
    ];
    let repository = Arc::new(RecordingCandleRepository::default());
    let service = build_service(messages, repository.clone(), 100);

    let stats = service.run(&symbols()).await.unwrap();

    assert_eq!(stats.candles, 4);
    assert_eq!(stats.trades, 1);
    assert_eq!(stats.depth, 1);
    assert_eq!(stats.unknown, 1);

    let saved = repository.saved().await;
    assert_eq!(saved.len(), 3);
    let btc_first = saved
        .iter()
        .find(|c| c.document_id() == "BTCUSDT_1735689600000")
        .expect("first BTC candle stored");
    assert_eq!(btc_first.close().to_string(), "42010");
    assert!(repository.shutdown_called());
}

#[tokio::test]
async fn full_batches_are_flushed_as_they_fill() {
    let messages = (0..5).map(|minute| Ok(kline("SOLUSDT", minute, "150"))).collect();
    let repository = Arc::new(RecordingCandleRepository::default());
    let service = build_service(messages, repository.clone(), 2);

    service.run(&symbols()).await.unwrap();

    assert_eq!(repository.batch_sizes().await, vec![2, 2, 1]);
}

#[tokio::test]
async fn stream_error_aborts_ingestion() {
    let messages = vec![
        Ok(kline("BTCUSDT", 0, "42000")),
        Err(GatewayError::StreamError("socket closed".to_string())),
    ];
    let repository = Arc::new(RecordingCandleRepository::default());
    let service = build_service(messages, repository.clone(), 100);

    let result = service.run(&symbols()).await;

    assert!(matches!(result, Err(IngestionError::GatewayError(_))));
    assert!(!repository.shutdown_called());
}

fn build_service(
    messages: Vec<Result<Value, GatewayError>>,
    repository: Arc<RecordingCandleRepository>,
    batch_size: usize,
) -> Arc<dyn IngestionService> {
    let gateway = Arc::new(StubGateway::new(messages));
    Arc::new(IngestionServiceImpl::new(
        gateway,
        repository,
        batch_size,
        Duration::from_secs(60),
    ))
}

fn symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn kline(symbol: &str, minute: i64, close: &str) -> Value {
    let open_time = 1_735_689_600_000i64 + minute * 60_000;
    json!({
        "e": "kline",
        "E": open_time + 59_999,
        "s": symbol,
        "k": {
            "t": open_time,
            "i": "1m",
            "o": close,
            "h": close,
            "l": close,
            "c": close,
            "v": "1.0"
        }
    })
}

struct StubGateway {
    messages: Mutex<Option<Vec<Result<Value, GatewayError>>>>,
}

impl StubGateway {
    fn new(messages: Vec<Result<Value, GatewayError>>) -> Self {
        Self {
            messages: Mutex::new(Some(messages)),
        }
    }
}

#[async_trait]
impl MarketEventGateway for StubGateway {
    async fn subscribe(&self, symbols: &[String]) -> Result<EventStream, GatewayError> {
        let messages = self
            .messages
            .lock()
            .await
            .take()
            .ok_or_else(|| GatewayError::SubscriptionFailed {
                symbols: symbols.to_vec(),
                reason: "already subscribed".to_string(),
            })?;
        Ok(Box::new(stream::iter(messages)))
    }
}

#[derive(Default)]
struct RecordingCandleRepository {
    batches: Mutex<Vec<Vec<Candle>>>,
    shutdown_called: AtomicBool,
}

impl RecordingCandleRepository {
    async fn saved(&self) -> Vec<Candle> {
        self.batches.lock().await.iter().flatten().cloned().collect()
    }

    async fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().await.iter().map(Vec::len).collect()
    }

    fn shutdown_called(&self) -> bool {
        self.shutdown_called.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandleRepository for RecordingCandleRepository {
    async fn save_batch(&self, candles: Vec<Candle>) -> Result<(), RepositoryError> {
        self.batches.lock().await.push(candles);
        Ok(())
    }

    async fn flush(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), RepositoryError> {
        self.shutdown_called.store(true, Ordering::SeqCst);
        Ok(())
    }
}
