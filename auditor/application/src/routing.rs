use auditor_domain::{Candle, CandleValidationError, EventKind, MarketDataEvent};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, warn};

const DEFAULT_KLINE_INTERVAL: &str = "1m";

/// Per-kind counters kept by [`MessageRouter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub trades: u64,
    pub tickers: u64,
    pub depth: u64,
    pub mark_price: u64,
    pub funding_rate: u64,
    pub candles: u64,
    pub unknown: u64,
    pub rejected_candles: u64,
}

impl RouterStats {
    pub fn total(&self) -> u64 {
        self.trades
            + self.tickers
            + self.depth
            + self.mark_price
            + self.funding_rate
            + self.candles
            + self.unknown
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// A candle ready for the candle repository.
    Store(Candle),
    /// Classified and counted; no storage for this kind.
    Observed(EventKind),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingSymbol,
    MalformedCandle(String),
}

#[derive(Debug, Default)]
pub struct MessageRouter {
    stats: RouterStats,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    pub fn route(&mut self, event: MarketDataEvent) -> RouteOutcome {
        let symbol = match event.symbol.as_deref() {
            Some(symbol) if symbol != "UNKNOWN" => symbol.to_string(),
            _ => {
                debug!(kind = ?event.kind, "Skipping event with invalid symbol");
                self.stats.unknown += 1;
                return RouteOutcome::Skipped(SkipReason::MissingSymbol);
            }
        };

        match event.kind {
            EventKind::Trade => {
                self.stats.trades += 1;
                debug!(
                    symbol = %symbol,
                    price = ?event.payload.get("p"),
                    quantity = ?event.payload.get("q"),
                    "Processing trade event"
                );
                RouteOutcome::Observed(EventKind::Trade)
            }
            EventKind::Ticker => {
                self.stats.tickers += 1;
                debug!(symbol = %symbol, close = ?event.payload.get("c"), "Processing ticker event");
                RouteOutcome::Observed(EventKind::Ticker)
            }
            EventKind::Depth => {
                self.stats.depth += 1;
                debug!(
                    symbol = %symbol,
                    bids = level_count(&event.payload, "b"),
                    asks = level_count(&event.payload, "a"),
                    "Processing depth event"
                );
                RouteOutcome::Observed(EventKind::Depth)
            }
            EventKind::MarkPrice => {
                self.stats.mark_price += 1;
                debug!(symbol = %symbol, mark_price = ?event.payload.get("p"), "Processing mark price event");
                RouteOutcome::Observed(EventKind::MarkPrice)
            }
            EventKind::FundingRate => {
                self.stats.funding_rate += 1;
                debug!(symbol = %symbol, funding_rate = ?event.payload.get("r"), "Processing funding rate event");
                RouteOutcome::Observed(EventKind::FundingRate)
            }
            EventKind::Candle => {
                self.stats.candles += 1;
                match candle_from_kline(&symbol, event.timestamp, &event.payload) {
                    Ok(candle) => RouteOutcome::Store(candle),
                    Err(e) => {
                        self.stats.rejected_candles += 1;
                        warn!(symbol = %symbol, "Dropping malformed candle event: {}", e);
                        RouteOutcome::Skipped(SkipReason::MalformedCandle(e.to_string()))
                    }
                }
            }
            EventKind::Unknown => {
                self.stats.unknown += 1;
                debug!(symbol = %symbol, stream = ?event.stream, "Unrecognised event kind");
                RouteOutcome::Observed(EventKind::Unknown)
            }
        }
    }
}

fn level_count(payload: &Value, side: &str) -> usize {
    payload
        .get(side)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

/// Builds a candle from a kline payload (`{"k": {"t", "i", "o", "h", "l", "c", "v"}}`).
/// The kline open time wins over the event time.
pub fn candle_from_kline(
    symbol: &str,
    event_time: DateTime<Utc>,
    payload: &Value,
) -> Result<Candle, KlineError> {
    let kline = payload
        .get("k")
        .filter(|k| k.is_object())
        .ok_or(KlineError::MissingKline)?;

    let timestamp = kline
        .get("t")
        .and_then(Value::as_i64)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(event_time);

    let timeframe = kline
        .get("i")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_KLINE_INTERVAL)
        .to_string();

    Ok(Candle::new(
        timestamp,
        symbol.to_string(),
        timeframe,
        decimal_field(kline, "o")?,
        decimal_field(kline, "h")?,
        decimal_field(kline, "l")?,
        decimal_field(kline, "c")?,
        decimal_field(kline, "v")?,
    )?)
}

fn decimal_field(kline: &Value, field: &'static str) -> Result<Decimal, KlineError> {
    let parsed = match kline.get(field) {
        Some(Value::String(raw)) => Decimal::from_str(raw).ok(),
        Some(Value::Number(number)) => Decimal::from_str(&number.to_string()).ok(),
        _ => None,
    };
    parsed.ok_or(KlineError::InvalidField(field))
}

#[derive(Debug, thiserror::Error)]
pub enum KlineError {
    #[error("Event carries no kline object")]
    MissingKline,

    #[error("Kline field '{0}' is missing or not a decimal")]
    InvalidField(&'static str),

    #[error("Invalid candle: {0}")]
    InvalidCandle(#[from] CandleValidationError),
}
