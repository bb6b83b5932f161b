use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Market data event kinds carried by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Trade,
    Ticker,
    Depth,
    MarkPrice,
    FundingRate,
    Candle,
    Unknown,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Trade,
        EventKind::Ticker,
        EventKind::Depth,
        EventKind::MarkPrice,
        EventKind::FundingRate,
        EventKind::Candle,
        EventKind::Unknown,
    ];

    fn from_event_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "trade" | "aggtrade" => EventKind::Trade,
            "24hrticker" => EventKind::Ticker,
            "depthlevel" | "depthupdate" => EventKind::Depth,
            "markpriceupdate" => EventKind::MarkPrice,
            "kline" => EventKind::Candle,
            _ => EventKind::Unknown,
        }
    }

    fn from_stream_name(stream: &str) -> Self {
        let stream = stream.to_lowercase();
        if stream.contains("markprice") {
            EventKind::MarkPrice
        } else if stream.contains("fundingrate") {
            EventKind::FundingRate
        } else if stream.contains("kline") {
            EventKind::Candle
        } else if stream.contains("trade") {
            EventKind::Trade
        } else if stream.contains("ticker") {
            EventKind::Ticker
        } else if stream.contains("depth") {
            EventKind::Depth
        } else {
            EventKind::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataEvent {
    pub kind: EventKind,
    pub symbol: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    pub stream: Option<String>,
}

impl MarketDataEvent {
    /// Classifies a raw feed message. `received_at` stands in for the event
    /// time when the message carries none.
    pub fn from_message(message: Value, received_at: DateTime<Utc>) -> Self {
        let stream = message
            .get("stream")
            .and_then(Value::as_str)
            .map(str::to_string);

        let kind = match (message.get("e").and_then(Value::as_str), stream.as_deref()) {
            (Some(name), _) => EventKind::from_event_name(name),
            (None, Some(stream)) => EventKind::from_stream_name(stream),
            (None, None) => EventKind::Unknown,
        };

        let symbol = ["s", "symbol"]
            .iter()
            .find_map(|field| message.get(*field).and_then(Value::as_str))
            .filter(|symbol| !symbol.is_empty())
            .map(str::to_string);

        let timestamp = ["E", "T", "t"]
            .iter()
            .filter_map(|field| message.get(*field).and_then(Value::as_i64))
            .find(|millis| *millis > 0)
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or(received_at);

        Self {
            kind,
            symbol,
            timestamp,
            payload: message,
            stream,
        }
    }
}
