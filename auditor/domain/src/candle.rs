use crate::timeframe::parse_interval;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV sample for a symbol/timeframe, keyed by its open time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    timestamp: DateTime<Utc>,
    symbol: String,
    timeframe: String,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

impl Candle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: DateTime<Utc>,
        symbol: String,
        timeframe: String,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Result<Self, CandleValidationError> {
        if symbol.is_empty() {
            return Err(CandleValidationError::EmptySymbol);
        }

        if parse_interval(&timeframe).is_err() {
            return Err(CandleValidationError::InvalidTimeframe(timeframe));
        }

        for (price, message) in [
            (open, "open must be positive"),
            (high, "high must be positive"),
            (low, "low must be positive"),
            (close, "close must be positive"),
        ] {
            if price <= Decimal::ZERO {
                return Err(CandleValidationError::InvalidPrice(message));
            }
        }

        if high < low {
            return Err(CandleValidationError::InvalidPrice(
                "high must not be below low",
            ));
        }

        if volume < Decimal::ZERO {
            return Err(CandleValidationError::NegativeVolume);
        }

        Ok(Self {
            timestamp,
            symbol,
            timeframe,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    pub fn open(&self) -> Decimal {
        self.open
    }

    pub fn high(&self) -> Decimal {
        self.high
    }

    pub fn low(&self) -> Decimal {
        self.low
    }

    pub fn close(&self) -> Decimal {
        self.close
    }

    pub fn volume(&self) -> Decimal {
        self.volume
    }

    /// Natural storage key; two writes of the same candle collapse onto it.
    pub fn document_id(&self) -> String {
        format!("{}_{}", self.symbol, self.timestamp.timestamp_millis())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CandleValidationError {
    #[error("Symbol cannot be empty")]
    EmptySymbol,
    #[error("Invalid timeframe: {0}")]
    InvalidTimeframe(String),
    #[error("Invalid price: {0}")]
    InvalidPrice(&'static str),
    #[error("Volume cannot be negative")]
    NegativeVolume,
}
