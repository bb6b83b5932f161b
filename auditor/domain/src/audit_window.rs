use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The `(symbol, timeframe, start, end)` tuple defining one detection run.
/// `start` is inclusive, `end` exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditWindow {
    symbol: String,
    timeframe: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl AuditWindow {
    pub fn new(
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, AuditWindowError> {
        if start > end {
            return Err(AuditWindowError::StartAfterEnd);
        }
        Ok(Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            start,
            end,
        })
    }

    /// Window of `lookback` ending at `end`.
    pub fn trailing(
        symbol: &str,
        timeframe: &str,
        end: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<Self, AuditWindowError> {
        Self::new(symbol, timeframe, end - lookback, end)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    pub fn dataset_id(&self) -> String {
        format!("candles_{}_{}", self.symbol, self.timeframe)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditWindowError {
    #[error("Window start must be before or equal to window end")]
    StartAfterEnd,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_valid_window() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let window = AuditWindow::new("BTCUSDT", "1h", start, end).unwrap();

        assert_eq!(window.duration_seconds(), 86_400);
        assert_eq!(window.dataset_id(), "candles_BTCUSDT_1h");
    }

    #[test]
    fn test_invalid_window() {
        let start = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        assert!(matches!(
            AuditWindow::new("BTCUSDT", "1h", start, end),
            Err(AuditWindowError::StartAfterEnd)
        ));
    }

    #[test]
    fn test_contains_is_half_open() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap();
        let window = AuditWindow::new("ETHUSDT", "1m", start, end).unwrap();

        assert!(window.contains(start));
        assert!(!window.contains(end));
        assert!(!window.contains(start - Duration::seconds(1)));
    }

    #[test]
    fn test_trailing_window() {
        let end = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let window = AuditWindow::trailing("ETHUSDT", "5m", end, Duration::hours(24)).unwrap();

        assert_eq!(window.start(), Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(window.end(), end);
    }
}
