use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GAP_TOLERANCE_SECONDS: i64 = 60;
pub const DEFAULT_MIN_GAP_SIZE_SECONDS: i64 = 120;
pub const DEFAULT_AUDIT_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;
pub const DEFAULT_SUPPORTED_PAIRS: &str = "BTCUSDT,ETHUSDT,BNBUSDT,ADAUSDT,SOLUSDT";
pub const DEFAULT_SUPPORTED_TIMEFRAMES: &str = "1m,5m,15m,1h,4h,1d";

/// Knobs for the periodic audit loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub audit_interval: Duration,
    /// Wait before the next attempt after a cycle-level failure.
    pub retry_delay: Duration,
    pub lookback: chrono::Duration,
    /// Gaps shorter than this are still reported but not counted as actionable.
    pub min_gap_size_seconds: i64,
    pub max_concurrent_pairs: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            audit_interval: DEFAULT_AUDIT_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
            lookback: chrono::Duration::hours(DEFAULT_LOOKBACK_HOURS),
            min_gap_size_seconds: DEFAULT_MIN_GAP_SIZE_SECONDS,
            max_concurrent_pairs: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditorConfig {
    pub gap_tolerance_seconds: i64,
    pub scheduler: SchedulerSettings,
    pub symbols: Vec<String>,
    pub timeframes: Vec<String>,
    pub data_dir: PathBuf,
    pub redis_url: String,
    pub gap_audit_max_entries: usize,
    pub ingest_batch_size: usize,
    pub ingest_flush_interval: Duration,
}

impl Default for AuditorConfig {
    fn default() -> Self {
        Self {
            gap_tolerance_seconds: DEFAULT_GAP_TOLERANCE_SECONDS,
            scheduler: SchedulerSettings::default(),
            symbols: split_list(DEFAULT_SUPPORTED_PAIRS),
            timeframes: split_list(DEFAULT_SUPPORTED_TIMEFRAMES),
            data_dir: PathBuf::from("./data/"),
            redis_url: "redis://127.0.0.1".to_string(),
            gap_audit_max_entries: 10_000,
            ingest_batch_size: 1000,
            ingest_flush_interval: Duration::from_secs(5),
        }
    }
}

impl AuditorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup, falling back to
    /// defaults for absent keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = parse_var(&lookup, "GAP_TOLERANCE_SECONDS")? {
            config.gap_tolerance_seconds = checked_tolerance(value)?;
        }
        if let Some(value) = parse_var(&lookup, "MIN_GAP_SIZE_SECONDS")? {
            config.scheduler.min_gap_size_seconds = non_negative("MIN_GAP_SIZE_SECONDS", value)?;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "AUDIT_INTERVAL")? {
            config.scheduler.audit_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "AUDIT_RETRY_DELAY")? {
            config.scheduler.retry_delay = Duration::from_secs(secs);
        }
        if let Some(hours) = parse_var(&lookup, "AUDIT_LOOKBACK_HOURS")? {
            let hours = non_negative("AUDIT_LOOKBACK_HOURS", hours)?;
            config.scheduler.lookback =
                chrono::Duration::try_hours(hours).ok_or(ConfigError::InvalidValue {
                    key: "AUDIT_LOOKBACK_HOURS",
                    value: hours.to_string(),
                })?;
        }
        if let Some(limit) = parse_var::<usize, _>(&lookup, "AUDIT_MAX_CONCURRENT_PAIRS")? {
            config.scheduler.max_concurrent_pairs = limit.max(1);
        }
        if let Some(raw) = lookup("SUPPORTED_PAIRS") {
            config.symbols = split_list(&raw);
        }
        if let Some(raw) = lookup("SUPPORTED_TIMEFRAMES") {
            let timeframes = split_list(&raw);
            for timeframe in &timeframes {
                auditor_domain::parse_interval(timeframe).map_err(|_| ConfigError::InvalidValue {
                    key: "SUPPORTED_TIMEFRAMES",
                    value: timeframe.clone(),
                })?;
            }
            config.timeframes = timeframes;
        }
        if let Some(dir) = lookup("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("REDIS_URL") {
            config.redis_url = url;
        }
        if let Some(max) = parse_var(&lookup, "GAP_AUDIT_MAX_ENTRIES")? {
            config.gap_audit_max_entries = max;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

/// Accepts tolerances the gap walk can turn into a `TimeDelta`.
pub fn checked_tolerance(value: i64) -> Result<i64, ConfigError> {
    let value = non_negative("GAP_TOLERANCE_SECONDS", value)?;
    if chrono::TimeDelta::try_seconds(value).is_none() {
        return Err(ConfigError::InvalidValue {
            key: "GAP_TOLERANCE_SECONDS",
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn non_negative(key: &'static str, value: i64) -> Result<i64, ConfigError> {
    if value < 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}
