use async_trait::async_trait;
use auditor_application::ports::{EventStream, GatewayError, MarketEventGateway};
use auditor_domain::parse_interval;
use chrono::{DateTime, TimeDelta, Utc};
use futures::stream;
use rand::Rng;
use serde_json::{json, Value};
use shaku::Component;
use std::time::Duration;
use tracing::{debug, info};

/// Synthetic feed of closed klines for every subscribed symbol and configured
/// timeframe, aligned to wall-clock periods, with a trade message after each
/// kline. Series start `history` before subscription and are replayed without
/// delay until they catch up with the clock. With `drop_probability > 0` some
/// klines are skipped, leaving gaps for the auditor to find.
#[derive(Component)]
#[shaku(interface = MarketEventGateway)]
pub struct MockMarketEventGateway {
    #[shaku(default = Duration::from_millis(100))]
    event_interval: Duration,
    #[shaku(default = 42_000.0)]
    base_price: f64,
    #[shaku(default = 0.0)]
    drop_probability: f64,
    #[shaku(default = vec!["1m".to_string()])]
    timeframes: Vec<String>,
    #[shaku(default = TimeDelta::zero())]
    history: TimeDelta,
}

struct SeriesCursor {
    symbol: String,
    timeframe: String,
    interval: TimeDelta,
    next_open: DateTime<Utc>,
}

impl SeriesCursor {
    fn is_closed(&self, now: DateTime<Utc>) -> bool {
        self.next_open
            .checked_add_signed(self.interval)
            .is_some_and(|close| close <= now)
    }
}

struct FeedState {
    series: Vec<SeriesCursor>,
    next_series: usize,
    pending_trade: Option<String>,
}

impl FeedState {
    /// Index of the next series, in round-robin order, with a closed period
    /// still to emit.
    fn next_closed(&self, now: DateTime<Utc>) -> Option<usize> {
        let count = self.series.len();
        (0..count)
            .map(|offset| (self.next_series + offset) % count)
            .find(|&index| self.series[index].is_closed(now))
    }
}

/// Start of the period of length `interval_seconds` containing `ts`.
fn period_start(ts: DateTime<Utc>, interval_seconds: i64) -> Option<DateTime<Utc>> {
    let start = ts.timestamp().div_euclid(interval_seconds) * interval_seconds;
    DateTime::<Utc>::from_timestamp(start, 0)
}

impl MockMarketEventGateway {
    pub fn new(
        event_interval: Duration,
        base_price: f64,
        drop_probability: f64,
        timeframes: Vec<String>,
        history: TimeDelta,
    ) -> Self {
        Self {
            event_interval,
            base_price,
            drop_probability,
            timeframes,
            history,
        }
    }

    fn build_series(
        &self,
        symbols: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<SeriesCursor>, GatewayError> {
        let subscription_error = |reason: String| GatewayError::SubscriptionFailed {
            symbols: symbols.to_vec(),
            reason,
        };
        let replay_from = now
            .checked_sub_signed(self.history.abs())
            .ok_or_else(|| subscription_error("history out of range".to_string()))?;

        let mut series = Vec::with_capacity(symbols.len() * self.timeframes.len());
        for symbol in symbols {
            for timeframe in &self.timeframes {
                let interval_seconds = parse_interval(timeframe)
                    .map_err(|e| subscription_error(e.to_string()))?;
                let interval = TimeDelta::try_seconds(interval_seconds)
                    .ok_or_else(|| subscription_error(format!("interval too large: {}", timeframe)))?;
                let next_open = period_start(replay_from, interval_seconds)
                    .ok_or_else(|| subscription_error("history out of range".to_string()))?;

                series.push(SeriesCursor {
                    symbol: symbol.clone(),
                    timeframe: timeframe.clone(),
                    interval,
                    next_open,
                });
            }
        }

        Ok(series)
    }

    fn should_drop(drop_probability: f64) -> bool {
        // NaN fails the comparison, so it never reaches `random_bool`.
        let drop_probability = drop_probability.clamp(0.0, 1.0);
        drop_probability > 0.0 && rand::rng().random_bool(drop_probability)
    }

    fn generate_kline(base_price: f64, series: &SeriesCursor, open_time: DateTime<Utc>) -> Value {
        let mut rng = rand::rng();

        let open = base_price + rng.random_range(-50.0..50.0);
        let close = open + rng.random_range(-20.0..20.0);
        let high = open.max(close) + rng.random_range(0.0..10.0);
        let low = open.min(close) - rng.random_range(0.0..10.0);
        let volume = rng.random_range(0.5..25.0);
        let open_millis = open_time.timestamp_millis();
        let close_millis = open_millis + series.interval.num_milliseconds() - 1;

        json!({
            "e": "kline",
            "E": close_millis,
            "s": series.symbol,
            "k": {
                "t": open_millis,
                "T": close_millis,
                "s": series.symbol,
                "i": series.timeframe,
                "o": format!("{:.2}", open),
                "h": format!("{:.2}", high),
                "l": format!("{:.2}", low),
                "c": format!("{:.2}", close),
                "v": format!("{:.4}", volume),
                "x": true
            }
        })
    }

    fn generate_trade(base_price: f64, symbol: &str) -> Value {
        let mut rng = rand::rng();

        json!({
            "e": "trade",
            "E": Utc::now().timestamp_millis(),
            "s": symbol,
            "p": format!("{:.2}", base_price + rng.random_range(-5.0..5.0)),
            "q": format!("{:.4}", rng.random_range(0.001..2.0)),
        })
    }
}

#[async_trait]
impl MarketEventGateway for MockMarketEventGateway {
    async fn subscribe(&self, symbols: &[String]) -> Result<EventStream, GatewayError> {
        if symbols.is_empty() || self.timeframes.is_empty() {
            return Err(GatewayError::SubscriptionFailed {
                symbols: symbols.to_vec(),
                reason: "no symbols or timeframes requested".to_string(),
            });
        }

        info!(
            "Mock gateway: Subscribing to symbols {:?} on timeframes {:?}",
            symbols, self.timeframes
        );

        let state = FeedState {
            series: self.build_series(symbols, Utc::now())?,
            next_series: 0,
            pending_trade: None,
        };
        let event_interval = self.event_interval;
        let base_price = self.base_price;
        let drop_probability = self.drop_probability;

        let stream = stream::unfold(state, move |mut state| async move {
            loop {
                if let Some(symbol) = state.pending_trade.take() {
                    if state.next_closed(Utc::now()).is_some() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(event_interval).await;
                    }
                    let trade = Self::generate_trade(base_price, &symbol);
                    return Some((Ok::<Value, GatewayError>(trade), state));
                }

                let now = Utc::now();
                let Some(index) = state.next_closed(now) else {
                    // Nothing closed yet: keep the feed alive with trades.
                    tokio::time::sleep(event_interval).await;
                    let symbol = state.series[state.next_series].symbol.clone();
                    state.next_series = (state.next_series + 1) % state.series.len();
                    let trade = Self::generate_trade(base_price, &symbol);
                    return Some((Ok::<Value, GatewayError>(trade), state));
                };

                state.next_series = (index + 1) % state.series.len();
                let series = &mut state.series[index];
                let open_time = series.next_open;
                series.next_open = open_time + series.interval;
                let live = !series.is_closed(now);

                if live {
                    tokio::time::sleep(event_interval).await;
                } else {
                    tokio::task::yield_now().await;
                }

                let series = &state.series[index];
                if Self::should_drop(drop_probability) {
                    debug!(
                        "Mock gateway: dropping {} {} kline at {}",
                        series.symbol, series.timeframe, open_time
                    );
                    continue;
                }

                let kline = Self::generate_kline(base_price, series, open_time);
                state.pending_trade = Some(series.symbol.clone());
                return Some((Ok::<Value, GatewayError>(kline), state));
            }
        });

        Ok(Box::new(Box::pin(stream)))
    }
}
