use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use shaku::{Component, Interface};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerSettings;
use crate::gap_detection::GapDetector;
use crate::ports::{AuditPair, CatalogError, PairCatalog};

#[async_trait]
pub trait AuditScheduler: Interface {
    /// Audits every catalogued pair once over the trailing window.
    async fn run_cycle(&self) -> Result<AuditCycleReport, AuditCycleError>;

    /// Runs cycles until `shutdown` flips to `true` or its sender is dropped.
    async fn run(&self, shutdown: watch::Receiver<bool>);
}

#[derive(Component)]
#[shaku(interface = AuditScheduler)]
pub struct AuditSchedulerImpl {
    #[shaku(inject)]
    detector: Arc<dyn GapDetector>,

    #[shaku(inject)]
    catalog: Arc<dyn PairCatalog>,

    #[shaku(default)]
    settings: SchedulerSettings,
}

impl AuditSchedulerImpl {
    pub fn new(
        detector: Arc<dyn GapDetector>,
        catalog: Arc<dyn PairCatalog>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            detector,
            catalog,
            settings,
        }
    }

    async fn audit_pair(
        &self,
        pair: AuditPair,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PairOutcome {
        match self
            .detector
            .detect_gaps(&pair.symbol, &pair.timeframe, start, end)
            .await
        {
            Ok(gaps) => {
                if !gaps.is_empty() {
                    warn!("Found {} gaps for {} {}", gaps.len(), pair.symbol, pair.timeframe);
                }
                let actionable = gaps
                    .iter()
                    .filter(|gap| gap.is_at_least(self.settings.min_gap_size_seconds))
                    .count();
                PairOutcome::Audited {
                    gaps: gaps.len(),
                    actionable,
                }
            }
            Err(e) => {
                error!("Error auditing {} {}: {}", pair.symbol, pair.timeframe, e);
                PairOutcome::Failed
            }
        }
    }
}

#[async_trait]
impl AuditScheduler for AuditSchedulerImpl {
    async fn run_cycle(&self) -> Result<AuditCycleReport, AuditCycleError> {
        info!("Starting audit cycle");
        let started = Instant::now();

        let pairs = self.catalog.pairs().await?;

        let end = Utc::now();
        let start = end - self.settings.lookback;
        let concurrency = self.settings.max_concurrent_pairs.max(1);

        let mut pending = pairs.into_iter();
        let mut in_flight = FuturesUnordered::new();
        for pair in pending.by_ref().take(concurrency) {
            in_flight.push(self.audit_pair(pair, start, end));
        }

        let mut report = AuditCycleReport::default();
        while let Some(outcome) = in_flight.next().await {
            report.record(outcome);
            if let Some(pair) = pending.next() {
                in_flight.push(self.audit_pair(pair, start, end));
            }
        }
        report.duration = started.elapsed();

        info!(
            "Audit cycle complete: audited={}, failed={}, gaps={}, actionable={}, duration={:.1}s",
            report.pairs_audited,
            report.pairs_failed,
            report.total_gaps,
            report.actionable_gaps,
            report.duration.as_secs_f64()
        );

        Ok(report)
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Audit scheduler started");

        loop {
            let stop = *shutdown.borrow();
            if stop {
                break;
            }

            let delay = match self.run_cycle().await {
                Ok(_) => self.settings.audit_interval,
                Err(e) => {
                    error!("Error in audit scheduler: {}", e);
                    self.settings.retry_delay
                }
            };

            debug!("Next audit cycle in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        info!("Audit scheduler stopped");
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop || shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditCycleReport {
    pub pairs_audited: usize,
    pub pairs_failed: usize,
    pub total_gaps: usize,
    pub actionable_gaps: usize,
    pub duration: Duration,
}

impl AuditCycleReport {
    fn record(&mut self, outcome: PairOutcome) {
        match outcome {
            PairOutcome::Audited { gaps, actionable } => {
                self.pairs_audited += 1;
                self.total_gaps += gaps;
                self.actionable_gaps += actionable;
            }
            PairOutcome::Failed => self.pairs_failed += 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditCycleError {
    #[error("Catalog error: {0}")]
    CatalogError(#[from] CatalogError),
}

enum PairOutcome {
    Audited { gaps: usize, actionable: usize },
    Failed,
}
