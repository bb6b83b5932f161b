use auditor_application::gap_detection::GapDetectorImplParameters;
use auditor_application::scheduler::AuditSchedulerImplParameters;
use auditor_application::services::IngestionServiceImplParameters;
use auditor_application::{
    AuditSchedulerImpl, AuditorConfig, GapDetectorImpl, IngestionServiceImpl,
};
use auditor_infrastructure::audit::RedisGapAuditLogParameters;
use auditor_infrastructure::catalog::StaticPairCatalogParameters;
use auditor_infrastructure::connections::{create_redis_client, RedisConnectionManagerParameters};
use auditor_infrastructure::gateways::MockMarketEventGatewayParameters;
use auditor_infrastructure::repositories::ParquetCandleRepositoryParameters;
use auditor_infrastructure::sources::ParquetRecordSourceParameters;
use auditor_infrastructure::{
    MockMarketEventGateway, ParquetCandleRepository, ParquetRecordSource, RedisConnectionManager,
    RedisGapAuditLog, StaticPairCatalog,
};
use chrono::TimeDelta;
use shaku::module;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

module! {
    pub AppModule {
        components = [
            GapDetectorImpl,
            AuditSchedulerImpl,
            IngestionServiceImpl,
            ParquetCandleRepository,
            ParquetRecordSource,
            RedisConnectionManager,
            RedisGapAuditLog,
            StaticPairCatalog,
            MockMarketEventGateway
        ],
        providers = []
    }
}

/// Shape of the synthetic market feed used by `auditor run`.
#[derive(Debug, Clone, Copy)]
pub struct FeedSettings {
    pub event_interval: Duration,
    pub base_price: f64,
    pub drop_probability: f64,
    /// How far back the feed starts replaying closed klines.
    pub history: TimeDelta,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            event_interval: Duration::from_millis(100),
            base_price: 42_000.0,
            drop_probability: 0.0,
            history: TimeDelta::zero(),
        }
    }
}

pub fn create_app_module(
    config: &AuditorConfig,
    feed: FeedSettings,
) -> Result<AppModule, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.data_dir)?;
    let redis_client = create_redis_client(&config.redis_url)?;

    let module = AppModule::builder()
        .with_component_parameters::<GapDetectorImpl>(GapDetectorImplParameters {
            tolerance_seconds: config.gap_tolerance_seconds,
        })
        .with_component_parameters::<AuditSchedulerImpl>(AuditSchedulerImplParameters {
            settings: config.scheduler.clone(),
        })
        .with_component_parameters::<IngestionServiceImpl>(IngestionServiceImplParameters {
            batch_size: config.ingest_batch_size.max(1),
            flush_interval: config.ingest_flush_interval,
        })
        .with_component_parameters::<ParquetCandleRepository>(ParquetCandleRepositoryParameters {
            output_dir: config.data_dir.clone(),
            files_written: AtomicUsize::new(0),
        })
        .with_component_parameters::<ParquetRecordSource>(ParquetRecordSourceParameters {
            data_dir: config.data_dir.clone(),
        })
        .with_component_parameters::<RedisConnectionManager>(RedisConnectionManagerParameters {
            client: Some(redis_client),
        })
        .with_component_parameters::<RedisGapAuditLog>(RedisGapAuditLogParameters {
            max_entries: config.gap_audit_max_entries.max(1),
        })
        .with_component_parameters::<StaticPairCatalog>(StaticPairCatalogParameters {
            symbols: config.symbols.clone(),
            timeframes: config.timeframes.clone(),
        })
        .with_component_parameters::<MockMarketEventGateway>(MockMarketEventGatewayParameters {
            event_interval: feed.event_interval,
            base_price: feed.base_price,
            drop_probability: feed.drop_probability.clamp(0.0, 1.0),
            timeframes: config.timeframes.clone(),
            history: feed.history,
        })
        .build();

    Ok(module)
}
