pub mod config;
pub mod gap_detection;
pub mod ports;
pub mod routing;
pub mod scheduler;
pub mod services;

pub use config::{checked_tolerance, AuditorConfig, ConfigError, SchedulerSettings};
pub use gap_detection::{GapDetectionError, GapDetector, GapDetectorImpl};
pub use ports::{
    AuditPair, CandleRepository, CatalogError, EventStream, GapSink, GatewayError,
    MarketEventGateway, PairCatalog, RecordSource, RepositoryError, SinkError, SourceError,
};
pub use routing::{MessageRouter, RouteOutcome, RouterStats, SkipReason};
pub use scheduler::{AuditCycleError, AuditCycleReport, AuditScheduler, AuditSchedulerImpl};
pub use services::{IngestionError, IngestionService, IngestionServiceImpl};
