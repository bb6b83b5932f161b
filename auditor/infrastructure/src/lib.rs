pub mod audit;
pub mod catalog;
pub mod connections;
pub mod gateways;
pub mod repositories;
pub mod sources;

pub use audit::RedisGapAuditLog;
pub use catalog::StaticPairCatalog;
pub use connections::{RedisConnection, RedisConnectionManager};
pub use gateways::MockMarketEventGateway;
pub use repositories::ParquetCandleRepository;
pub use sources::ParquetRecordSource;
