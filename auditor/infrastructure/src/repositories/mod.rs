pub mod parquet;
pub mod schema;

pub use self::parquet::{ParquetCandleRepository, ParquetCandleRepositoryParameters};
pub use schema::{candle_schema, candles_to_record_batch, record_batch_to_candles, SchemaError};
