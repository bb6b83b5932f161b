pub mod parquet;

pub use self::parquet::{ParquetRecordSource, ParquetRecordSourceParameters};
