pub mod redis;

pub use self::redis::{gap_log_key, RedisGapAuditLog, RedisGapAuditLogParameters, GAP_DATASETS_KEY};
