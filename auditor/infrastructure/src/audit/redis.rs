use std::sync::Arc;

use async_trait::async_trait;
use auditor_application::ports::{GapSink, SinkError};
use auditor_domain::GapAuditEntry;
use lazy_static::lazy_static;
use redis::Script;
use shaku::Component;
use tracing::debug;

use crate::connections::redis::RedisConnection;

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Set of dataset ids that have at least one logged gap.
pub const GAP_DATASETS_KEY: &str = "audit:gaps:datasets";

lazy_static! {
    // KEYS[1] = per-dataset list, KEYS[2] = dataset index
    // ARGV[1] = entry json, ARGV[2] = max entries, ARGV[3] = dataset id
    static ref APPEND_GAP_SCRIPT: Script = Script::new(
        r#"
        redis.call('LPUSH', KEYS[1], ARGV[1])
        redis.call('LTRIM', KEYS[1], 0, tonumber(ARGV[2]) - 1)
        redis.call('SADD', KEYS[2], ARGV[3])
        return redis.call('LLEN', KEYS[1])
    "#
    );
}

pub fn gap_log_key(dataset_id: &str) -> String {
    format!("audit:gaps:{}", dataset_id)
}

/// Gap sink backed by a capped Redis list per dataset, newest entry first.
#[derive(Component)]
#[shaku(interface = GapSink)]
pub struct RedisGapAuditLog {
    #[shaku(inject)]
    redis: Arc<dyn RedisConnection>,
    #[shaku(default = DEFAULT_MAX_ENTRIES)]
    max_entries: usize,
}

impl RedisGapAuditLog {
    pub fn new(redis: Arc<dyn RedisConnection>, max_entries: usize) -> Self {
        Self {
            redis,
            max_entries: max_entries.max(1),
        }
    }
}

#[async_trait]
impl GapSink for RedisGapAuditLog {
    async fn log_gap(&self, entry: &GapAuditEntry) -> Result<(), SinkError> {
        let payload = serde_json::to_string(entry)
            .map_err(|e| SinkError::SinkWriteFailed(format!("serialize entry: {}", e)))?;

        let mut conn = self
            .redis
            .get_connection()
            .await
            .map_err(|e| SinkError::SinkWriteFailed(e.to_string()))?;

        let mut script_invocation = APPEND_GAP_SCRIPT.prepare_invoke();
        script_invocation
            .key(gap_log_key(&entry.dataset_id))
            .key(GAP_DATASETS_KEY)
            .arg(payload)
            .arg(self.max_entries)
            .arg(&entry.dataset_id);

        let length: i64 = script_invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| SinkError::SinkWriteFailed(e.to_string()))?;

        debug!(
            dataset_id = %entry.dataset_id,
            entry_id = %entry.id,
            severity = %entry.severity,
            "Gap logged, {} entries retained",
            length
        );
        Ok(())
    }
}
