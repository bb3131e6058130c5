use serde::{Deserialize, Serialize};

/// Bulk backfill (C6) tunables, split out of [`super::Config`] so
/// `bulk::BulkBackfill` can be constructed from just this group in tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkConfig {
    pub batch_size: usize,
    pub request_delay_secs: f64,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            request_delay_secs: 0.5,
            timeout_secs: 60,
            max_retries: 5,
        }
    }
}

/// Change monitor (C5) tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    pub process_batch_size: usize,
    pub max_queue_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            process_batch_size: 100,
            max_queue_size: 10_000,
        }
    }
}
