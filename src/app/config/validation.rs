use super::{Config, ConfigError};
use url::Url;

impl Config {
    /// Fails fast at startup on a missing required var or a nonsensical
    /// value, per SPEC_FULL.md §7's configuration error policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let store_url = self.store_url()?;
        Url::parse(store_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid SUPABASE_URL '{store_url}': {e}")))?;
        self.store_service_key()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidConfig("PORT must be nonzero".to_string()));
        }

        if self.bulk_batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "BULK_BATCH_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.bulk_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "BULK_TIMEOUT must be greater than 0".to_string(),
            ));
        }

        if self.bulk_max_retries == 0 {
            return Err(ConfigError::InvalidConfig(
                "BULK_MAX_RETRIES must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "POLL_INTERVAL must be greater than 0".to_string(),
            ));
        }

        if self.process_batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "PROCESS_BATCH_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.process_batch_size > self.max_queue_size {
            return Err(ConfigError::InvalidConfig(format!(
                "PROCESS_BATCH_SIZE ({}) must not exceed MAX_QUEUE_SIZE ({})",
                self.process_batch_size, self.max_queue_size
            )));
        }

        if !(60..=600).contains(&self.heartbeat_interval_secs) {
            return Err(ConfigError::InvalidConfig(format!(
                "HEARTBEAT_INTERVAL ({}) must be between 60 and 600",
                self.heartbeat_interval_secs
            )));
        }

        Ok(())
    }
}
