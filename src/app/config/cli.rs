use super::groups::{BulkConfig, MonitorConfig};
use super::serde_helpers::{load_env_string_opt, load_env_var};
use super::{ConfigError, LogLevel, Mode};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Postgres-compatible store URL (required)
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Store service key / password (required)
    #[arg(long, env = "SUPABASE_SERVICE_KEY")]
    pub supabase_service_key: Option<String>,

    /// `bulk_sync` (run C6 once and exit) or `change_monitor` (run C5 forever)
    #[arg(long, env = "MODE", default_value = "change_monitor")]
    pub mode: Mode,

    /// Health HTTP port
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// C6 fetch window size
    #[arg(long, env = "BULK_BATCH_SIZE", default_value = "200")]
    pub bulk_batch_size: usize,

    /// Inter-window delay for C6, in seconds (fractional allowed)
    #[arg(long, env = "BULK_REQUEST_DELAY", default_value = "0.5")]
    pub bulk_request_delay: f64,

    /// C6 per-batch timeout, in seconds
    #[arg(long, env = "BULK_TIMEOUT", default_value = "60")]
    pub bulk_timeout_secs: u64,

    /// C6 per-batch retry budget
    #[arg(long, env = "BULK_MAX_RETRIES", default_value = "5")]
    pub bulk_max_retries: u32,

    /// C5 outer loop period, in seconds
    #[arg(long, env = "POLL_INTERVAL", default_value = "30")]
    pub poll_interval_secs: u64,

    /// C5 drain size per iteration
    #[arg(long, env = "PROCESS_BATCH_SIZE", default_value = "100")]
    pub process_batch_size: usize,

    /// C5 bounded queue capacity
    #[arg(long, env = "MAX_QUEUE_SIZE", default_value = "10000")]
    pub max_queue_size: usize,

    /// C1 heartbeat period, in seconds (clamped to [60, 600] internally)
    #[arg(long, env = "HEARTBEAT_INTERVAL", default_value = "300")]
    pub heartbeat_interval_secs: u64,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines rather than human-readable text
    #[arg(long, env = "LOG_JSON", default_value = "true")]
    pub log_json: bool,

    /// Derived fields (not CLI arguments)
    #[serde(skip)]
    #[arg(skip)]
    pub bulk_request_delay_duration: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub bulk: BulkConfig,

    #[serde(skip)]
    #[arg(skip)]
    pub monitor: MonitorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_service_key: None,
            mode: Mode::ChangeMonitor,
            port: 8080,
            bulk_batch_size: 200,
            bulk_request_delay: 0.5,
            bulk_timeout_secs: 60,
            bulk_max_retries: 5,
            poll_interval_secs: 30,
            process_batch_size: 100,
            max_queue_size: 10_000,
            heartbeat_interval_secs: 300,
            log_level: LogLevel::Info,
            log_json: true,
            bulk_request_delay_duration: Duration::from_millis(500),
            bulk: BulkConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Config::parse_from(args);
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        load_env_string_opt("SUPABASE_URL", &mut config.supabase_url);
        load_env_string_opt("SUPABASE_SERVICE_KEY", &mut config.supabase_service_key);

        if let Ok(mode) = std::env::var("MODE") {
            config.mode = Mode::from_env_value(&mode)?;
        }

        load_env_var("PORT", &mut config.port)?;
        load_env_var("BULK_BATCH_SIZE", &mut config.bulk_batch_size)?;
        load_env_var("BULK_REQUEST_DELAY", &mut config.bulk_request_delay)?;
        load_env_var("BULK_TIMEOUT", &mut config.bulk_timeout_secs)?;
        load_env_var("BULK_MAX_RETRIES", &mut config.bulk_max_retries)?;
        load_env_var("POLL_INTERVAL", &mut config.poll_interval_secs)?;
        load_env_var("PROCESS_BATCH_SIZE", &mut config.process_batch_size)?;
        load_env_var("MAX_QUEUE_SIZE", &mut config.max_queue_size)?;
        load_env_var("HEARTBEAT_INTERVAL", &mut config.heartbeat_interval_secs)?;

        if let Ok(log_level) = std::env::var("LOG_LEVEL") {
            config.log_level = match log_level.to_lowercase().as_str() {
                "error" => LogLevel::Error,
                "warn" => LogLevel::Warn,
                "info" => LogLevel::Info,
                "debug" => LogLevel::Debug,
                "trace" => LogLevel::Trace,
                _ => return Err(ConfigError::EnvError(format!("Invalid LOG_LEVEL: {log_level}"))),
            };
        }
        load_env_var("LOG_JSON", &mut config.log_json)?;

        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_args_and_env<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        // clap's `env` attribute already consults the process environment
        // for any flag not passed on the command line, so parsing args is
        // sufficient here — unlike the forwarder's RASK_CONFIG blob, PICS
        // has no single-variable config bundle to merge in first.
        let mut config = Config::parse_from(args);
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn post_process(&mut self) -> Result<(), ConfigError> {
        self.bulk_request_delay_duration = Duration::from_secs_f64(self.bulk_request_delay.max(0.0));
        self.bulk = BulkConfig {
            batch_size: self.bulk_batch_size,
            request_delay_secs: self.bulk_request_delay,
            timeout_secs: self.bulk_timeout_secs,
            max_retries: self.bulk_max_retries,
        };
        self.monitor = MonitorConfig {
            poll_interval_secs: self.poll_interval_secs,
            process_batch_size: self.process_batch_size,
            max_queue_size: self.max_queue_size,
        };
        Ok(())
    }

    pub fn store_url(&self) -> Result<&str, ConfigError> {
        self.supabase_url
            .as_deref()
            .ok_or_else(|| ConfigError::InvalidConfig("SUPABASE_URL is required".to_string()))
    }

    pub fn store_service_key(&self) -> Result<&str, ConfigError> {
        self.supabase_service_key
            .as_deref()
            .ok_or_else(|| ConfigError::InvalidConfig("SUPABASE_SERVICE_KEY is required".to_string()))
    }
}
