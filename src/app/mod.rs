pub mod config;
pub mod health;
pub mod initialization;
pub mod logging_system;
pub mod service;
pub mod shutdown;

pub use config::{Config, ConfigError, LogLevel};
pub use logging_system::{LoggingSystem, setup_logging_safe};
pub use service::{ServiceError, ServiceManager};
pub use shutdown::ShutdownHandle;

use std::process;
use tracing::{error, info};

/// Top-level application: owns the service manager and drives it to
/// completion or shutdown. Built once `main` has parsed its config.
pub struct App {
    service_manager: ServiceManager,
}

impl App {
    pub async fn from_args<I, T>(args: I) -> Result<Self, Box<dyn std::error::Error + Send + Sync>>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args_and_env(args)?;
        Self::from_config(config).await
    }

    pub async fn from_config(
        config: Config,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        setup_logging_safe(config.log_level, config.log_json)?;
        info!("starting pics-sync-service v{}", env!("CARGO_PKG_VERSION"));
        let service_manager = ServiceManager::new(config).await?;
        Ok(Self { service_manager })
    }

    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let shutdown_handle = self.service_manager.start().await?;
        info!("pics-sync-service is running");
        shutdown_handle.wait_for_shutdown().await;
        info!("pics-sync-service stopped");
        Ok(())
    }
}

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && (args[1] == "--version" || args[1] == "-V") {
        println!("pics-sync-service {}", get_version());
        return Ok(());
    }

    match App::from_args(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("application error: {}", e);
                process::exit(1);
            }
        }
        Err(e) => {
            error!("configuration error: {}", e);
            process::exit(1);
        }
    }

    Ok(())
}
