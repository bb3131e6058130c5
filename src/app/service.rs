//! Top-level wiring: builds every component from a validated [`Config`] and
//! dispatches between the two run modes. Grounded in the teacher's own
//! `ServiceManager`/`ShutdownHandle`/`SignalHandler` shape (initialize →
//! start → background task → graceful shutdown), adapted from a single
//! collector/buffer/sender pipeline to PICS's session/fetcher/monitor/bulk
//! pipeline, and in `original_source/.../main.py` for the bulk-vs-monitor
//! mode dispatch itself.

use super::Config;
use super::config::Mode;
use super::health::{self, HealthState};
pub use super::shutdown::{ShutdownHandle, SignalHandler};
use crate::bulk::BulkBackfill;
use crate::fetcher::BatchFetcher;
use crate::monitor::ChangeMonitor;
use crate::persister::tag_cache::TagNameCache;
use crate::session::{UnimplementedUpstreamClient, UpstreamClient, UpstreamSession};
use crate::store::{PgStore, Store};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tracing::{info, warn};
use url::Url;

/// The Steam storefront's tag-data host. Not a tunable: the original
/// reference implementation hardcodes this too (`STEAM_TAGS_URL`).
const TAG_PLATFORM_BASE_URL: &str = "https://store.steampowered.com";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("database connection error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("service already running")]
    AlreadyRunning,
    #[error("shutdown timeout")]
    ShutdownTimeout,
}

pub struct ServiceManager<C: UpstreamClient = UnimplementedUpstreamClient> {
    config: Config,
    store: Arc<dyn Store>,
    session: Arc<UpstreamSession<C>>,
    fetcher: BatchFetcher<C>,
    tag_names: TagNameCache,
    health: HealthState,
    running: Arc<RwLock<bool>>,
    shutdown_tx: Option<mpsc::UnboundedSender<()>>,
}

impl ServiceManager<UnimplementedUpstreamClient> {
    pub async fn new(config: Config) -> Result<Self, ServiceError> {
        Self::with_client(config, Arc::new(UnimplementedUpstreamClient::new())).await
    }
}

impl<C: UpstreamClient> ServiceManager<C> {
    /// Builds every component against an injected upstream client. The
    /// default [`ServiceManager::new`] wires in the unimplemented
    /// placeholder; a production deployment substitutes its own client here.
    pub async fn with_client(config: Config, client: Arc<C>) -> Result<Self, ServiceError> {
        config.validate()?;

        let pool = connect_pool(config.store_url()?, config.store_service_key()?).await?;
        let store: Arc<dyn Store> = Arc::new(PgStore::new(pool).await?);

        let session = UpstreamSession::new(client, Duration::from_secs(config.heartbeat_interval_secs));

        let fetcher = BatchFetcher::new(Arc::clone(&session))
            .with_batch_size(config.bulk_batch_size)
            .with_request_delay(config.bulk_request_delay_duration)
            .with_timeout(Duration::from_secs(config.bulk_timeout_secs))
            .with_max_retries(config.bulk_max_retries);

        let tag_names = TagNameCache::empty();
        tag_names.populate(TAG_PLATFORM_BASE_URL).await;

        let health = HealthState::new(mode_name(config.mode));

        Ok(Self {
            config,
            store,
            session,
            fetcher,
            tag_names,
            health,
            running: Arc::new(RwLock::new(false)),
            shutdown_tx: None,
        })
    }

    pub async fn start(&mut self) -> Result<ShutdownHandle, ServiceError> {
        if *self.running.read().await {
            return Err(ServiceError::AlreadyRunning);
        }

        info!(mode = mode_name(self.config.mode), "starting pics-sync-service components");

        match self.session.connect().await {
            Ok(true) => info!("upstream session connected"),
            Ok(false) => warn!("upstream login rejected at startup"),
            Err(err) => warn!(%err, "upstream connect failed at startup, will retry lazily"),
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel();
        self.shutdown_tx = Some(shutdown_tx.clone());
        *self.running.write().await = true;

        tokio::spawn(health::serve(self.config.port, self.health.clone()));

        match self.config.mode {
            Mode::ChangeMonitor => {
                let mut monitor = ChangeMonitor::new(
                    Arc::clone(&self.session),
                    self.clone_fetcher(),
                    Arc::clone(&self.store),
                    self.tag_names.clone(),
                    self.config.monitor.clone(),
                    self.health.clone(),
                );
                let stop_handle = monitor.stop_handle();
                let running = Arc::clone(&self.running);

                tokio::spawn(async move {
                    monitor.run().await;
                    *running.write().await = false;
                });
                tokio::spawn(async move {
                    if shutdown_rx.recv().await.is_some() {
                        stop_handle.store(false, Ordering::SeqCst);
                    }
                });
            }
            Mode::BulkSync => {
                let bulk = BulkBackfill::new(
                    Arc::clone(&self.session),
                    self.clone_fetcher(),
                    Arc::clone(&self.store),
                    self.tag_names.clone(),
                    self.health.clone(),
                );
                let running = Arc::clone(&self.running);
                let self_shutdown = shutdown_tx.clone();

                tokio::spawn(async move {
                    let summary = bulk.run().await;
                    info!(
                        processed = summary.processed,
                        failed = summary.failed,
                        "bulk backfill run finished, shutting down"
                    );
                    let _ = self_shutdown.send(());
                    *running.write().await = false;
                });
                // Nothing external enqueues a shutdown for bulk mode; drop
                // the unused receiver so the channel doesn't leak a task.
                drop(shutdown_rx);
            }
        }

        let signal_handler = SignalHandler::new(shutdown_tx.clone()).await;

        info!("pics-sync-service components started");
        Ok(ShutdownHandle::new(shutdown_tx, signal_handler, Arc::clone(&self.running)))
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// `BatchFetcher` has no `Clone` derive (it owns only a session handle
    /// and scalar tunables), so rebuild one sharing the same session and
    /// settings for whichever mode task needs it.
    fn clone_fetcher(&self) -> BatchFetcher<C> {
        BatchFetcher::new(Arc::clone(&self.session))
            .with_batch_size(self.config.bulk_batch_size)
            .with_request_delay(self.config.bulk_request_delay_duration)
            .with_timeout(Duration::from_secs(self.config.bulk_timeout_secs))
            .with_max_retries(self.config.bulk_max_retries)
    }
}

fn mode_name(mode: Mode) -> &'static str {
    match mode {
        Mode::BulkSync => "bulk_sync",
        Mode::ChangeMonitor => "change_monitor",
    }
}

/// Supabase projects expose a direct Postgres connection string alongside
/// their REST API; this service talks to it over `sqlx` rather than through
/// the REST/service-role-key surface the original reference implementation
/// used (no idiomatic Rust equivalent of that client exists in this
/// codebase's lineage). `SUPABASE_SERVICE_KEY` is layered in as the
/// connection password when the URL doesn't already carry one.
async fn connect_pool(url: &str, service_key: &str) -> Result<sqlx::PgPool, sqlx::Error> {
    let mut options = PgConnectOptions::from_str(url)?;
    let url_has_password = Url::parse(url).ok().is_some_and(|u| !u.password().unwrap_or("").is_empty());
    if !url_has_password {
        options = options.password(service_key);
    }
    PgPoolOptions::new().max_connections(10).connect_with(options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_name_matches_config_variants() {
        assert_eq!(mode_name(Mode::BulkSync), "bulk_sync");
        assert_eq!(mode_name(Mode::ChangeMonitor), "change_monitor");
    }

    #[tokio::test]
    async fn with_client_rejects_invalid_config_before_touching_store() {
        let config = Config {
            supabase_url: None,
            supabase_service_key: Some("secret".to_string()),
            ..Config::default()
        };
        let client = Arc::new(UnimplementedUpstreamClient::new());

        let err = ServiceManager::with_client(config, client).await.unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }
}
