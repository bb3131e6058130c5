//! C1 — Upstream Session.
//!
//! Holds the single connection to the upstream platform: connect/reconnect/
//! disconnect, a heartbeat that keeps the server-side session alive, and
//! the connection-state flags every other component reads. Grounded in
//! `collector/docker.rs`'s connection-lifecycle shape (connect, background
//! streaming task, ping) and in SPEC_FULL.md §4.1 for the exact timing.

mod client;
mod error;

pub use client::{ChangeDelta, RawAppRecord, UnimplementedUpstreamClient, UpstreamClient, UpstreamEvent};
pub use error::SessionError;

#[cfg(test)]
pub use client::MockUpstreamClient;

use crate::backoff;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const HEARTBEAT_MIN: Duration = Duration::from_secs(60);
const HEARTBEAT_MAX: Duration = Duration::from_secs(600);
const HEARTBEAT_DEFAULT: Duration = Duration::from_secs(300);

const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(5);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(300);
const RECONNECT_RESET_AFTER: u32 = 10;
const RECONNECT_SETTLING_DELAY: Duration = Duration::from_secs(2);

/// Owns the upstream connection's lifecycle. One instance per process;
/// shared (via `Arc`) by the fetcher, change monitor, and bulk backfill.
pub struct UpstreamSession<C: UpstreamClient> {
    client: Arc<C>,
    heartbeat_interval: Duration,

    connected: AtomicBool,
    auto_reconnect: AtomicBool,
    reconnecting: AtomicBool,
    reconnect_attempts: AtomicU32,
    last_change_number: AtomicU64,
    connected_since: Mutex<Option<Instant>>,

    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl<C: UpstreamClient> UpstreamSession<C> {
    /// `heartbeat_interval` is clamped to `[60, 600]` seconds per SPEC_FULL.md §4.1.
    pub fn new(client: Arc<C>, heartbeat_interval: Duration) -> Arc<Self> {
        let heartbeat_interval = heartbeat_interval.clamp(HEARTBEAT_MIN, HEARTBEAT_MAX);
        Arc::new(Self {
            client,
            heartbeat_interval,
            connected: AtomicBool::new(false),
            auto_reconnect: AtomicBool::new(true),
            reconnecting: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            last_change_number: AtomicU64::new(0),
            connected_since: Mutex::new(None),
            heartbeat_task: Mutex::new(None),
            watch_task: Mutex::new(None),
        })
    }

    pub fn with_default_heartbeat(client: Arc<C>) -> Arc<Self> {
        Self::new(client, HEARTBEAT_DEFAULT)
    }

    /// Opens a single anonymous session. Spawns the heartbeat task and the
    /// disconnect-event watcher on success.
    pub async fn connect(self: &Arc<Self>) -> Result<bool, SessionError> {
        let ok = self.client.anonymous_login().await?;
        if !ok {
            return Ok(false);
        }

        self.connected.store(true, Ordering::SeqCst);
        self.auto_reconnect.store(true, Ordering::SeqCst);
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        *self.connected_since.lock().await = Some(Instant::now());

        self.spawn_heartbeat();
        self.spawn_event_watcher();

        info!("connected to upstream platform");
        Ok(true)
    }

    /// Attempts to reconnect with exponential backoff starting at 5s,
    /// doubling each attempt, clamped at 300s. `max_attempts = 0` means
    /// unlimited. After 10 failed attempts the counter resets so the
    /// backoff does not grow without bound.
    pub async fn reconnect(self: &Arc<Self>, max_attempts: u32) -> Result<bool, SessionError> {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            // Another reconnect is already in flight; don't race it.
            return Ok(self.is_connected());
        }

        let result = self.reconnect_loop(max_attempts).await;
        self.reconnecting.store(false, Ordering::SeqCst);
        result
    }

    async fn reconnect_loop(self: &Arc<Self>, max_attempts: u32) -> Result<bool, SessionError> {
        let mut attempt: u32 = 0;
        loop {
            if max_attempts != 0 && attempt >= max_attempts {
                return Err(SessionError::ReconnectExhausted);
            }
            attempt += 1;

            let local_attempts = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let schedule_attempt = if local_attempts > RECONNECT_RESET_AFTER {
                self.reconnect_attempts.store(1, Ordering::SeqCst);
                1
            } else {
                local_attempts
            };

            let delay = backoff::exponential_delay(schedule_attempt, RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY);
            info!(attempt, ?delay, "reconnecting to upstream platform");
            tokio::time::sleep(delay).await;

            self.client.disconnect().await;

            match self.client.anonymous_login().await {
                Ok(true) => {
                    self.connected.store(true, Ordering::SeqCst);
                    self.reconnect_attempts.store(0, Ordering::SeqCst);
                    *self.connected_since.lock().await = Some(Instant::now());
                    self.spawn_heartbeat();
                    info!("reconnected to upstream platform");
                    return Ok(true);
                }
                Ok(false) | Err(_) => {
                    warn!(attempt, "reconnect attempt failed");
                }
            }
        }
    }

    /// Disables auto-reconnect, stops the heartbeat, and closes the
    /// connection. Terminal: the session will not re-establish itself
    /// after this call.
    pub async fn disconnect(self: &Arc<Self>) {
        self.auto_reconnect.store(false, Ordering::SeqCst);
        if let Some(handle) = self.heartbeat_task.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.watch_task.lock().await.take() {
            handle.abort();
        }
        self.client.disconnect().await;
        self.connected.store(false, Ordering::SeqCst);
        *self.connected_since.lock().await = None;
        info!("disconnected from upstream platform");
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn last_change_number(&self) -> u64 {
        self.last_change_number.load(Ordering::SeqCst)
    }

    pub fn set_last_change_number(&self, value: u64) {
        self.last_change_number.store(value, Ordering::SeqCst);
    }

    pub async fn connection_age_seconds(&self) -> u64 {
        match *self.connected_since.lock().await {
            Some(since) => since.elapsed().as_secs(),
            None => 0,
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    fn spawn_heartbeat(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let interval = self.heartbeat_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if !this.connected.load(Ordering::SeqCst) {
                    return;
                }
                // "changes since 0, apps off, packages off" — a lightweight
                // call that exists solely to keep the server-side session
                // alive. Failures log but never trigger reconnection; only
                // the server's own disconnect event does that.
                if let Err(err) = this.client.get_changes_since(0).await {
                    warn!(%err, "heartbeat call failed");
                }
            }
        });
        // Replacing any previous handle is a non-event in practice (only
        // called right after (re)connect), but avoid leaking a task handle.
        if let Ok(mut slot) = self.heartbeat_task.try_lock() {
            if let Some(old) = slot.replace(handle) {
                old.abort();
            }
        }
    }

    fn spawn_event_watcher(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let mut events = self.client.subscribe_events();
        let handle = tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    UpstreamEvent::Disconnected => this.on_disconnected().await,
                    UpstreamEvent::Error(msg) => warn!(error = %msg, "upstream client error"),
                }
            }
        });
        if let Ok(mut slot) = self.watch_task.try_lock() {
            if let Some(old) = slot.replace(handle) {
                old.abort();
            }
        }
    }

    async fn on_disconnected(self: &Arc<Self>) {
        self.connected.store(false, Ordering::SeqCst);
        warn!("disconnected from upstream platform");

        if !self.auto_reconnect.load(Ordering::SeqCst) {
            return;
        }
        if self.reconnecting.load(Ordering::SeqCst) {
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(RECONNECT_SETTLING_DELAY).await;
            if let Err(err) = this.reconnect(0).await {
                warn!(%err, "auto-reconnect failed");
            }
        });
    }
}
