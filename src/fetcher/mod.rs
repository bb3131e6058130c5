//! C2 — Batch Fetcher.
//!
//! Pulls raw PICS records for appid batches over C1's session, with
//! per-batch retry and a windowed streaming entry point for large id sets.
//! Grounded in `original_source/.../steam/pics.py` (`PICSFetcher`) for the
//! exact retry/window semantics, and in `reliability/retry.rs`'s backoff
//! shape (minus jitter, which the upstream reference does not apply here).

mod error;

pub use error::FetchError;

use crate::backoff;
use crate::session::{ChangeDelta, RawAppRecord, UpstreamClient, UpstreamSession};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const FETCH_BASE_DELAY: Duration = Duration::from_secs(2);
const FETCH_MAX_DELAY: Duration = Duration::from_secs(32);
const WINDOW_FAILURE_DELAY: Duration = Duration::from_secs(2);

pub const DEFAULT_BATCH_SIZE: usize = 200;
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// One failed window from a `fetch_all_apps` run: the appids it covered.
#[derive(Debug, Clone)]
pub struct FailedWindow {
    pub appids: Vec<u32>,
}

pub struct BatchFetcher<C: UpstreamClient> {
    session: Arc<UpstreamSession<C>>,
    batch_size: usize,
    request_delay: Duration,
    timeout: Duration,
    max_retries: u32,
}

impl<C: UpstreamClient> BatchFetcher<C> {
    pub fn new(session: Arc<UpstreamSession<C>>) -> Self {
        Self {
            session,
            batch_size: DEFAULT_BATCH_SIZE,
            request_delay: DEFAULT_REQUEST_DELAY,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_request_delay(mut self, request_delay: Duration) -> Self {
        self.request_delay = request_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Fetches one batch of appids, reconnecting first if disconnected and
    /// retrying transient failures with a 2/4/8/16/32s doubling backoff.
    pub async fn fetch_apps_batch(
        &self,
        appids: &[u32],
    ) -> Result<HashMap<u32, RawAppRecord>, FetchError> {
        if !self.session.is_connected() {
            let reconnected = self
                .session
                .reconnect(1)
                .await
                .unwrap_or(false);
            if !reconnected {
                return Err(FetchError::Unavailable);
            }
        }

        let mut attempt: u32 = 0;
        loop {
            match self
                .session
                .client()
                .get_product_info(appids, self.timeout)
                .await
            {
                Ok(records) => return Ok(records),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        return Err(FetchError::RetriesExhausted(err.to_string()));
                    }
                    let delay = backoff::exponential_delay(attempt, FETCH_BASE_DELAY, FETCH_MAX_DELAY);
                    warn!(attempt, ?delay, %err, "batch fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Iterates `appids` in `batch_size` windows, yielding each fetched
    /// batch through `on_batch`. Window failures are logged and recorded
    /// but not retried here — the caller re-enqueues failed appids.
    /// Returns the windows that failed outright.
    pub async fn fetch_all_apps<F, Fut>(
        &self,
        appids: &[u32],
        mut on_batch: F,
    ) -> Vec<FailedWindow>
    where
        F: FnMut(HashMap<u32, RawAppRecord>) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut failed = Vec::new();

        for window in appids.chunks(self.batch_size.max(1)) {
            match self.fetch_apps_batch(window).await {
                Ok(batch) => {
                    on_batch(batch).await;
                    tokio::time::sleep(self.request_delay).await;
                }
                Err(err) => {
                    warn!(window_size = window.len(), %err, "fetch window failed");
                    failed.push(FailedWindow {
                        appids: window.to_vec(),
                    });
                    tokio::time::sleep(WINDOW_FAILURE_DELAY).await;
                }
            }
        }

        if !failed.is_empty() {
            info!(
                failed_windows = failed.len(),
                failed_appids = failed.iter().map(|w| w.appids.len()).sum::<usize>(),
                "fetch_all_apps completed with failed windows"
            );
        }

        failed
    }

    /// Never throws: upstream errors are swallowed and surfaced as `None`.
    pub async fn get_changes_since(&self, since: u64) -> Option<ChangeDelta> {
        self.session
            .client()
            .get_changes_since(since)
            .await
            .unwrap_or(None)
    }
}
