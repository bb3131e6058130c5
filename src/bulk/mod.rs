//! C6 — Bulk Backfill.
//!
//! One-shot worker: enumerates every app with no recorded PICS sync via
//! keyset pagination over `sync_status`, then streams each page through
//! C2 → C3 → C4. Grounded in `original_source/.../steam/pics.py`'s bulk
//! backfill entry point (SPEC_FULL.md §4.6) and, for the page/stream shape,
//! `store::PgStore`'s own keyset pagination helpers.

use crate::app::health::{HealthState, ModeStatus};
use crate::extractor;
use crate::fetcher::BatchFetcher;
use crate::persister::Persister;
use crate::persister::tag_cache::TagNameCache;
use crate::session::{UpstreamClient, UpstreamSession};
use crate::store::{PAGE_SIZE, Store};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct BackfillSummary {
    pub processed: u64,
    pub failed: u64,
    pub elapsed: Duration,
}

pub struct BulkBackfill<C: UpstreamClient> {
    session: Arc<UpstreamSession<C>>,
    fetcher: BatchFetcher<C>,
    store: Arc<dyn Store>,
    tag_names: TagNameCache,
    health: HealthState,
}

impl<C: UpstreamClient> BulkBackfill<C> {
    pub fn new(
        session: Arc<UpstreamSession<C>>,
        fetcher: BatchFetcher<C>,
        store: Arc<dyn Store>,
        tag_names: TagNameCache,
        health: HealthState,
    ) -> Self {
        Self {
            session,
            fetcher,
            store,
            tag_names,
            health,
        }
    }

    /// Runs the backfill to completion, disconnecting the session on the
    /// way out regardless of how it ends.
    pub async fn run(&self) -> BackfillSummary {
        let started = Instant::now();
        let total = self.store.count_unsynced_apps().await.unwrap_or(0);

        let mut summary = BackfillSummary::default();
        let mut after: u32 = 0;

        loop {
            let page = match self.store.get_unsynced_app_ids_page(after, PAGE_SIZE).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(%err, "failed to page unsynced appids, stopping backfill");
                    break;
                }
            };

            if page.is_empty() {
                break;
            }
            after = *page.last().expect("checked non-empty above");
            let page_len = page.len();

            let failed_windows = self
                .fetcher
                .fetch_all_apps(&page, |raw| async {
                    let extracted: Vec<_> =
                        raw.iter().map(|(appid, record)| extractor::extract(*appid, record)).collect();
                    let persister = Persister::new(self.store.as_ref(), &self.tag_names);
                    match persister.upsert_apps_batch(&extracted).await {
                        Ok(outcome) => {
                            summary_add(&mut summary, outcome.created_or_updated as u64, outcome.failed as u64);
                        }
                        Err(err) => {
                            warn!(%err, batch_size = extracted.len(), "backfill batch persist failed");
                            summary_add(&mut summary, 0, extracted.len() as u64);
                        }
                    }
                })
                .await;

            for window in &failed_windows {
                summary.failed += window.appids.len() as u64;
            }

            self.publish_progress(&summary, total, started.elapsed()).await;

            if (page_len as i64) < PAGE_SIZE {
                break;
            }
        }

        self.session.disconnect().await;
        summary.elapsed = started.elapsed();
        info!(
            processed = summary.processed,
            failed = summary.failed,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "bulk backfill complete"
        );
        summary
    }

    async fn publish_progress(&self, summary: &BackfillSummary, total: u64, elapsed: Duration) {
        let done = summary.processed + summary.failed;
        let progress_pct = if total > 0 { Some((done as f64 / total as f64) * 100.0) } else { None };
        let rate = if elapsed.as_secs_f64() > 0.0 { Some(done as f64 / elapsed.as_secs_f64()) } else { None };

        self.health
            .publish(ModeStatus {
                processed: Some(summary.processed),
                failed: Some(summary.failed),
                rate,
                progress_pct,
                ..Default::default()
            })
            .await;
    }
}

fn summary_add(summary: &mut BackfillSummary, processed: u64, failed: u64) {
    summary.processed += processed;
    summary.failed += failed;
}
