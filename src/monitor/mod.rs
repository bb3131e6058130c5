//! C5 — Change Monitor.
//!
//! A single cooperative loop: poll for PICS changes, enqueue new appids,
//! drain the queue through fetch → extract → persist. Grounded in
//! `original_source/.../steam/pics.py`'s change-watching loop (SPEC_FULL.md
//! §4.5) and, for the surrounding task/shutdown shape, `app/service.rs`'s
//! `main_processing_loop`.

use crate::app::config::MonitorConfig;
use crate::app::health::{HealthState, ModeStatus};
use crate::extractor;
use crate::fetcher::BatchFetcher;
use crate::persister::Persister;
use crate::persister::tag_cache::TagNameCache;
use crate::session::{UpstreamClient, UpstreamSession};
use crate::store::Store;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

/// Bounded, deduplicated FIFO of pending appids. Overflow drops the
/// *newest* arrival — the change itself is silently dropped (§9), not the
/// appid already queued.
struct ChangeQueue {
    deque: VecDeque<u32>,
    processing: HashSet<u32>,
    capacity: usize,
}

impl ChangeQueue {
    fn new(capacity: usize) -> Self {
        Self {
            deque: VecDeque::new(),
            processing: HashSet::new(),
            capacity,
        }
    }

    fn push_back(&mut self, appid: u32) {
        if self.processing.contains(&appid) || self.deque.contains(&appid) {
            return;
        }
        if self.deque.len() >= self.capacity {
            return;
        }
        self.deque.push_back(appid);
    }

    fn drain_batch(&mut self, max: usize) -> Vec<u32> {
        let mut batch = Vec::with_capacity(max.min(self.deque.len()));
        while batch.len() < max {
            let Some(appid) = self.deque.pop_front() else {
                break;
            };
            self.processing.insert(appid);
            batch.push(appid);
        }
        batch
    }

    fn requeue(&mut self, appids: &[u32]) {
        for &appid in appids {
            if self.deque.len() >= self.capacity {
                break;
            }
            self.deque.push_back(appid);
        }
    }

    fn finish(&mut self, appids: &[u32]) {
        for appid in appids {
            self.processing.remove(appid);
        }
    }

    fn len(&self) -> usize {
        self.deque.len()
    }
}

pub struct ChangeMonitor<C: UpstreamClient> {
    session: Arc<UpstreamSession<C>>,
    fetcher: BatchFetcher<C>,
    store: Arc<dyn Store>,
    tag_names: TagNameCache,
    config: MonitorConfig,
    health: HealthState,
    queue: ChangeQueue,
    running: Arc<AtomicBool>,
}

impl<C: UpstreamClient> ChangeMonitor<C> {
    pub fn new(
        session: Arc<UpstreamSession<C>>,
        fetcher: BatchFetcher<C>,
        store: Arc<dyn Store>,
        tag_names: TagNameCache,
        config: MonitorConfig,
        health: HealthState,
    ) -> Self {
        let capacity = config.max_queue_size;
        Self {
            session,
            fetcher,
            store,
            tag_names,
            config,
            health,
            queue: ChangeQueue::new(capacity),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A handle `stop()` can be called on from outside the running loop
    /// (e.g. the shutdown signal handler).
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub async fn run(&mut self) {
        let mut last = self.store.get_last_change_number().await.unwrap_or(0);

        while self.running.load(Ordering::SeqCst) {
            match self.poll_once(last).await {
                Ok(Some(new_last)) => last = new_last,
                Ok(None) => {}
                Err(()) => {
                    if !self.session.is_connected() {
                        match self.session.reconnect(1).await {
                            Ok(true) => tokio::time::sleep(Duration::from_secs(10)).await,
                            _ => tokio::time::sleep(Duration::from_secs(60)).await,
                        }
                    } else {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                    }
                    continue;
                }
            }

            self.process_queue().await;
            self.update_health().await;

            tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
        }

        self.session.disconnect().await;
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Fetches the delta since `last` and enqueues any new appids. Returns
    /// the new cursor value when it advanced.
    async fn poll_once(&mut self, last: u64) -> Result<Option<u64>, ()> {
        let Some(delta) = self.fetcher.get_changes_since(last).await else {
            return Err(());
        };

        if delta.current_change_number <= last {
            return Ok(None);
        }

        for appid in &delta.app_changes {
            self.queue.push_back(*appid);
        }

        self.store.set_last_change_number(delta.current_change_number).await.map_err(|err| {
            warn!(%err, "failed to persist last_change_number");
        })?;

        Ok(Some(delta.current_change_number))
    }

    async fn process_queue(&mut self) {
        let batch = self.queue.drain_batch(self.config.process_batch_size);
        if batch.is_empty() {
            return;
        }

        let result = self.fetch_extract_persist(&batch).await;
        if result.is_err() {
            warn!(batch_size = batch.len(), "change batch failed, re-enqueuing");
            self.queue.requeue(&batch);
        }
        self.queue.finish(&batch);
    }

    async fn fetch_extract_persist(&self, appids: &[u32]) -> Result<(), ()> {
        let raw = self.fetcher.fetch_apps_batch(appids).await.map_err(|err| {
            warn!(%err, "change batch fetch failed");
        })?;

        let extracted: Vec<_> = raw.iter().map(|(appid, record)| extractor::extract(*appid, record)).collect();

        let persister = Persister::new(self.store.as_ref(), &self.tag_names);
        persister.upsert_apps_batch(&extracted).await.map_err(|err| {
            warn!(%err, "change batch persist failed");
        })?;

        Ok(())
    }

    async fn update_health(&self) {
        self.health
            .publish(ModeStatus {
                queue_size: Some(self.queue.len()),
                processing: Some(!self.queue.processing.is_empty()),
                ..Default::default()
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ChangeDelta, MockUpstreamClient};
    use crate::store::{AppRecord, SteamDeckCategory, StoreError};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, AtomicU64};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        existing: HashSet<u32>,
        synced_status: Mutex<Vec<u32>>,
        last_change_number: AtomicU64,
    }

    #[async_trait]
    impl Store for FakeStore {
        async fn get_existing_appids(&self, appids: &[u32]) -> Result<HashSet<u32>, StoreError> {
            Ok(appids.iter().copied().filter(|a| self.existing.contains(a)).collect())
        }
        async fn get_apps_with_storefront_dates(&self, _: &[u32]) -> Result<HashSet<u32>, StoreError> {
            Ok(HashSet::new())
        }
        async fn get_apps_with_storefront_sync(&self, _: &[u32]) -> Result<HashSet<u32>, StoreError> {
            Ok(HashSet::new())
        }
        async fn upsert_apps_chunk(&self, _: &[AppRecord]) -> Result<(), StoreError> {
            Ok(())
        }
        async fn upsert_steam_deck(
            &self,
            _: u32,
            _: SteamDeckCategory,
            _: Option<i64>,
            _: Option<&str>,
            _: Option<&Value>,
        ) -> Result<(), StoreError> {
            Ok(())
        }
        async fn sync_categories(&self, _: u32, _: &[(u32, String)]) -> Result<(), StoreError> {
            Ok(())
        }
        async fn sync_genres(&self, _: u32, _: &[(u32, String, bool)]) -> Result<(), StoreError> {
            Ok(())
        }
        async fn sync_store_tags(&self, _: u32, _: &[(u32, String, usize)]) -> Result<(), StoreError> {
            Ok(())
        }
        async fn upsert_franchise(&self, _: &str) -> Result<i64, StoreError> {
            Ok(1)
        }
        async fn link_franchise(&self, _: u32, _: i64) -> Result<(), StoreError> {
            Ok(())
        }
        async fn sync_dlc(&self, _: u32, _: &[u32]) -> Result<(), StoreError> {
            Ok(())
        }
        async fn batch_update_sync_status(&self, appids: &[u32]) -> Result<(), StoreError> {
            self.synced_status.lock().unwrap().extend_from_slice(appids);
            Ok(())
        }
        async fn update_sync_status_one(&self, appid: u32) -> Result<(), StoreError> {
            self.synced_status.lock().unwrap().push(appid);
            Ok(())
        }
        async fn upsert_tag_name(&self, _: u32, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get_all_app_ids_page(&self, _: u32, _: i64) -> Result<Vec<u32>, StoreError> {
            Ok(Vec::new())
        }
        async fn get_unsynced_app_ids_page(&self, _: u32, _: i64) -> Result<Vec<u32>, StoreError> {
            Ok(Vec::new())
        }
        async fn count_unsynced_apps(&self) -> Result<u64, StoreError> {
            Ok(0)
        }
        async fn get_last_change_number(&self) -> Result<u64, StoreError> {
            Ok(self.last_change_number.load(Ordering::SeqCst))
        }
        async fn set_last_change_number(&self, value: u64) -> Result<(), StoreError> {
            self.last_change_number.store(value, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Scenario: a fresh change delta `{current=105, app_changes=[730,570]}`
    /// arrives over an unchanged cursor of 0, both appids already exist.
    /// Expected: the cursor advances to 105 and both appids end up synced.
    #[tokio::test]
    async fn fresh_change_advances_cursor_and_syncs_both_apps() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);

        let mut client = MockUpstreamClient::new();
        client.expect_anonymous_login().returning(|| Ok(true));
        client
            .expect_subscribe_events()
            .returning(|| tokio::sync::broadcast::channel(1).1);
        client.expect_disconnect().returning(|| ());
        client.expect_get_changes_since().returning(move |_| {
            if cc.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Some(ChangeDelta {
                    current_change_number: 105,
                    app_changes: vec![730, 570],
                }))
            } else {
                // No further changes: same cursor value, empty delta, so
                // `poll_once` takes its `Ok(None)` branch rather than
                // treating the call as a fetch failure.
                Ok(Some(ChangeDelta {
                    current_change_number: 105,
                    app_changes: vec![],
                }))
            }
        });
        client.expect_get_product_info().returning(|appids, _| {
            let mut map = HashMap::new();
            for &appid in appids {
                map.insert(appid, serde_json::json!({"appinfo": {}}));
            }
            Ok(map)
        });

        let session = UpstreamSession::with_default_heartbeat(Arc::new(client));
        session.connect().await.unwrap();
        let fetcher = BatchFetcher::new(Arc::clone(&session));

        let store = Arc::new(FakeStore {
            existing: HashSet::from([730, 570]),
            ..Default::default()
        });
        let tags = TagNameCache::empty();
        let health = HealthState::new("change_monitor");
        let config = MonitorConfig {
            poll_interval_secs: 0,
            process_batch_size: 10,
            max_queue_size: 10,
        };

        let store_dyn: Arc<dyn Store> = Arc::clone(&store);
        let mut monitor = ChangeMonitor::new(session, fetcher, store_dyn, tags, config, health);
        let stop_handle = monitor.stop_handle();

        let run_handle = tokio::spawn(async move { monitor.run().await });

        for _ in 0..200 {
            if store.synced_status.lock().unwrap().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        stop_handle.store(false, Ordering::SeqCst);
        run_handle.await.unwrap();

        assert_eq!(store.last_change_number.load(Ordering::SeqCst), 105);
        let synced = store.synced_status.lock().unwrap();
        assert!(synced.contains(&730));
        assert!(synced.contains(&570));
    }

    #[test]
    fn push_back_deduplicates_pending_and_processing() {
        let mut queue = ChangeQueue::new(10);
        queue.push_back(1);
        queue.push_back(1);
        queue.processing.insert(2);
        queue.push_back(2);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn overflow_drops_newest_arrival() {
        let mut queue = ChangeQueue::new(2);
        queue.push_back(1);
        queue.push_back(2);
        queue.push_back(3);
        assert_eq!(queue.len(), 2);
        assert!(!queue.deque.contains(&3));
    }

    #[test]
    fn drain_batch_moves_items_into_processing() {
        let mut queue = ChangeQueue::new(10);
        queue.push_back(1);
        queue.push_back(2);
        queue.push_back(3);
        let batch = queue.drain_batch(2);
        assert_eq!(batch, vec![1, 2]);
        assert!(queue.processing.contains(&1));
        assert!(queue.processing.contains(&2));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn finish_removes_from_processing() {
        let mut queue = ChangeQueue::new(10);
        queue.push_back(1);
        let batch = queue.drain_batch(1);
        queue.finish(&batch);
        assert!(queue.processing.is_empty());
    }

    #[test]
    fn requeue_respects_capacity() {
        let mut queue = ChangeQueue::new(1);
        queue.push_back(1);
        let batch = queue.drain_batch(1);
        queue.requeue(&batch);
        queue.requeue(&[99]);
        assert_eq!(queue.len(), 1);
    }
}
