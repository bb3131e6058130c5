//! C4 — Persister.
//!
//! Turns a batch of [`ExtractedApp`] values into rows in the store, honoring
//! the source-authority precedence rules in SPEC_FULL.md §4.4.1 so the
//! storefront (not PICS) stays the source of truth for release dates and
//! free/released flags once it has spoken. Grounded in
//! `original_source/.../database/operations.py`'s `PICSDatabase.upsert_apps_batch`
//! and its private `_sync_*` helpers.

mod error;
pub mod lookup;
pub mod tag_cache;
pub mod type_inference;

pub use error::PersistError;

use crate::domain::{AssociationKind, ExtractedApp};
use crate::store::{AppRecord, SteamDeckCategory, Store};
use std::collections::HashSet;
use tag_cache::TagNameCache;
use tracing::{error, warn};

pub const UPSERT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct UpsertOutcome {
    pub created_or_updated: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct Persister<'a> {
    store: &'a dyn Store,
    tag_names: &'a TagNameCache,
}

impl<'a> Persister<'a> {
    pub fn new(store: &'a dyn Store, tag_names: &'a TagNameCache) -> Self {
        Self { store, tag_names }
    }

    /// Implements the full §4.4.1 contract for a batch of at most a few
    /// thousand apps (the caller chunks further upstream if needed; this
    /// function itself chunks the actual writes at [`UPSERT_BATCH_SIZE`]).
    pub async fn upsert_apps_batch(&self, apps: &[ExtractedApp]) -> Result<UpsertOutcome, PersistError> {
        let mut outcome = UpsertOutcome::default();
        if apps.is_empty() {
            return Ok(outcome);
        }

        let appids: Vec<u32> = apps.iter().map(|a| a.appid).collect();
        let existing = self.store.get_existing_appids(&appids).await?;

        let surviving: Vec<&ExtractedApp> = apps.iter().filter(|a| existing.contains(&a.appid)).collect();
        outcome.skipped = apps.len() - surviving.len();
        if surviving.is_empty() {
            return Ok(outcome);
        }

        let surviving_ids: Vec<u32> = surviving.iter().map(|a| a.appid).collect();
        let has_storefront_date = self.store.get_apps_with_storefront_dates(&surviving_ids).await?;
        let has_storefront_sync = self.store.get_apps_with_storefront_sync(&surviving_ids).await?;

        let mut successful_appids: HashSet<u32> = HashSet::new();

        for chunk in surviving.chunks(UPSERT_BATCH_SIZE) {
            let records: Vec<AppRecord> = chunk
                .iter()
                .map(|app| build_record(app, &has_storefront_date, &has_storefront_sync))
                .collect();

            match self.store.upsert_apps_chunk(&records).await {
                Ok(()) => {
                    outcome.created_or_updated += chunk.len();
                    successful_appids.extend(chunk.iter().map(|a| a.appid));
                }
                Err(err) => {
                    error!(%err, chunk_size = chunk.len(), "apps upsert chunk failed");
                    outcome.failed += chunk.len();
                }
            }
        }

        let synced_ok = self.sync_relations(&surviving, &successful_appids).await;
        self.bump_sync_status(&synced_ok).await;

        Ok(outcome)
    }

    async fn sync_relations(&self, apps: &[&ExtractedApp], successful: &HashSet<u32>) -> Vec<u32> {
        let mut synced = Vec::new();
        for app in apps.iter().filter(|a| successful.contains(&a.appid)) {
            if self.sync_one(app).await {
                synced.push(app.appid);
            }
        }
        synced
    }

    async fn sync_one(&self, app: &ExtractedApp) -> bool {
        let mut ok = true;

        if let Some(deck) = &app.steam_deck {
            if let Err(err) = self
                .store
                .upsert_steam_deck(
                    app.appid,
                    SteamDeckCategory::from_u8(deck.category),
                    deck.test_timestamp,
                    deck.tested_build_id.as_deref(),
                    deck.tests.as_ref(),
                )
                .await
            {
                warn!(appid = app.appid, %err, "steam deck sync failed");
                ok = false;
            }
        }

        let enabled_categories: Vec<(u32, String)> = app
            .categories
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(id, _)| (*id, lookup::category_name(*id)))
            .collect();
        if let Err(err) = self.store.sync_categories(app.appid, &enabled_categories).await {
            warn!(appid = app.appid, %err, "category sync failed");
            ok = false;
        }

        let genres: Vec<(u32, String, bool)> = app
            .genres
            .iter()
            .map(|id| (*id, lookup::genre_name(*id), Some(*id) == app.primary_genre))
            .collect();
        if let Err(err) = self.store.sync_genres(app.appid, &genres).await {
            warn!(appid = app.appid, %err, "genre sync failed");
            ok = false;
        }

        let mut tags = Vec::with_capacity(app.store_tags.len());
        for (rank, tag_id) in app.store_tags.iter().enumerate() {
            tags.push((*tag_id, self.tag_names.name_for(*tag_id).await, rank));
        }
        if let Err(err) = self.store.sync_store_tags(app.appid, &tags).await {
            warn!(appid = app.appid, %err, "store tag sync failed");
            ok = false;
        }

        for association in &app.associations {
            if association.kind != AssociationKind::Franchise {
                continue;
            }
            match self.store.upsert_franchise(&association.name).await {
                Ok(franchise_id) => {
                    if let Err(err) = self.store.link_franchise(app.appid, franchise_id).await {
                        warn!(appid = app.appid, %err, "franchise link failed");
                        ok = false;
                    }
                }
                Err(err) => {
                    warn!(appid = app.appid, %err, "franchise upsert failed");
                    ok = false;
                }
            }
        }

        if !app.dlc_appids.is_empty() {
            if let Err(err) = self.store.sync_dlc(app.appid, &app.dlc_appids).await {
                warn!(appid = app.appid, %err, "dlc sync failed");
                ok = false;
            }
        }

        ok
    }

    /// Chunked update with a per-row fallback on chunk failure (§4.4.1 supplement).
    async fn bump_sync_status(&self, appids: &[u32]) {
        for chunk in appids.chunks(UPSERT_BATCH_SIZE) {
            if let Err(err) = self.store.batch_update_sync_status(chunk).await {
                warn!(%err, chunk_size = chunk.len(), "sync_status batch update failed, falling back per row");
                for &appid in chunk {
                    if let Err(err) = self.store.update_sync_status_one(appid).await {
                        warn!(appid, %err, "sync_status update failed for individual app");
                    }
                }
            }
        }
    }
}

fn build_record(
    app: &ExtractedApp,
    has_storefront_date: &HashSet<u32>,
    has_storefront_sync: &HashSet<u32>,
) -> AppRecord {
    let app_type = app.app_type.unwrap_or_else(|| type_inference::infer(app.name.as_deref()));

    let skip_release_date = has_storefront_date.contains(&app.appid);
    let skip_is_free_and_released = has_storefront_sync.contains(&app.appid);

    AppRecord {
        appid: app.appid,
        name: app.name.clone().filter(|n| !n.is_empty()),
        app_type: app_type.as_str(),
        developer: app.developer.clone(),
        publisher: app.publisher.clone(),
        steam_release_date: if skip_release_date { None } else { app.steam_release_date },
        original_release_date: app.original_release_date,
        store_asset_mtime: app.store_asset_mtime,
        release_state: app.release_state.clone(),
        last_update_timestamp: app.last_update_timestamp,
        current_build_id: app.current_build_id.clone(),
        review_score: app.review_score,
        review_percentage: app.review_percentage,
        metacritic_score: app.metacritic_score,
        metacritic_url: app.metacritic_url.clone(),
        primary_genre: app.primary_genre.map(|g| g as i32),
        platforms: app.platforms.clone(),
        controller_support: app.controller_support.clone(),
        has_workshop: app.has_workshop,
        is_free: if skip_is_free_and_released { None } else { Some(app.is_free) },
        is_released: if skip_is_free_and_released {
            None
        } else {
            app.release_state.as_deref().map(|s| s == "released")
        },
        content_descriptors: Some(app.content_descriptors.clone()),
        languages: Some(app.languages.clone()),
        homepage_url: app.homepage_url.clone(),
        app_state: app.app_state.clone(),
        skip_release_date,
        skip_is_free_and_released,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        existing: HashSet<u32>,
        storefront_dates: HashSet<u32>,
        storefront_sync: HashSet<u32>,
        upserted: Mutex<Vec<AppRecord>>,
        synced_status: Mutex<Vec<u32>>,
        synced_tags: Mutex<Vec<(u32, String, usize)>>,
        fail_upsert: bool,
    }

    #[async_trait]
    impl Store for FakeStore {
        async fn get_existing_appids(&self, appids: &[u32]) -> Result<HashSet<u32>, StoreError> {
            Ok(appids.iter().copied().filter(|a| self.existing.contains(a)).collect())
        }
        async fn get_apps_with_storefront_dates(&self, appids: &[u32]) -> Result<HashSet<u32>, StoreError> {
            Ok(appids.iter().copied().filter(|a| self.storefront_dates.contains(a)).collect())
        }
        async fn get_apps_with_storefront_sync(&self, appids: &[u32]) -> Result<HashSet<u32>, StoreError> {
            Ok(appids.iter().copied().filter(|a| self.storefront_sync.contains(a)).collect())
        }
        async fn upsert_apps_chunk(&self, records: &[AppRecord]) -> Result<(), StoreError> {
            if self.fail_upsert {
                return Err(StoreError::Database(sqlx::Error::RowNotFound));
            }
            self.upserted.lock().unwrap().extend_from_slice(records);
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
        async fn sync_store_tags(&self, _: u32, tags: &[(u32, String, usize)]) -> Result<(), StoreError> {
            *self.synced_tags.lock().unwrap() = tags.to_vec();
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
            Ok(0)
        }
        async fn set_last_change_number(&self, _: u64) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn apps_not_in_store_are_skipped_not_created() {
        let store = FakeStore {
            existing: HashSet::new(),
            ..Default::default()
        };
        let tags = TagNameCache::empty();
        let persister = Persister::new(&store, &tags);

        let app = ExtractedApp::empty(730);
        let outcome = persister.upsert_apps_batch(&[app]).await.unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.created_or_updated, 0);
    }

    #[tokio::test]
    async fn storefront_owned_release_date_is_not_overwritten() {
        let store = FakeStore {
            existing: HashSet::from([730]),
            storefront_dates: HashSet::from([730]),
            ..Default::default()
        };
        let tags = TagNameCache::empty();
        let persister = Persister::new(&store, &tags);

        let mut app = ExtractedApp::empty(730);
        app.steam_release_date = Some(chrono::Utc::now());
        persister.upsert_apps_batch(&[app]).await.unwrap();

        let upserted = store.upserted.lock().unwrap();
        assert_eq!(upserted.len(), 1);
        assert!(upserted[0].steam_release_date.is_none());
        assert!(upserted[0].skip_release_date);
    }

    #[tokio::test]
    async fn missing_type_falls_back_to_inference() {
        let store = FakeStore {
            existing: HashSet::from([730]),
            ..Default::default()
        };
        let tags = TagNameCache::empty();
        let persister = Persister::new(&store, &tags);

        let mut app = ExtractedApp::empty(730);
        app.name = Some("Some Game Demo".to_string());
        persister.upsert_apps_batch(&[app]).await.unwrap();

        let upserted = store.upserted.lock().unwrap();
        assert_eq!(upserted[0].app_type, "demo");
    }

    #[tokio::test]
    async fn failed_chunk_is_not_marked_successful_and_skips_sync_status() {
        let store = FakeStore {
            existing: HashSet::from([730]),
            fail_upsert: true,
            ..Default::default()
        };
        let tags = TagNameCache::empty();
        let persister = Persister::new(&store, &tags);

        let app = ExtractedApp::empty(730);
        let outcome = persister.upsert_apps_batch(&[app]).await.unwrap();
        assert_eq!(outcome.failed, 1);
        assert!(store.synced_status.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_tags_keep_upstream_rank_order() {
        let store = FakeStore {
            existing: HashSet::from([730]),
            ..Default::default()
        };
        let tags = TagNameCache::empty();
        let persister = Persister::new(&store, &tags);

        let mut app = ExtractedApp::empty(730);
        app.store_tags = vec![1, 19, 4182];
        persister.upsert_apps_batch(&[app]).await.unwrap();

        let synced = store.synced_tags.lock().unwrap();
        let ranks: Vec<(u32, usize)> = synced.iter().map(|(id, _, rank)| (*id, *rank)).collect();
        assert_eq!(ranks, vec![(1, 0), (19, 1), (4182, 2)]);
    }
}
