//! The concrete, `sqlx`-backed implementation of the persister's store
//! contract (SPEC_FULL.md §3.2/§3.3). Grounded in `revaer-data::RuntimeStore`
//! for the pool-owning-struct/const-SQL-string/runtime-`sqlx::query` idiom
//! (the query! macro family needs a live `DATABASE_URL` at build time, which
//! this repository cannot assume).

mod error;

pub use error::StoreError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::collections::HashSet;

pub const PAGE_SIZE: i64 = 1000;
pub const UPSERT_CHUNK_SIZE: usize = 500;

/// One row to upsert into `apps`. `None` on an optional field means "do not
/// overwrite the existing value" for `name`/`steam_release_date`/`is_free`/
/// `is_released` (see [`AppRecord::conditional`] fields); for every other
/// field it means "write null", matching §4.4.1's precedence rules.
#[derive(Debug, Clone)]
pub struct AppRecord {
    pub appid: u32,
    pub name: Option<String>,
    pub app_type: &'static str,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub steam_release_date: Option<DateTime<Utc>>,
    pub original_release_date: Option<DateTime<Utc>>,
    pub store_asset_mtime: Option<DateTime<Utc>>,
    pub release_state: Option<String>,
    pub last_update_timestamp: Option<DateTime<Utc>>,
    pub current_build_id: Option<String>,
    pub review_score: Option<i32>,
    pub review_percentage: Option<i32>,
    pub metacritic_score: Option<i32>,
    pub metacritic_url: Option<String>,
    pub primary_genre: Option<i32>,
    pub platforms: Vec<String>,
    pub controller_support: Option<String>,
    pub has_workshop: bool,
    pub is_free: Option<bool>,
    pub is_released: Option<bool>,
    pub content_descriptors: Option<Value>,
    pub languages: Option<Value>,
    pub homepage_url: Option<String>,
    pub app_state: Option<String>,
    /// Only written when this app has no authoritative storefront release date.
    pub skip_release_date: bool,
    /// Only written when this app has no authoritative storefront sync.
    pub skip_is_free_and_released: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteamDeckCategory {
    Unknown,
    Unsupported,
    Playable,
    Verified,
}

impl SteamDeckCategory {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Unsupported,
            2 => Self::Playable,
            3 => Self::Verified,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Unsupported => "unsupported",
            Self::Playable => "playable",
            Self::Verified => "verified",
        }
    }
}

/// The persister's store seam. Expressed as a trait so the persister can be
/// tested against an in-memory fake without a live Postgres (the real
/// implementation, `PgStore`, is the only thing that talks SQL).
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn get_existing_appids(&self, appids: &[u32]) -> Result<HashSet<u32>, StoreError>;
    async fn get_apps_with_storefront_dates(&self, appids: &[u32]) -> Result<HashSet<u32>, StoreError>;
    async fn get_apps_with_storefront_sync(&self, appids: &[u32]) -> Result<HashSet<u32>, StoreError>;

    /// Upserts one chunk (caller is responsible for staying under 500 rows).
    async fn upsert_apps_chunk(&self, records: &[AppRecord]) -> Result<(), StoreError>;

    async fn upsert_steam_deck(
        &self,
        appid: u32,
        category: SteamDeckCategory,
        test_timestamp: Option<i64>,
        tested_build_id: Option<&str>,
        tests: Option<&Value>,
    ) -> Result<(), StoreError>;

    async fn sync_categories(&self, appid: u32, categories: &[(u32, String)]) -> Result<(), StoreError>;
    async fn sync_genres(&self, appid: u32, genres: &[(u32, String, bool)]) -> Result<(), StoreError>;
    async fn sync_store_tags(&self, appid: u32, tags: &[(u32, String, usize)]) -> Result<(), StoreError>;
    async fn upsert_franchise(&self, name: &str) -> Result<i64, StoreError>;
    async fn link_franchise(&self, appid: u32, franchise_id: i64) -> Result<(), StoreError>;
    async fn sync_dlc(&self, parent_appid: u32, dlc_appids: &[u32]) -> Result<(), StoreError>;

    /// Chunked batch update; caller handles the per-row fallback (§4.4.1 supplement).
    async fn batch_update_sync_status(&self, appids: &[u32]) -> Result<(), StoreError>;
    async fn update_sync_status_one(&self, appid: u32) -> Result<(), StoreError>;

    async fn upsert_tag_name(&self, tag_id: u32, name: &str) -> Result<(), StoreError>;

    async fn get_all_app_ids_page(&self, after: u32, page_size: i64) -> Result<Vec<u32>, StoreError>;
    async fn get_unsynced_app_ids_page(&self, after: u32, page_size: i64) -> Result<Vec<u32>, StoreError>;
    async fn count_unsynced_apps(&self) -> Result<u64, StoreError>;

    async fn get_last_change_number(&self) -> Result<u64, StoreError>;
    async fn set_last_change_number(&self, value: u64) -> Result<(), StoreError>;
}

/// Postgres-backed `Store`. Owns the pool and runs migrations at startup.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn new(pool: PgPool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&pool).await.map_err(sqlx::Error::from)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn appids_where(&self, table: &str, column: &str, appids: &[u32]) -> Result<HashSet<u32>, StoreError> {
        if appids.is_empty() {
            return Ok(HashSet::new());
        }
        let ids: Vec<i64> = appids.iter().map(|&a| i64::from(a)).collect();
        let sql = format!(
            "SELECT appid FROM {table} WHERE appid = ANY($1) AND {column} IS NOT NULL"
        );
        let rows = sqlx::query(&sql).bind(&ids).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| row.get::<i64, _>("appid") as u32)
            .collect())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_existing_appids(&self, appids: &[u32]) -> Result<HashSet<u32>, StoreError> {
        if appids.is_empty() {
            return Ok(HashSet::new());
        }
        let ids: Vec<i64> = appids.iter().map(|&a| i64::from(a)).collect();
        let rows = sqlx::query("SELECT appid FROM apps WHERE appid = ANY($1)")
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| row.get::<i64, _>("appid") as u32)
            .collect())
    }

    async fn get_apps_with_storefront_dates(&self, appids: &[u32]) -> Result<HashSet<u32>, StoreError> {
        self.appids_where("apps", "release_date_raw", appids).await
    }

    async fn get_apps_with_storefront_sync(&self, appids: &[u32]) -> Result<HashSet<u32>, StoreError> {
        self.appids_where("sync_status", "last_storefront_sync", appids).await
    }

    async fn upsert_apps_chunk(&self, records: &[AppRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO apps (
                    appid, name, type, developer, publisher, steam_release_date,
                    original_release_date, store_asset_mtime, release_state,
                    last_update_timestamp, current_build_id, review_score,
                    review_percentage, metacritic_score, metacritic_url,
                    primary_genre, platforms, controller_support, has_workshop,
                    is_free, is_released, content_descriptors, languages,
                    homepage_url, app_state, updated_at
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, now()
                )
                ON CONFLICT (appid) DO UPDATE SET
                    name = COALESCE(EXCLUDED.name, apps.name),
                    type = EXCLUDED.type,
                    developer = EXCLUDED.developer,
                    publisher = EXCLUDED.publisher,
                    steam_release_date = CASE WHEN $27 THEN apps.steam_release_date ELSE EXCLUDED.steam_release_date END,
                    original_release_date = EXCLUDED.original_release_date,
                    store_asset_mtime = EXCLUDED.store_asset_mtime,
                    release_state = EXCLUDED.release_state,
                    last_update_timestamp = EXCLUDED.last_update_timestamp,
                    current_build_id = EXCLUDED.current_build_id,
                    review_score = EXCLUDED.review_score,
                    review_percentage = EXCLUDED.review_percentage,
                    metacritic_score = EXCLUDED.metacritic_score,
                    metacritic_url = EXCLUDED.metacritic_url,
                    primary_genre = EXCLUDED.primary_genre,
                    platforms = EXCLUDED.platforms,
                    controller_support = EXCLUDED.controller_support,
                    has_workshop = EXCLUDED.has_workshop,
                    is_free = CASE WHEN $28 THEN apps.is_free ELSE EXCLUDED.is_free END,
                    is_released = CASE WHEN $28 THEN apps.is_released ELSE EXCLUDED.is_released END,
                    content_descriptors = EXCLUDED.content_descriptors,
                    languages = EXCLUDED.languages,
                    homepage_url = EXCLUDED.homepage_url,
                    app_state = EXCLUDED.app_state,
                    updated_at = now()
                "#,
            )
            .bind(i64::from(record.appid))
            .bind(&record.name)
            .bind(record.app_type)
            .bind(&record.developer)
            .bind(&record.publisher)
            .bind(record.steam_release_date)
            .bind(record.original_release_date)
            .bind(record.store_asset_mtime)
            .bind(&record.release_state)
            .bind(record.last_update_timestamp)
            .bind(&record.current_build_id)
            .bind(record.review_score)
            .bind(record.review_percentage)
            .bind(record.metacritic_score)
            .bind(&record.metacritic_url)
            .bind(record.primary_genre)
            .bind(&record.platforms)
            .bind(&record.controller_support)
            .bind(record.has_workshop)
            .bind(record.is_free)
            .bind(record.is_released)
            .bind(&record.content_descriptors)
            .bind(&record.languages)
            .bind(&record.homepage_url)
            .bind(&record.app_state)
            .bind(record.skip_release_date)
            .bind(record.skip_is_free_and_released)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_steam_deck(
        &self,
        appid: u32,
        category: SteamDeckCategory,
        test_timestamp: Option<i64>,
        tested_build_id: Option<&str>,
        tests: Option<&Value>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO app_steam_deck (appid, category, test_timestamp, tested_build_id, tests, updated_at)
            VALUES ($1, $2, to_timestamp($3), $4, $5, now())
            ON CONFLICT (appid) DO UPDATE SET
                category = EXCLUDED.category,
                test_timestamp = EXCLUDED.test_timestamp,
                tested_build_id = EXCLUDED.tested_build_id,
                tests = EXCLUDED.tests,
                updated_at = now()
            "#,
        )
        .bind(i64::from(appid))
        .bind(category.as_str())
        .bind(test_timestamp)
        .bind(tested_build_id)
        .bind(tests)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sync_categories(&self, appid: u32, categories: &[(u32, String)]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM app_categories WHERE appid = $1")
            .bind(i64::from(appid))
            .execute(&mut *tx)
            .await?;
        for (category_id, name) in categories {
            sqlx::query(
                "INSERT INTO steam_categories (category_id, name) VALUES ($1, $2) \
                 ON CONFLICT (category_id) DO UPDATE SET name = EXCLUDED.name",
            )
            .bind(i64::from(*category_id))
            .bind(name)
            .execute(&mut *tx)
            .await?;
            sqlx::query("INSERT INTO app_categories (appid, category_id) VALUES ($1, $2)")
                .bind(i64::from(appid))
                .bind(i64::from(*category_id))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn sync_genres(&self, appid: u32, genres: &[(u32, String, bool)]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM app_genres WHERE appid = $1")
            .bind(i64::from(appid))
            .execute(&mut *tx)
            .await?;
        for (genre_id, name, is_primary) in genres {
            sqlx::query(
                "INSERT INTO steam_genres (genre_id, name) VALUES ($1, $2) \
                 ON CONFLICT (genre_id) DO UPDATE SET name = EXCLUDED.name",
            )
            .bind(i64::from(*genre_id))
            .bind(name)
            .execute(&mut *tx)
            .await?;
            sqlx::query("INSERT INTO app_genres (appid, genre_id, is_primary) VALUES ($1, $2, $3)")
                .bind(i64::from(appid))
                .bind(i64::from(*genre_id))
                .bind(*is_primary)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn sync_store_tags(&self, appid: u32, tags: &[(u32, String, usize)]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM app_steam_tags WHERE appid = $1")
            .bind(i64::from(appid))
            .execute(&mut *tx)
            .await?;
        for (tag_id, name, rank) in tags {
            sqlx::query(
                "INSERT INTO steam_tags (tag_id, name, updated_at) VALUES ($1, $2, now()) \
                 ON CONFLICT (tag_id) DO UPDATE SET name = EXCLUDED.name, updated_at = now()",
            )
            .bind(i64::from(*tag_id))
            .bind(name)
            .execute(&mut *tx)
            .await?;
            sqlx::query("INSERT INTO app_steam_tags (appid, tag_id, rank) VALUES ($1, $2, $3)")
                .bind(i64::from(appid))
                .bind(i64::from(*tag_id))
                .bind(*rank as i32)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_franchise(&self, name: &str) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT upsert_franchise($1) AS id")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("id"))
    }

    async fn link_franchise(&self, appid: u32, franchise_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO app_franchises (appid, franchise_id) VALUES ($1, $2) \
             ON CONFLICT (appid, franchise_id) DO NOTHING",
        )
        .bind(i64::from(appid))
        .bind(franchise_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sync_dlc(&self, parent_appid: u32, dlc_appids: &[u32]) -> Result<(), StoreError> {
        for dlc_appid in dlc_appids {
            sqlx::query(
                "INSERT INTO app_dlc (parent_appid, dlc_appid, source) VALUES ($1, $2, 'pics') \
                 ON CONFLICT (parent_appid, dlc_appid) DO UPDATE SET source = EXCLUDED.source",
            )
            .bind(i64::from(parent_appid))
            .bind(i64::from(*dlc_appid))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn batch_update_sync_status(&self, appids: &[u32]) -> Result<(), StoreError> {
        if appids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for &appid in appids {
            sqlx::query(
                "INSERT INTO sync_status (appid, last_pics_sync) VALUES ($1, now()) \
                 ON CONFLICT (appid) DO UPDATE SET last_pics_sync = now()",
            )
            .bind(i64::from(appid))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_sync_status_one(&self, appid: u32) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_status (appid, last_pics_sync) VALUES ($1, now()) \
             ON CONFLICT (appid) DO UPDATE SET last_pics_sync = now()",
        )
        .bind(i64::from(appid))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_tag_name(&self, tag_id: u32, name: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO steam_tags (tag_id, name, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (tag_id) DO UPDATE SET name = EXCLUDED.name, updated_at = now()",
        )
        .bind(i64::from(tag_id))
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_all_app_ids_page(&self, after: u32, page_size: i64) -> Result<Vec<u32>, StoreError> {
        let rows = sqlx::query("SELECT appid FROM apps WHERE appid > $1 ORDER BY appid LIMIT $2")
            .bind(i64::from(after))
            .bind(page_size)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get::<i64, _>("appid") as u32).collect())
    }

    async fn get_unsynced_app_ids_page(&self, after: u32, page_size: i64) -> Result<Vec<u32>, StoreError> {
        let rows = sqlx::query(
            "SELECT appid FROM sync_status WHERE last_pics_sync IS NULL AND appid > $1 \
             ORDER BY appid LIMIT $2",
        )
        .bind(i64::from(after))
        .bind(page_size)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get::<i64, _>("appid") as u32).collect())
    }

    async fn count_unsynced_apps(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sync_status WHERE last_pics_sync IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    async fn get_last_change_number(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT last_change_number FROM pics_sync_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("last_change_number") as u64).unwrap_or(0))
    }

    async fn set_last_change_number(&self, value: u64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO pics_sync_state (id, last_change_number, updated_at) VALUES (1, $1, now()) \
             ON CONFLICT (id) DO UPDATE SET last_change_number = EXCLUDED.last_change_number, updated_at = now()",
        )
        .bind(value as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
