//! Integration tests for `store::PgStore` against a real Postgres instance,
//! provisioned per-test by `sqlx::test`. Covers the SQL-heavy paths that a
//! mocked `Store` can't: conditional upserts, delete-then-reinsert relation
//! sync, and keyset pagination.

use pics_sync_service::store::{AppRecord, PgStore, SteamDeckCategory, Store};
use sqlx::{PgPool, Row};

fn bare_record(appid: u32) -> AppRecord {
    AppRecord {
        appid,
        name: Some(format!("App {appid}")),
        app_type: "game",
        developer: None,
        publisher: None,
        steam_release_date: None,
        original_release_date: None,
        store_asset_mtime: None,
        release_state: None,
        last_update_timestamp: None,
        current_build_id: None,
        review_score: None,
        review_percentage: None,
        metacritic_score: None,
        metacritic_url: None,
        primary_genre: None,
        platforms: Vec::new(),
        controller_support: None,
        has_workshop: false,
        is_free: Some(false),
        is_released: Some(true),
        content_descriptors: None,
        languages: None,
        homepage_url: None,
        app_state: None,
        skip_release_date: false,
        skip_is_free_and_released: false,
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn upsert_apps_chunk_inserts_then_updates(pool: PgPool) -> sqlx::Result<()> {
    let store = PgStore::new(pool).await.expect("store init");

    store.upsert_apps_chunk(&[bare_record(70)]).await.unwrap();
    let existing = store.get_existing_appids(&[70, 71]).await.unwrap();
    assert!(existing.contains(&70));
    assert!(!existing.contains(&71));

    let mut updated = bare_record(70);
    updated.name = Some("Half-Life Updated".to_string());
    store.upsert_apps_chunk(&[updated]).await.unwrap();

    let row = sqlx::query("SELECT name FROM apps WHERE appid = 70")
        .fetch_one(store.pool())
        .await?;
    let name: String = row.get::<String, _>("name");
    assert_eq!(name, "Half-Life Updated");
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn skip_release_date_preserves_existing_column(pool: PgPool) -> sqlx::Result<()> {
    let store = PgStore::new(pool).await.expect("store init");

    let release_date = chrono::DateTime::from_timestamp(1_000_000_000, 0).unwrap();
    let mut initial = bare_record(730);
    initial.steam_release_date = Some(release_date);
    store.upsert_apps_chunk(&[initial]).await.unwrap();

    // A later write claims the app has no authoritative storefront date and
    // asks the upsert to leave the existing column untouched.
    let mut follow_up = bare_record(730);
    follow_up.steam_release_date = None;
    follow_up.skip_release_date = true;
    store.upsert_apps_chunk(&[follow_up]).await.unwrap();

    let row = sqlx::query("SELECT steam_release_date FROM apps WHERE appid = 730")
        .fetch_one(store.pool())
        .await?;
    let kept: Option<chrono::DateTime<chrono::Utc>> = row.get::<Option<chrono::DateTime<chrono::Utc>>, _>("steam_release_date");
    assert_eq!(kept, Some(release_date));
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn skip_is_free_and_released_preserves_existing_columns(pool: PgPool) -> sqlx::Result<()> {
    let store = PgStore::new(pool).await.expect("store init");

    let mut initial = bare_record(440);
    initial.is_free = Some(true);
    initial.is_released = Some(true);
    store.upsert_apps_chunk(&[initial]).await.unwrap();

    let mut follow_up = bare_record(440);
    follow_up.is_free = Some(false);
    follow_up.is_released = Some(false);
    follow_up.skip_is_free_and_released = true;
    store.upsert_apps_chunk(&[follow_up]).await.unwrap();

    let row = sqlx::query("SELECT is_free, is_released FROM apps WHERE appid = 440")
        .fetch_one(store.pool())
        .await?;
    let is_free: Option<bool> = row.get::<Option<bool>, _>("is_free");
    let is_released: Option<bool> = row.get::<Option<bool>, _>("is_released");
    assert_eq!(is_free, Some(true));
    assert_eq!(is_released, Some(true));
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn sync_store_tags_replaces_rank_on_resync(pool: PgPool) -> sqlx::Result<()> {
    let store = PgStore::new(pool).await.expect("store init");
    store.upsert_apps_chunk(&[bare_record(1)]).await.unwrap();

    store
        .sync_store_tags(1, &[(19, "Action".to_string(), 0), (492, "Indie".to_string(), 1)])
        .await
        .unwrap();

    // A resync with a different tag set and order must fully replace the
    // previous rows rather than append to them.
    store
        .sync_store_tags(1, &[(4182, "FPS".to_string(), 0)])
        .await
        .unwrap();

    let rows = sqlx::query("SELECT tag_id, rank FROM app_steam_tags WHERE appid = 1 ORDER BY rank")
        .fetch_all(store.pool())
        .await?;
    assert_eq!(rows.len(), 1);
    let tag_id: i64 = rows[0].get::<i64, _>("tag_id");
    let rank: i32 = rows[0].get::<i32, _>("rank");
    assert_eq!(tag_id, 4182);
    assert_eq!(rank, 0);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn keyset_pagination_is_ordered_and_exclusive(pool: PgPool) -> sqlx::Result<()> {
    let store = PgStore::new(pool).await.expect("store init");
    let records: Vec<AppRecord> = [10, 20, 30, 40].into_iter().map(bare_record).collect();
    store.upsert_apps_chunk(&records).await.unwrap();

    let first_page = store.get_all_app_ids_page(0, 2).await.unwrap();
    assert_eq!(first_page, vec![10, 20]);

    let second_page = store.get_all_app_ids_page(*first_page.last().unwrap(), 2).await.unwrap();
    assert_eq!(second_page, vec![30, 40]);

    let empty_page = store.get_all_app_ids_page(40, 2).await.unwrap();
    assert!(empty_page.is_empty());
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn unsynced_app_ids_shrink_as_apps_get_synced(pool: PgPool) -> sqlx::Result<()> {
    let store = PgStore::new(pool).await.expect("store init");
    let records: Vec<AppRecord> = [1, 2, 3].into_iter().map(bare_record).collect();
    store.upsert_apps_chunk(&records).await.unwrap();
    store.batch_update_sync_status(&[1, 2, 3]).await.unwrap();

    assert_eq!(store.count_unsynced_apps().await.unwrap(), 0);

    sqlx::query("UPDATE sync_status SET last_pics_sync = NULL WHERE appid = 2")
        .execute(store.pool())
        .await?;

    assert_eq!(store.count_unsynced_apps().await.unwrap(), 1);
    let page = store.get_unsynced_app_ids_page(0, 10).await.unwrap();
    assert_eq!(page, vec![2]);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn last_change_number_round_trips(pool: PgPool) -> sqlx::Result<()> {
    let store = PgStore::new(pool).await.expect("store init");
    assert_eq!(store.get_last_change_number().await.unwrap(), 0);

    store.set_last_change_number(12345).await.unwrap();
    assert_eq!(store.get_last_change_number().await.unwrap(), 12345);

    store.set_last_change_number(6789).await.unwrap();
    assert_eq!(store.get_last_change_number().await.unwrap(), 6789);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn upsert_steam_deck_round_trips_category(pool: PgPool) -> sqlx::Result<()> {
    let store = PgStore::new(pool).await.expect("store init");
    store.upsert_apps_chunk(&[bare_record(620)]).await.unwrap();

    store
        .upsert_steam_deck(620, SteamDeckCategory::Verified, Some(1_700_000_000), Some("123"), None)
        .await
        .unwrap();

    let row = sqlx::query("SELECT category, tested_build_id FROM app_steam_deck WHERE appid = 620")
        .fetch_one(store.pool())
        .await?;
    let category: String = row.get::<String, _>("category");
    let build_id: Option<String> = row.get::<Option<String>, _>("tested_build_id");
    assert_eq!(category, "verified");
    assert_eq!(build_id.as_deref(), Some("123"));
    Ok(())
}
