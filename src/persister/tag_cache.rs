//! §4.4.4 — the process-wide tag-name cache and its standalone refresh
//! routine. Populated once at startup from `<platform>/tagdata/populartags/
//! english`; failure is swallowed (lookups fall back to `"Tag <id>"`),
//! matching `original_source/.../database/operations.py`'s `_get_tag_name`.

use crate::store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct TagNameCache {
    names: Arc<RwLock<HashMap<u32, String>>>,
}

impl TagNameCache {
    pub fn empty() -> Self {
        Self {
            names: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fetches the popular-tags list once. Never fails the caller: network
    /// or parse errors leave the cache empty and are only logged.
    pub async fn populate(&self, platform_base_url: &str) {
        match fetch_tag_names(platform_base_url).await {
            Ok(fetched) => {
                let count = fetched.len();
                *self.names.write().await = fetched;
                tracing::info!(count, "populated tag-name cache");
            }
            Err(err) => warn!(%err, "tag-name cache fetch failed, falling back to generic names"),
        }
    }

    pub async fn name_for(&self, tag_id: u32) -> String {
        self.names
            .read()
            .await
            .get(&tag_id)
            .cloned()
            .unwrap_or_else(|| format!("Tag {tag_id}"))
    }
}

/// Re-fetches the popular-tags list and writes it straight into
/// `steam_tags`, independent of the in-process cache or any app sync.
/// Intended for a maintenance entrypoint, not the core loop.
pub async fn refresh_tag_names(
    platform_base_url: &str,
    store: &dyn Store,
) -> Result<usize, crate::persister::PersistError> {
    let fetched = fetch_tag_names(platform_base_url).await?;
    for (tag_id, name) in &fetched {
        store.upsert_tag_name(*tag_id, name).await?;
    }
    Ok(fetched.len())
}

async fn fetch_tag_names(platform_base_url: &str) -> Result<HashMap<u32, String>, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
    let url = format!("{platform_base_url}/tagdata/populartags/english");

    let response = client.get(&url).send().await?.error_for_status()?;
    let body: serde_json::Value = response.json().await?;

    // The endpoint returns a bare top-level array of `{"tagid": ..., "name": ...}`
    // objects, not an object wrapping a "tags" key.
    let tags = body.as_array().cloned().unwrap_or_default();

    let mut names = HashMap::new();
    for tag in tags {
        let Some(id) = tag.get("tagid").and_then(serde_json::Value::as_u64) else {
            continue;
        };
        let Some(name) = tag.get("name").and_then(serde_json::Value::as_str) else {
            continue;
        };
        names.insert(id as u32, name.to_string());
    }
    Ok(names)
}
