//! C3 — Extractor.
//!
//! Pure transformation from a raw PICS record into an [`ExtractedApp`].
//! Field-for-field grounded in `original_source/.../extractors/common.py`'s
//! `PICSExtractor.extract`; no I/O, no error type — absent or malformed
//! fields default rather than fail, matching the original's defensive
//! `_safe_int`/`_parse_timestamp` helpers.

use crate::domain::{AppType, Association, AssociationKind, ExtractedApp, SteamDeckCompatibility};
use crate::session::RawAppRecord;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub fn extract(appid: u32, raw: &RawAppRecord) -> ExtractedApp {
    let appinfo = raw.get("appinfo").unwrap_or(raw);

    let common = obj(appinfo, "common");
    let extended = obj(appinfo, "extended");
    let config = obj(appinfo, "config");
    let depots = obj(appinfo, "depots");

    let mut app = ExtractedApp::empty(appid);

    app.name = common.get("name").and_then(Value::as_str).map(str::to_owned);
    app.app_type = common.get("type").and_then(Value::as_str).map(AppType::from_raw);

    app.developer = string_field(common, "developer").or_else(|| string_field(extended, "developer"));
    app.publisher = string_field(common, "publisher").or_else(|| string_field(extended, "publisher"));
    app.associations = extract_associations(common.get("associations"));

    app.parent_appid = safe_u32(common.get("parent"));
    app.dlc_appids = parse_id_list(extended.get("listofdlc").and_then(Value::as_str));

    app.steam_release_date = parse_timestamp(common.get("steam_release_date"));
    app.original_release_date = parse_timestamp(common.get("original_release_date"));
    app.store_asset_mtime = parse_timestamp(common.get("store_asset_mtime"));
    app.release_state = string_field(common, "releasestate");
    app.last_update_timestamp = extract_last_update(depots);

    app.review_score = safe_i32(common.get("review_score"));
    app.review_percentage = safe_i32(common.get("review_percentage"));
    app.metacritic_score = safe_i32(common.get("metacritic_score"));
    app.metacritic_url = string_field(common, "metacritic_url");

    app.store_tags = extract_tag_ids(common.get("store_tags"));
    app.genres = extract_tag_ids(common.get("genres"));
    app.primary_genre = safe_u32(common.get("primary_genre"));
    app.categories = extract_categories(common.get("category"));

    app.platforms = parse_comma_list(common.get("oslist").and_then(Value::as_str));
    app.controller_support = string_field(common, "controller_support");
    app.steam_deck = extract_steam_deck(common.get("steam_deck_compatibility"));

    app.has_workshop = config.get("workshop").is_some()
        || common.get("workshop_visible").and_then(Value::as_str) == Some("1");
    app.is_free = common.get("isfreeapp").and_then(Value::as_str) == Some("1");

    app.content_descriptors = common
        .get("content_descriptors")
        .cloned()
        .unwrap_or(Value::Null);
    app.languages = common.get("languages").cloned().unwrap_or(Value::Null);

    app.homepage_url = string_field(extended, "homepage").or_else(|| string_field(extended, "developer_url"));
    app.app_state = string_field(extended, "state");
    app.current_build_id = extract_build_id(depots);

    app
}

fn obj<'a>(value: &'a Value, key: &str) -> &'a Value {
    value.get(key).filter(|v| v.is_object()).unwrap_or(&Value::Null)
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// PICS numbered-dict fields (`{"0": {...}, "1": {...}}`) come back as JSON
/// objects keyed by position, not arrays. `serde_json`'s `preserve_order`
/// feature keeps `Value::Object` backed by an insertion-ordered map, so
/// iterating these in document order recovers the original position;
/// association order itself carries no meaning, unlike tag rank below.
fn extract_associations(value: Option<&Value>) -> Vec<Association> {
    let Some(Value::Object(map)) = value else {
        return Vec::new();
    };
    map.values()
        .filter_map(|entry| {
            let kind = entry.get("type")?.as_str()?;
            let name = entry.get("name")?.as_str()?;
            Some(Association {
                kind: AssociationKind::from_raw(kind),
                name: name.to_owned(),
            })
        })
        .collect()
}

/// Rank is the numbered-dict's document order (`"0"` first, `"1"` next, ...),
/// which is why `preserve_order` is load-bearing here: store tag and genre
/// rank feeds directly into `app_steam_tags.rank`/primary-genre selection.
fn extract_tag_ids(value: Option<&Value>) -> Vec<u32> {
    let Some(Value::Object(map)) = value else {
        return Vec::new();
    };
    map.values().filter_map(safe_u32_value).collect()
}

fn extract_categories(value: Option<&Value>) -> std::collections::HashMap<u32, bool> {
    let Some(Value::Object(map)) = value else {
        return std::collections::HashMap::new();
    };
    map.iter()
        .filter_map(|(key, v)| {
            let id_str = key.strip_prefix("category_")?;
            let id: u32 = id_str.parse().ok()?;
            Some((id, v.as_str() == Some("1")))
        })
        .collect()
}

fn parse_comma_list(value: Option<&str>) -> Vec<String> {
    match value {
        Some(s) if !s.is_empty() => s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_id_list(value: Option<&str>) -> Vec<u32> {
    match value {
        Some(s) if !s.is_empty() => s.split(',').filter_map(|x| x.trim().parse().ok()).collect(),
        _ => Vec::new(),
    }
}

fn extract_steam_deck(value: Option<&Value>) -> Option<SteamDeckCompatibility> {
    let data = value?.as_object()?;
    if data.is_empty() {
        return None;
    }
    Some(SteamDeckCompatibility {
        category: safe_u32(data.get("category")).map(|v| v as u8).unwrap_or(0),
        test_timestamp: data.get("test_timestamp").and_then(safe_i64_value),
        tested_build_id: data.get("tested_build_id").and_then(Value::as_str).map(str::to_owned),
        tests: data.get("tests").cloned(),
    })
}

fn extract_last_update(depots: &Value) -> Option<DateTime<Utc>> {
    parse_timestamp(public_branch(depots)?.get("timeupdated"))
}

fn extract_build_id(depots: &Value) -> Option<String> {
    public_branch(depots)?.get("buildid").and_then(Value::as_str).map(str::to_owned)
}

fn public_branch(depots: &Value) -> Option<&Value> {
    depots.get("branches")?.get("public")
}

/// Mirrors `_parse_timestamp`: absent, zero, or unparseable values become
/// `None` rather than an error.
fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let seconds = safe_i64_value(value?)?;
    if seconds == 0 {
        return None;
    }
    DateTime::from_timestamp(seconds, 0)
}

fn safe_u32(value: Option<&Value>) -> Option<u32> {
    value.and_then(safe_u32_value)
}

fn safe_u32_value(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    value.as_str()?.trim().parse().ok()
}

fn safe_i32(value: Option<&Value>) -> Option<i32> {
    let value = value?;
    if let Some(n) = value.as_i64() {
        return i32::try_from(n).ok();
    }
    value.as_str()?.trim().parse().ok()
}

fn safe_i64_value(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    value.as_str()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_appinfo_envelope() {
        let raw = json!({"appinfo": {"common": {"name": "Half-Life", "type": "game"}}});
        let app = extract(70, &raw);
        assert_eq!(app.name.as_deref(), Some("Half-Life"));
    }

    #[test]
    fn accepts_unwrapped_record() {
        let raw = json!({"common": {"name": "Portal"}});
        let app = extract(400, &raw);
        assert_eq!(app.name.as_deref(), Some("Portal"));
    }

    #[test]
    fn developer_prefers_common_over_extended() {
        let raw = json!({
            "common": {"developer": "Valve"},
            "extended": {"developer": "Fallback Studio"}
        });
        let app = extract(1, &raw);
        assert_eq!(app.developer.as_deref(), Some("Valve"));
    }

    #[test]
    fn developer_falls_back_to_extended_when_common_missing() {
        let raw = json!({"extended": {"developer": "Fallback Studio"}});
        let app = extract(1, &raw);
        assert_eq!(app.developer.as_deref(), Some("Fallback Studio"));
    }

    #[test]
    fn parses_dlc_and_platform_lists() {
        let raw = json!({
            "common": {"oslist": "windows, macos , linux"},
            "extended": {"listofdlc": "10, 20,30"}
        });
        let app = extract(1, &raw);
        assert_eq!(app.platforms, vec!["windows", "macos", "linux"]);
        assert_eq!(app.dlc_appids, vec![10, 20, 30]);
    }

    #[test]
    fn extracts_categories_from_numbered_keys() {
        let raw = json!({"common": {"category": {"category_2": "1", "category_8": "0"}}});
        let app = extract(1, &raw);
        assert_eq!(app.categories.get(&2), Some(&true));
        assert_eq!(app.categories.get(&8), Some(&false));
    }

    #[test]
    fn extracts_tag_ids_ignoring_keys() {
        let raw = json!({"common": {"store_tags": {"0": "492", "1": "1663"}}});
        let app = extract(1, &raw);
        assert_eq!(app.store_tags, vec![492, 1663]);
    }

    #[test]
    fn tag_rank_survives_double_digit_keys() {
        // Lexicographic key order would sort "10" and "11" before "2", which
        // would scramble rank on any record with 10+ tags. With
        // `preserve_order` enabled, document order ("0".."11") is preserved.
        let raw = json!({"common": {"store_tags": {
            "0": "100", "1": "101", "2": "102", "3": "103", "4": "104",
            "5": "105", "6": "106", "7": "107", "8": "108", "9": "109",
            "10": "110", "11": "111"
        }}});
        let app = extract(1, &raw);
        assert_eq!(app.store_tags, vec![100, 101, 102, 103, 104, 105, 106, 107, 108, 109, 110, 111]);
    }

    #[test]
    fn extracts_build_id_and_last_update_from_public_branch() {
        let raw = json!({
            "depots": {"branches": {"public": {"buildid": "12345", "timeupdated": "1700000000"}}}
        });
        let app = extract(1, &raw);
        assert_eq!(app.current_build_id.as_deref(), Some("12345"));
        assert!(app.last_update_timestamp.is_some());
    }

    #[test]
    fn missing_fields_default_rather_than_fail() {
        let raw = json!({});
        let app = extract(1, &raw);
        assert!(app.name.is_none());
        assert!(app.steam_deck.is_none());
        assert!(app.dlc_appids.is_empty());
    }

    #[test]
    fn has_workshop_true_when_config_has_workshop_key() {
        let raw = json!({"config": {"workshop": {}}});
        let app = extract(1, &raw);
        assert!(app.has_workshop);
    }

    #[test]
    fn is_free_requires_exact_string_one() {
        let raw = json!({"common": {"isfreeapp": "0"}});
        let app = extract(1, &raw);
        assert!(!app.is_free);
    }
}
