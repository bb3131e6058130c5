use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The enumerated catalog type of an app, per the upstream platform's
/// own classification plus this service's `demo`/`music`/`tool`/`video`
/// fallback inference (see `crate::persister::type_inference`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    Game,
    Dlc,
    Demo,
    Mod,
    Video,
    Tool,
    Application,
    Hardware,
    Music,
    Episode,
    Series,
    Advertising,
}

impl AppType {
    /// Maps the upstream's raw `common.type` string to the enumerated type.
    /// Unknown values fall back to `Game` (the type is always included in an
    /// upsert row, so it must always resolve to something).
    pub fn from_raw(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "game" => AppType::Game,
            "dlc" => AppType::Dlc,
            "demo" => AppType::Demo,
            "mod" => AppType::Mod,
            "video" => AppType::Video,
            "tool" => AppType::Tool,
            "application" => AppType::Application,
            "hardware" => AppType::Hardware,
            "music" => AppType::Music,
            "episode" => AppType::Episode,
            "series" => AppType::Series,
            "advertising" => AppType::Advertising,
            _ => AppType::Game,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppType::Game => "game",
            AppType::Dlc => "dlc",
            AppType::Demo => "demo",
            AppType::Mod => "mod",
            AppType::Video => "video",
            AppType::Tool => "tool",
            AppType::Application => "application",
            AppType::Hardware => "hardware",
            AppType::Music => "music",
            AppType::Episode => "episode",
            AppType::Series => "series",
            AppType::Advertising => "advertising",
        }
    }
}

/// `kind` is one of `developer`, `publisher`, `franchise`, `award`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Association {
    pub kind: AssociationKind,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationKind {
    Developer,
    Publisher,
    Franchise,
    Award,
    /// Anything the upstream sends that isn't one of the four known kinds.
    /// Preserved rather than dropped, since the extractor never throws.
    Other(String),
}

impl AssociationKind {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "developer" => AssociationKind::Developer,
            "publisher" => AssociationKind::Publisher,
            "franchise" => AssociationKind::Franchise,
            "award" => AssociationKind::Award,
            other => AssociationKind::Other(other.to_string()),
        }
    }
}

/// Steam Deck compatibility info. `category` is coerced to `0` (unknown)
/// when the raw value falls outside `0..=3`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SteamDeckCompatibility {
    pub category: u8,
    pub test_timestamp: Option<i64>,
    pub tested_build_id: Option<String>,
    pub tests: Option<serde_json::Value>,
}

/// All data extracted from one raw PICS record for one app.
///
/// Produced by `crate::extractor::extract`. Every field is defensively
/// optional or defaulted: no combination of upstream input causes
/// construction of this type to fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedApp {
    pub appid: u32,
    pub name: Option<String>,
    pub app_type: Option<AppType>,

    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub associations: Vec<Association>,

    /// Deliberately unused downstream — see SPEC_FULL.md §9 ("Unreliable
    /// upstream field — `common.parent`"). Parsed here so a future
    /// validation pass can use it; the persister ignores it.
    pub parent_appid: Option<u32>,
    pub dlc_appids: Vec<u32>,

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

    /// Order-preserving: insertion order of the upstream mapping is
    /// meaningful (tag/genre rank).
    pub store_tags: Vec<u32>,
    pub genres: Vec<u32>,
    pub primary_genre: Option<u32>,
    pub categories: HashMap<u32, bool>,

    pub platforms: Vec<String>,
    pub controller_support: Option<String>,
    pub steam_deck: Option<SteamDeckCompatibility>,

    pub has_workshop: bool,
    pub is_free: bool,

    pub content_descriptors: serde_json::Value,
    pub languages: serde_json::Value,

    pub homepage_url: Option<String>,
    pub app_state: Option<String>,
}

impl ExtractedApp {
    /// An empty record for `appid`, as returned when every field is absent
    /// from the raw input. Useful as a base for tests and for the
    /// extractor's own construction.
    pub fn empty(appid: u32) -> Self {
        Self {
            appid,
            name: None,
            app_type: None,
            developer: None,
            publisher: None,
            associations: Vec::new(),
            parent_appid: None,
            dlc_appids: Vec::new(),
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
            store_tags: Vec::new(),
            genres: Vec::new(),
            primary_genre: None,
            categories: HashMap::new(),
            platforms: Vec::new(),
            controller_support: None,
            steam_deck: None,
            has_workshop: false,
            is_free: false,
            content_descriptors: serde_json::Value::Null,
            languages: serde_json::Value::Null,
            homepage_url: None,
            app_state: None,
        }
    }
}
