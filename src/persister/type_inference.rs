//! §4.4.3 — name-based type inference, used only when the extractor's
//! `app_type` came back `None`. DLC is deliberately unreachable here: a
//! name alone is never sufficient evidence that something is DLC, so the
//! fallback always lands on one of the five name-pattern buckets or `Game`.

use crate::domain::AppType;

pub fn infer(name: Option<&str>) -> AppType {
    let Some(name) = name else {
        return AppType::Game;
    };
    let lower = name.to_ascii_lowercase();

    if is_demo(&lower) {
        return AppType::Demo;
    }
    if contains_any(&lower, &["soundtrack", " ost", "original score", "music pack"]) {
        return AppType::Music;
    }
    if contains_any(&lower, &[" sdk", "dedicated server", "level editor", "modding tool"]) {
        return AppType::Tool;
    }
    if contains_any(&lower, &["trailer", "- video", "making of", "behind the scenes"]) {
        return AppType::Video;
    }
    AppType::Game
}

fn is_demo(lower: &str) -> bool {
    if contains_any(lower, &["demon", "democracy", "demolition"]) {
        return false;
    }
    lower.contains(" demo") || lower.ends_with(" demo") || lower.contains("(demo)") || lower.contains("[demo]")
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}
