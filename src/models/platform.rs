//! Harvested sources and the snapshots taken of their listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named external catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Platform {
    pub id: i64,
    pub name: String,
    /// Base address; adapters fall back to their own default when blank
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

impl Platform {
    /// Case-insensitive name match.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }

    /// Base URL without a trailing slash, or `fallback` when unset.
    pub fn base_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        let base = self.base_url.trim();
        if base.is_empty() {
            fallback
        } else {
            base.trim_end_matches('/')
        }
    }
}

/// Point-in-time observation of a course's mutable fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    #[serde(default)]
    pub id: Option<i64>,
    pub course_id: i64,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub price_text: Option<String>,
    #[serde(default)]
    pub raw_json: Option<String>,
    pub collected_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn observe(course_id: i64, status_text: Option<String>, price_text: Option<String>) -> Self {
        Self {
            id: None,
            course_id,
            status_text,
            price_text,
            raw_json: None,
            collected_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(base: &str) -> Platform {
        Platform {
            id: 1,
            name: "Sebrae".into(),
            base_url: base.into(),
            enabled: true,
        }
    }

    #[test]
    fn name_match_ignores_case() {
        assert!(platform("").is_named("sebrae"));
        assert!(platform("").is_named(" SEBRAE "));
        assert!(!platform("").is_named("fgv"));
    }

    #[test]
    fn base_falls_back_when_blank() {
        assert_eq!(platform("  ").base_or("https://d.br"), "https://d.br");
        assert_eq!(platform("https://x.br/").base_or("https://d.br"), "https://x.br");
    }
}
