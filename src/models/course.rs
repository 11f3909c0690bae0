//! Course record and its content identity.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identity of a listing, derived from its title and absolute URL.
///
/// This is the only key used to decide whether a harvested listing was seen
/// before, so it must never change once a record is stored.
pub fn identity_hash(title: &str, abs_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(abs_url.as_bytes());
    hex::encode(hasher.finalize())
}

/// A harvested course listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Course {
    /// Store-assigned id, `None` until persisted
    #[serde(default)]
    pub id: Option<i64>,

    /// Owning platform, resolved by name before persistence
    #[serde(default)]
    pub platform_id: Option<i64>,

    /// Content identity hash (see [`identity_hash`])
    pub external_id_hash: String,

    pub title: String,

    /// Absolute URL of the course page
    pub url: String,

    /// Provider label shown to users (e.g. "EVG")
    pub provider: String,

    /// Topical area guessed from the title
    #[serde(default)]
    pub area: Option<String>,

    pub free: bool,

    #[serde(default)]
    pub start_date: Option<NaiveDate>,

    #[serde(default)]
    pub end_date: Option<NaiveDate>,

    #[serde(default)]
    pub status_text: Option<String>,

    #[serde(default)]
    pub price_text: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    /// Delivery marker: `None` while pending, set once on delivery
    #[serde(default)]
    pub notified_at: Option<DateTime<Utc>>,
}

impl Course {
    /// Build an unsaved candidate from an extracted (title, url) pair.
    pub fn candidate(title: &str, abs_url: &str, provider: &str) -> Self {
        let title = title.trim();
        Self {
            id: None,
            platform_id: None,
            external_id_hash: identity_hash(title, abs_url),
            title: title.to_string(),
            url: abs_url.to_string(),
            provider: provider.to_string(),
            area: None,
            free: false,
            start_date: None,
            end_date: None,
            status_text: None,
            price_text: None,
            created_at: None,
            updated_at: None,
            notified_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.notified_at.is_none()
    }

    /// Human-friendly status, with the catalogs' usual default.
    pub fn status_or_default(&self) -> &str {
        match self.status_text.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => "Online (EAD)",
        }
    }
}
