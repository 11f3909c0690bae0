//! Record store abstractions for courses, platforms and snapshots.
//!
//! Two backends are provided:
//! - [`MemoryStore`]: process-local, used by tests and dry runs
//! - [`LocalStorage`]: JSON files under a directory, written atomically
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── platforms.json     # Known sources and their ids
//! ├── courses.json       # Current state of every course
//! └── snapshots.jsonl    # Append-only observations, one JSON per line
//! ```

pub mod local;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Course, Platform, PlatformConfig, Snapshot};

pub use local::LocalStorage;
pub use memory::MemoryStore;

/// Bounds for `find_pending` limits.
pub const PENDING_LIMIT_MAX: usize = 500;
/// Bounds for `find_latest` page sizes.
pub const PAGE_SIZE_MAX: usize = 100;

/// Filters for the latest-courses query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatestQuery {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub only_free: bool,
    /// Only courses updated at or after this instant
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Zero-based page
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub size: usize,
}

impl LatestQuery {
    pub fn page_size(&self) -> usize {
        self.size.clamp(1, PAGE_SIZE_MAX)
    }
}

/// Persistence for courses and their snapshots.
#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Course>>;

    /// Insert a new course or update the mutable fields of an existing one.
    ///
    /// The identity hash, platform, creation time and delivery marker of an
    /// existing course never change through this call.
    async fn upsert(&self, course: &Course) -> Result<Course>;

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<Snapshot>;

    async fn snapshots_for(&self, course_id: i64) -> Result<Vec<Snapshot>>;

    /// Most recently updated courses matching the filters.
    async fn find_latest(&self, query: &LatestQuery) -> Result<Vec<Course>>;

    /// Undelivered courses of a platform, oldest first. `limit` is clamped to 1..=500.
    async fn find_pending(&self, platform: &str, limit: usize) -> Result<Vec<Course>>;

    /// Set the delivery marker on courses that do not have one yet.
    async fn mark_notified(&self, ids: &[i64]) -> Result<usize>;
}

/// Resolution of source names to durable identifiers.
#[async_trait]
pub trait PlatformRegistry: Send + Sync {
    /// Case-insensitive lookup by name.
    async fn find_platform(&self, name: &str) -> Result<Option<Platform>>;

    async fn platforms(&self) -> Result<Vec<Platform>>;
}

/// Merge configured platforms into a known list, keeping existing ids.
pub fn sync_platforms(known: &mut Vec<Platform>, configured: &[PlatformConfig]) {
    for cfg in configured {
        match known.iter_mut().find(|p| p.is_named(&cfg.name)) {
            Some(existing) => {
                existing.base_url = cfg.base_url.clone();
                existing.enabled = cfg.enabled;
            }
            None => {
                let id = known.iter().map(|p| p.id).max().unwrap_or(0) + 1;
                known.push(Platform {
                    id,
                    name: cfg.name.to_ascii_lowercase(),
                    base_url: cfg.base_url.clone(),
                    enabled: cfg.enabled,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_keeps_ids_and_appends_new() {
        let mut known = vec![Platform {
            id: 7,
            name: "evg".into(),
            base_url: String::new(),
            enabled: true,
        }];
        let mut evg = PlatformConfig::named("EVG");
        evg.enabled = false;
        sync_platforms(&mut known, &[evg, PlatformConfig::named("fgv")]);

        assert_eq!(known.len(), 2);
        assert_eq!(known[0].id, 7);
        assert!(!known[0].enabled);
        assert_eq!(known[1].id, 8);
        assert_eq!(known[1].name, "fgv");
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(LatestQuery::default().page_size(), 1);
        let q = LatestQuery {
            size: 1000,
            ..LatestQuery::default()
        };
        assert_eq!(q.page_size(), 100);
    }
}
