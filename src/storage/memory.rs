//! In-memory record store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{Course, Platform, PlatformConfig, Snapshot};
use crate::storage::{
    CourseStore, LatestQuery, PENDING_LIMIT_MAX, PlatformRegistry, sync_platforms,
};

/// Store contents shared by the memory and file backends.
#[derive(Debug, Default, Clone)]
pub struct StoreState {
    pub platforms: Vec<Platform>,
    pub courses: Vec<Course>,
    by_hash: HashMap<String, usize>,
    next_course_id: i64,
}

impl StoreState {
    pub fn new(platforms: Vec<Platform>, courses: Vec<Course>) -> Self {
        let mut state = Self {
            platforms,
            courses,
            by_hash: HashMap::new(),
            next_course_id: 0,
        };
        state.reindex();
        state
    }

    fn reindex(&mut self) {
        self.by_hash = self
            .courses
            .iter()
            .enumerate()
            .map(|(i, c)| (c.external_id_hash.clone(), i))
            .collect();
        self.next_course_id = self.courses.iter().filter_map(|c| c.id).max().unwrap_or(0) + 1;
    }

    pub fn find_by_hash(&self, hash: &str) -> Option<&Course> {
        self.by_hash.get(hash).map(|&i| &self.courses[i])
    }

    pub fn upsert(&mut self, incoming: &Course) -> Result<Course> {
        if incoming.external_id_hash.trim().is_empty() {
            return Err(AppError::validation("course without identity hash"));
        }
        let now = Utc::now();

        if let Some(&i) = self.by_hash.get(&incoming.external_id_hash) {
            let existing = &mut self.courses[i];
            existing.title = incoming.title.clone();
            existing.url = incoming.url.clone();
            existing.provider = incoming.provider.clone();
            existing.area = incoming.area.clone();
            existing.free = incoming.free;
            existing.start_date = incoming.start_date;
            existing.end_date = incoming.end_date;
            existing.status_text = incoming.status_text.clone();
            existing.price_text = incoming.price_text.clone();
            if existing.platform_id.is_none() {
                existing.platform_id = incoming.platform_id;
            }
            existing.updated_at = Some(now);
            return Ok(existing.clone());
        }

        let platform_id = incoming
            .platform_id
            .ok_or_else(|| AppError::validation("course without platform id"))?;
        if !self.platforms.iter().any(|p| p.id == platform_id) {
            return Err(AppError::store(format!("unknown platform id {platform_id}")));
        }

        let mut course = incoming.clone();
        course.id = Some(self.next_course_id);
        course.created_at = Some(now);
        course.updated_at = Some(now);
        course.notified_at = None;
        self.next_course_id += 1;

        self.by_hash
            .insert(course.external_id_hash.clone(), self.courses.len());
        self.courses.push(course.clone());
        Ok(course)
    }

    pub fn contains_course(&self, id: i64) -> bool {
        self.courses.iter().any(|c| c.id == Some(id))
    }

    pub fn find_platform(&self, name: &str) -> Option<&Platform> {
        self.platforms.iter().find(|p| p.is_named(name))
    }

    pub fn find_latest(&self, query: &LatestQuery) -> Vec<Course> {
        let platform_id = match &query.platform {
            Some(name) => match self.find_platform(name) {
                Some(p) => Some(p.id),
                None => return Vec::new(),
            },
            None => None,
        };

        let mut matches: Vec<&Course> = self
            .courses
            .iter()
            .filter(|c| platform_id.is_none() || c.platform_id == platform_id)
            .filter(|c| match &query.area {
                Some(area) => c.area.as_deref() == Some(area.as_str()),
                None => true,
            })
            .filter(|c| !query.only_free || c.free)
            .filter(|c| match query.since {
                Some(since) => c.updated_at.is_some_and(|u| u >= since),
                None => true,
            })
            .collect();

        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));

        let size = query.page_size();
        matches
            .into_iter()
            .skip(query.page.saturating_mul(size))
            .take(size)
            .cloned()
            .collect()
    }

    pub fn find_pending(&self, platform: &str, limit: usize) -> Vec<Course> {
        let Some(platform_id) = self.find_platform(platform).map(|p| p.id) else {
            return Vec::new();
        };

        let mut pending: Vec<&Course> = self
            .courses
            .iter()
            .filter(|c| c.platform_id == Some(platform_id) && c.is_pending())
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending
            .into_iter()
            .take(limit.clamp(1, PENDING_LIMIT_MAX))
            .cloned()
            .collect()
    }

    pub fn mark_notified(&mut self, ids: &[i64]) -> usize {
        let now = Utc::now();
        let mut marked = 0;
        for course in self.courses.iter_mut() {
            if course.notified_at.is_none() && course.id.is_some_and(|id| ids.contains(&id)) {
                course.notified_at = Some(now);
                marked += 1;
            }
        }
        marked
    }
}

/// Process-local store guarded by a mutex that is never held across `.await`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    snapshots: Mutex<Vec<Snapshot>>,
}

impl MemoryStore {
    pub fn new(platforms: Vec<Platform>) -> Self {
        Self {
            state: Mutex::new(StoreState::new(platforms, Vec::new())),
            snapshots: Mutex::new(Vec::new()),
        }
    }

    /// Store seeded with the configured platforms, ids assigned in order.
    pub fn from_config(platforms: &[PlatformConfig]) -> Self {
        let mut known = Vec::new();
        sync_platforms(&mut known, platforms);
        Self::new(known)
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| AppError::store("memory store lock poisoned"))
    }

    fn snapshot_log(&self) -> Result<MutexGuard<'_, Vec<Snapshot>>> {
        self.snapshots
            .lock()
            .map_err(|_| AppError::store("snapshot log lock poisoned"))
    }

    /// All stored courses, in insertion order.
    pub fn courses(&self) -> Result<Vec<Course>> {
        Ok(self.state()?.courses.clone())
    }

    pub fn snapshot_count(&self) -> Result<usize> {
        Ok(self.snapshot_log()?.len())
    }
}

#[async_trait]
impl CourseStore for MemoryStore {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Course>> {
        Ok(self.state()?.find_by_hash(hash).cloned())
    }

    async fn upsert(&self, course: &Course) -> Result<Course> {
        self.state()?.upsert(course)
    }

    async fn save_snapshot(&self, mut snapshot: Snapshot) -> Result<Snapshot> {
        if !self.state()?.contains_course(snapshot.course_id) {
            return Err(AppError::store(format!(
                "snapshot for unknown course {}",
                snapshot.course_id
            )));
        }
        let mut log = self.snapshot_log()?;
        snapshot.id = Some(log.len() as i64 + 1);
        log.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn snapshots_for(&self, course_id: i64) -> Result<Vec<Snapshot>> {
        Ok(self
            .snapshot_log()?
            .iter()
            .filter(|s| s.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn find_latest(&self, query: &LatestQuery) -> Result<Vec<Course>> {
        Ok(self.state()?.find_latest(query))
    }

    async fn find_pending(&self, platform: &str, limit: usize) -> Result<Vec<Course>> {
        Ok(self.state()?.find_pending(platform, limit))
    }

    async fn mark_notified(&self, ids: &[i64]) -> Result<usize> {
        Ok(self.state()?.mark_notified(ids))
    }
}

#[async_trait]
impl PlatformRegistry for MemoryStore {
    async fn find_platform(&self, name: &str) -> Result<Option<Platform>> {
        Ok(self.state()?.find_platform(name).cloned())
    }

    async fn platforms(&self) -> Result<Vec<Platform>> {
        Ok(self.state()?.platforms.clone())
    }
}
