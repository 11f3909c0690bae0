//! Local filesystem storage implementation.
//!
//! Keeps the full course table in memory and rewrites `courses.json`
//! atomically after every mutation. Snapshots are appended to
//! `snapshots.jsonl` and never rewritten.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── platforms.json
//! ├── courses.json
//! └── snapshots.jsonl
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{Course, Platform, PlatformConfig, Snapshot};
use crate::storage::memory::StoreState;
use crate::storage::{CourseStore, LatestQuery, PlatformRegistry, sync_platforms};

const PLATFORMS_KEY: &str = "platforms.json";
const COURSES_KEY: &str = "courses.json";
const SNAPSHOTS_KEY: &str = "snapshots.jsonl";

/// JSON-file store rooted at a directory.
///
/// Mutations are applied to a copy of the state and swapped in only after
/// `courses.json` has been written.
pub struct LocalStorage {
    root_dir: PathBuf,
    state: Mutex<StoreState>,
    next_snapshot_id: Mutex<i64>,
}

impl LocalStorage {
    /// Open (or create) a store, merging configured platforms into the saved list.
    pub async fn open(root_dir: impl Into<PathBuf>, configured: &[PlatformConfig]) -> Result<Self> {
        let root_dir = root_dir.into();
        tokio::fs::create_dir_all(&root_dir).await?;

        let mut storage = Self {
            root_dir,
            state: Mutex::new(StoreState::default()),
            next_snapshot_id: Mutex::new(1),
        };

        let mut platforms: Vec<Platform> = storage.read_json(PLATFORMS_KEY).await?.unwrap_or_default();
        sync_platforms(&mut platforms, configured);
        storage.write_json(PLATFORMS_KEY, &platforms).await?;

        let courses: Vec<Course> = storage.read_json(COURSES_KEY).await?.unwrap_or_default();
        let snapshot_lines = storage.count_lines(SNAPSHOTS_KEY).await?;
        log::info!(
            "storage opened dir={:?} platforms={} courses={} snapshots={}",
            storage.root_dir,
            platforms.len(),
            courses.len(),
            snapshot_lines
        );

        storage.state = Mutex::new(StoreState::new(platforms, courses));
        storage.next_snapshot_id = Mutex::new(snapshot_lines as i64 + 1);
        Ok(storage)
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn count_lines(&self, key: &str) -> Result<usize> {
        Ok(self
            .read_bytes(key)
            .await?
            .map(|bytes| bytes.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count())
            .unwrap_or(0))
    }

    async fn append_line<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(key))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn persist_courses(&self, state: &StoreState) -> Result<()> {
        self.write_json(COURSES_KEY, &state.courses).await
    }
}

#[async_trait]
impl CourseStore for LocalStorage {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Course>> {
        Ok(self.state.lock().await.find_by_hash(hash).cloned())
    }

    async fn upsert(&self, course: &Course) -> Result<Course> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let saved = next.upsert(course)?;
        self.persist_courses(&next).await?;
        *state = next;
        Ok(saved)
    }

    async fn save_snapshot(&self, mut snapshot: Snapshot) -> Result<Snapshot> {
        if !self.state.lock().await.contains_course(snapshot.course_id) {
            return Err(AppError::store(format!(
                "snapshot for unknown course {}",
                snapshot.course_id
            )));
        }
        let mut next_id = self.next_snapshot_id.lock().await;
        snapshot.id = Some(*next_id);
        self.append_line(SNAPSHOTS_KEY, &snapshot).await?;
        *next_id += 1;
        Ok(snapshot)
    }

    async fn snapshots_for(&self, course_id: i64) -> Result<Vec<Snapshot>> {
        let Some(bytes) = self.read_bytes(SNAPSHOTS_KEY).await? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for line in bytes.split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
            let snapshot: Snapshot = serde_json::from_slice(line)?;
            if snapshot.course_id == course_id {
                out.push(snapshot);
            }
        }
        Ok(out)
    }

    async fn find_latest(&self, query: &LatestQuery) -> Result<Vec<Course>> {
        Ok(self.state.lock().await.find_latest(query))
    }

    async fn find_pending(&self, platform: &str, limit: usize) -> Result<Vec<Course>> {
        Ok(self.state.lock().await.find_pending(platform, limit))
    }

    async fn mark_notified(&self, ids: &[i64]) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let marked = next.mark_notified(ids);
        if marked > 0 {
            self.persist_courses(&next).await?;
            *state = next;
        }
        Ok(marked)
    }
}

#[async_trait]
impl PlatformRegistry for LocalStorage {
    async fn find_platform(&self, name: &str) -> Result<Option<Platform>> {
        Ok(self.state.lock().await.find_platform(name).cloned())
    }

    async fn platforms(&self) -> Result<Vec<Platform>> {
        Ok(self.state.lock().await.platforms.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn configured() -> Vec<PlatformConfig> {
        vec![PlatformConfig::named("evg"), PlatformConfig::named("sebrae")]
    }

    fn course(title: &str) -> Course {
        let mut c = Course::candidate(title, &format!("https://x.br/{title}"), "EVG");
        c.platform_id = Some(1);
        c
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::open(tmp.path(), &[]).await.unwrap();

        storage.write_bytes("test.txt", b"hello").await.unwrap();
        let data = storage.read_bytes("test.txt").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
        assert!(!tmp.path().join("test.tmp").exists());
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::open(tmp.path(), &[]).await.unwrap();

        let data = storage.read_bytes("nope.txt").await.unwrap();
        assert!(data.is_none());
    }

    #[tokio::test]
    async fn courses_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let storage = LocalStorage::open(tmp.path(), &configured()).await.unwrap();
            let saved = storage.upsert(&course("a")).await.unwrap();
            storage.upsert(&course("b")).await.unwrap();
            storage
                .save_snapshot(Snapshot::observe(saved.id.unwrap(), None, None))
                .await
                .unwrap();
            storage.mark_notified(&[1]).await.unwrap();
        }

        let storage = LocalStorage::open(tmp.path(), &configured()).await.unwrap();
        let a = storage
            .find_by_hash(&course("a").external_id_hash)
            .await
            .unwrap()
            .unwrap();
        assert!(a.notified_at.is_some());

        let pending = storage.find_pending("evg", 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "b");

        let c = storage.upsert(&course("c")).await.unwrap();
        assert_eq!(c.id, Some(3));

        let snap = storage
            .save_snapshot(Snapshot::observe(3, None, None))
            .await
            .unwrap();
        assert_eq!(snap.id, Some(2));
        assert_eq!(storage.snapshots_for(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_write_leaves_state_untouched() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::open(tmp.path(), &configured()).await.unwrap();
        storage.upsert(&course("a")).await.unwrap();

        // a directory in place of the temp file makes the atomic write fail
        let blocker = tmp.path().join("courses.tmp");
        std::fs::create_dir(&blocker).unwrap();

        assert!(storage.upsert(&course("b")).await.is_err());
        let b_hash = course("b").external_id_hash;
        assert!(storage.find_by_hash(&b_hash).await.unwrap().is_none());

        assert!(storage.mark_notified(&[1]).await.is_err());
        assert_eq!(storage.find_pending("evg", 10).await.unwrap().len(), 1);

        std::fs::remove_dir(&blocker).unwrap();
        let b = storage.upsert(&course("b")).await.unwrap();
        assert_eq!(b.id, Some(2));

        let reopened = LocalStorage::open(tmp.path(), &configured()).await.unwrap();
        assert!(reopened.find_by_hash(&b_hash).await.unwrap().is_some());
        assert_eq!(reopened.find_pending("evg", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn platform_ids_are_stable_across_config_changes() {
        let tmp = TempDir::new().unwrap();
        LocalStorage::open(tmp.path(), &configured()).await.unwrap();

        let reordered = vec![PlatformConfig::named("fgv"), PlatformConfig::named("SEBRAE")];
        let storage = LocalStorage::open(tmp.path(), &reordered).await.unwrap();

        let sebrae = storage.find_platform("sebrae").await.unwrap().unwrap();
        let fgv = storage.find_platform("fgv").await.unwrap().unwrap();
        assert_eq!(sebrae.id, 2);
        assert_eq!(fgv.id, 3);
        assert_eq!(storage.platforms().await.unwrap().len(), 3);
    }
}
