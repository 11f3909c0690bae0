//! Change detection between a collected batch and the store.
//!
//! Every candidate is persisted (insert or in-place update) and observed
//! through a snapshot. Only courses that did not exist before are reported
//! as new; relevant updates are stored but never announced.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Course, Snapshot};
use crate::storage::CourseStore;

/// Per-batch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub processed: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Persisted courses whose snapshot could not be written
    pub snapshot_failed: usize,
}

/// Outcome of one detection pass.
#[derive(Debug, Clone, Default)]
pub struct ChangeReport {
    /// Inserted courses, in batch order
    pub new: Vec<Course>,
    /// Existing courses whose status, price or dates changed
    pub updated: Vec<Course>,
    pub counts: ChangeCounts,
}

impl ChangeReport {
    pub fn has_changes(&self) -> bool {
        !self.new.is_empty() || !self.updated.is_empty()
    }
}

enum Outcome {
    New(Course),
    Updated(Course),
    Unchanged,
}

/// True when status, price or either date differ (exact, null-safe comparison).
pub fn is_relevant_update(stored: &Course, incoming: &Course) -> bool {
    stored.status_text != incoming.status_text
        || stored.price_text != incoming.price_text
        || stored.start_date != incoming.start_date
        || stored.end_date != incoming.end_date
}

/// Classifies candidates against stored state and persists them.
#[derive(Clone)]
pub struct ChangeDetector {
    store: Arc<dyn CourseStore>,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn CourseStore>) -> Self {
        Self { store }
    }

    /// Persist the batch and report which courses are new.
    ///
    /// Candidates must already carry `platform_id`. Store failures on a
    /// single item are logged and counted; the rest of the batch continues.
    pub async fn compute_new_or_updated(&self, batch: &[Course]) -> ChangeReport {
        let mut report = ChangeReport::default();

        for candidate in batch {
            if candidate.external_id_hash.trim().is_empty() || candidate.platform_id.is_none() {
                log::debug!("skipping candidate without hash or platform title={:?}", candidate.title);
                report.counts.skipped += 1;
                continue;
            }
            report.counts.processed += 1;

            match self.detect_one(candidate, &mut report.counts).await {
                Ok(Outcome::New(course)) => {
                    report.counts.new += 1;
                    report.new.push(course);
                }
                Ok(Outcome::Updated(course)) => {
                    report.counts.updated += 1;
                    report.updated.push(course);
                }
                Ok(Outcome::Unchanged) => report.counts.unchanged += 1,
                Err(AppError::Validation(message)) => {
                    log::warn!(
                        "invalid candidate hash={} title={:?}: {}",
                        candidate.external_id_hash,
                        candidate.title,
                        message
                    );
                    report.counts.skipped += 1;
                }
                Err(e) => {
                    log::error!(
                        "store failure hash={} title={:?}: {}",
                        candidate.external_id_hash,
                        candidate.title,
                        e
                    );
                    report.counts.failed += 1;
                }
            }
        }

        log::info!(
            "change detection processed={} new={} updated={} unchanged={} skipped={} failed={} snapshot_failed={}",
            report.counts.processed,
            report.counts.new,
            report.counts.updated,
            report.counts.unchanged,
            report.counts.skipped,
            report.counts.failed,
            report.counts.snapshot_failed
        );
        report
    }

    async fn detect_one(&self, candidate: &Course, counts: &mut ChangeCounts) -> Result<Outcome> {
        match self.store.find_by_hash(&candidate.external_id_hash).await? {
            None => {
                let saved = self.store.upsert(candidate).await?;
                self.safe_snapshot(&saved, candidate, counts).await;
                Ok(Outcome::New(saved))
            }
            Some(stored) if is_relevant_update(&stored, candidate) => {
                let saved = self.store.upsert(candidate).await?;
                self.safe_snapshot(&saved, candidate, counts).await;
                log::debug!("relevant update hash={}", saved.external_id_hash);
                Ok(Outcome::Updated(saved))
            }
            Some(stored) => {
                self.safe_snapshot(&stored, candidate, counts).await;
                Ok(Outcome::Unchanged)
            }
        }
    }

    /// Snapshot failures never undo the classification of a stored course.
    async fn safe_snapshot(&self, saved: &Course, observed: &Course, counts: &mut ChangeCounts) {
        if let Err(e) = self.snapshot(saved, observed).await {
            log::error!(
                "snapshot failure hash={} title={:?}: {}",
                saved.external_id_hash,
                saved.title,
                e
            );
            counts.snapshot_failed += 1;
        }
    }

    async fn snapshot(&self, saved: &Course, observed: &Course) -> Result<()> {
        let course_id = saved
            .id
            .ok_or_else(|| AppError::store(format!("course {} has no id", saved.external_id_hash)))?;
        let mut snapshot = Snapshot::observe(
            course_id,
            observed.status_text.clone(),
            observed.price_text.clone(),
        );
        snapshot.raw_json = serde_json::to_string(observed).ok();
        self.store.save_snapshot(snapshot).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlatformConfig;
    use crate::storage::{LatestQuery, MemoryStore};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    /// Delegates to a memory store but refuses every snapshot.
    struct NoSnapshots(MemoryStore);

    #[async_trait]
    impl CourseStore for NoSnapshots {
        async fn find_by_hash(&self, hash: &str) -> Result<Option<Course>> {
            self.0.find_by_hash(hash).await
        }
        async fn upsert(&self, course: &Course) -> Result<Course> {
            self.0.upsert(course).await
        }
        async fn save_snapshot(&self, _: Snapshot) -> Result<Snapshot> {
            Err(AppError::store("snapshot log unavailable"))
        }
        async fn snapshots_for(&self, course_id: i64) -> Result<Vec<Snapshot>> {
            self.0.snapshots_for(course_id).await
        }
        async fn find_latest(&self, query: &LatestQuery) -> Result<Vec<Course>> {
            self.0.find_latest(query).await
        }
        async fn find_pending(&self, platform: &str, limit: usize) -> Result<Vec<Course>> {
            self.0.find_pending(platform, limit).await
        }
        async fn mark_notified(&self, ids: &[i64]) -> Result<usize> {
            self.0.mark_notified(ids).await
        }
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::from_config(&[PlatformConfig::named("evg")]))
    }

    fn candidate(title: &str) -> Course {
        let mut c = Course::candidate(title, &format!("https://x.br/curso/{title}"), "EVG");
        c.platform_id = Some(1);
        c.status_text = Some("Online (EAD)".into());
        c
    }

    #[test]
    fn relevance_is_exact_and_null_safe() {
        let a = candidate("a");
        let mut b = a.clone();
        assert!(!is_relevant_update(&a, &b));

        b.status_text = Some("online (ead)".into());
        assert!(is_relevant_update(&a, &b));

        let mut c = a.clone();
        c.end_date = NaiveDate::from_ymd_opt(2025, 1, 1);
        assert!(is_relevant_update(&a, &c));

        let mut d = a.clone();
        d.title = "renamed".into();
        d.area = Some("Tecnologia".into());
        assert!(!is_relevant_update(&a, &d));
    }

    #[tokio::test]
    async fn second_pass_finds_nothing_new() {
        let store = store();
        let detector = ChangeDetector::new(store.clone());
        let batch = vec![candidate("a"), candidate("b"), candidate("c")];

        let first = detector.compute_new_or_updated(&batch).await;
        assert_eq!(first.new.len(), 3);
        assert_eq!(store.snapshot_count().unwrap(), 3);

        let second = detector.compute_new_or_updated(&batch).await;
        assert!(second.new.is_empty());
        assert_eq!(second.counts.unchanged, 3);
        assert_eq!(store.snapshot_count().unwrap(), 6);
    }

    #[tokio::test]
    async fn status_change_updates_without_announcing() {
        let store = store();
        let detector = ChangeDetector::new(store.clone());
        detector.compute_new_or_updated(&[candidate("a")]).await;

        let mut changed = candidate("a");
        changed.status_text = Some("Encerrado".into());
        let report = detector.compute_new_or_updated(&[changed]).await;

        assert!(report.new.is_empty());
        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.counts.updated, 1);
        assert_eq!(store.snapshot_count().unwrap(), 2);
        let stored = store.courses().unwrap();
        assert_eq!(stored[0].status_text.as_deref(), Some("Encerrado"));
    }

    #[tokio::test]
    async fn invalid_candidates_are_skipped() {
        let detector = ChangeDetector::new(store());
        let mut no_platform = candidate("a");
        no_platform.platform_id = None;
        let mut no_hash = candidate("b");
        no_hash.external_id_hash = " ".into();
        let mut unknown_platform = candidate("c");
        unknown_platform.platform_id = Some(99);

        let report = detector
            .compute_new_or_updated(&[no_platform, no_hash, unknown_platform, candidate("d")])
            .await;
        assert_eq!(report.counts.skipped, 2);
        assert_eq!(report.counts.failed, 1);
        assert_eq!(report.counts.new, 1);
    }

    #[tokio::test]
    async fn snapshot_failure_still_reports_new_and_updated() {
        let store = Arc::new(NoSnapshots(MemoryStore::from_config(&[PlatformConfig::named(
            "evg",
        )])));
        let detector = ChangeDetector::new(store.clone());

        let first = detector
            .compute_new_or_updated(&[candidate("a"), candidate("b")])
            .await;
        assert_eq!(first.new.len(), 2);
        assert_eq!(first.counts.failed, 0);
        assert_eq!(first.counts.snapshot_failed, 2);

        let mut changed = candidate("a");
        changed.status_text = Some("Encerrado".into());
        let second = detector.compute_new_or_updated(&[changed, candidate("b")]).await;
        assert_eq!(second.updated.len(), 1);
        assert_eq!(second.counts.unchanged, 1);
        assert_eq!(second.counts.snapshot_failed, 2);
        assert_eq!(store.0.courses().unwrap().len(), 2);
    }
}
