// src/pipeline/pending.rs

//! Recovery of courses whose announcement never went out.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::PendingConfig;
use crate::notify::NotificationPort;
use crate::storage::{CourseStore, PENDING_LIMIT_MAX};
use crate::utils::retry::sleep_or_cancel;

/// Result of flushing one platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub pending: usize,
    pub batches_sent: usize,
    pub batches_failed: usize,
    pub marked: usize,
}

pub struct PendingNotifier {
    store: Arc<dyn CourseStore>,
    port: Arc<dyn NotificationPort>,
    per_message: usize,
    max_per_run: usize,
    batch_delay: Duration,
    cancel: CancellationToken,
}

impl PendingNotifier {
    pub fn new(store: Arc<dyn CourseStore>, port: Arc<dyn NotificationPort>, config: &PendingConfig) -> Self {
        Self {
            store,
            port,
            per_message: config.per_message.max(1),
            max_per_run: if config.max_per_run == 0 {
                PENDING_LIMIT_MAX
            } else {
                config.max_per_run
            },
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between batches and between platforms once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Deliver pending courses of one platform and mark the delivered ones.
    ///
    /// Only ids from successful batches are marked, in a single call at the end,
    /// including when shutdown cuts the loop short.
    pub async fn flush_platform(&self, platform: &str) -> Result<FlushReport> {
        let pending = self.store.find_pending(platform, self.max_per_run).await?;
        let mut report = FlushReport {
            pending: pending.len(),
            ..FlushReport::default()
        };
        if pending.is_empty() {
            log::debug!("no pending courses platform={}", platform);
            return Ok(report);
        }

        let batches: Vec<_> = pending.chunks(self.per_message).collect();
        let total = batches.len();
        let mut delivered = Vec::with_capacity(pending.len());

        for (i, batch) in batches.into_iter().enumerate() {
            match self.port.notify_new_courses(platform, batch).await {
                Ok(()) => {
                    report.batches_sent += 1;
                    delivered.extend(batch.iter().filter_map(|c| c.id));
                }
                Err(e) => {
                    report.batches_failed += 1;
                    log::warn!(
                        "pending batch {}/{} failed platform={} size={}: {}",
                        i + 1,
                        total,
                        platform,
                        batch.len(),
                        e
                    );
                }
            }
            if i + 1 < total && !sleep_or_cancel(self.batch_delay, &self.cancel).await {
                log::warn!(
                    "pending flush interrupted platform={} after batch {}/{}",
                    platform,
                    i + 1,
                    total
                );
                break;
            }
        }

        if !delivered.is_empty() {
            report.marked = self.store.mark_notified(&delivered).await?;
        }

        log::info!(
            "pending flush platform={} pending={} batches_ok={} batches_failed={} marked={}",
            platform,
            report.pending,
            report.batches_sent,
            report.batches_failed,
            report.marked
        );
        Ok(report)
    }

    /// Flush each platform in order; one platform's error does not stop the others.
    /// Platforms not reached before cancellation are left out of the result.
    pub async fn flush_all(&self, platforms: &[String]) -> Vec<(String, Result<FlushReport>)> {
        let mut results = Vec::with_capacity(platforms.len());
        for platform in platforms {
            if self.cancel.is_cancelled() {
                log::warn!("pending flush cancelled before platform={}", platform);
                break;
            }
            let result = self.flush_platform(platform).await;
            if let Err(e) = &result {
                log::error!("pending flush failed platform={}: {}", platform, e);
            }
            results.push((platform.clone(), result));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{Course, PlatformConfig};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails the batches whose 1-based position is listed.
    #[derive(Default)]
    struct Flaky {
        failing: Vec<usize>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl NotificationPort for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn notify_new_courses(&self, _: &str, _: &[Course]) -> Result<()> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if self.failing.contains(&*calls) {
                Err(AppError::notify("flaky", "down"))
            } else {
                Ok(())
            }
        }

        async fn notify_summary(&self, _: &str, _: usize, _: Option<&str>) -> Result<()> {
            Ok(())
        }
    }

    async fn seeded(n: usize) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::from_config(&[
            PlatformConfig::named("evg"),
            PlatformConfig::named("fgv"),
        ]));
        for i in 0..n {
            let mut c = Course::candidate(&format!("c{i}"), &format!("https://x.br/{i}"), "EVG");
            c.platform_id = Some(1);
            store.upsert(&c).await.unwrap();
        }
        store
    }

    fn config() -> PendingConfig {
        PendingConfig {
            per_message: 3,
            max_per_run: 40,
            batch_delay_ms: 0,
            ..PendingConfig::default()
        }
    }

    #[tokio::test]
    async fn only_successful_batches_are_marked() {
        let store = seeded(7).await;
        let port = Arc::new(Flaky {
            failing: vec![2],
            ..Flaky::default()
        });
        let notifier = PendingNotifier::new(store.clone(), port, &config());

        let report = notifier.flush_platform("evg").await.unwrap();
        assert_eq!(report.pending, 7);
        assert_eq!(report.batches_sent, 2);
        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.marked, 4);

        let still_pending: Vec<i64> = store
            .find_pending("evg", 100)
            .await
            .unwrap()
            .iter()
            .filter_map(|c| c.id)
            .collect();
        assert_eq!(still_pending, vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn zero_max_per_run_is_not_a_single_course() {
        let store = seeded(7).await;
        let unbounded = PendingConfig {
            max_per_run: 0,
            ..config()
        };
        let notifier = PendingNotifier::new(store.clone(), Arc::new(Flaky::default()), &unbounded);

        let report = notifier.flush_platform("evg").await.unwrap();
        assert_eq!(report.pending, 7);
        assert_eq!(report.marked, 7);
    }

    #[tokio::test]
    async fn flush_is_idempotent_once_delivered() {
        let store = seeded(5).await;
        let notifier = PendingNotifier::new(store.clone(), Arc::new(Flaky::default()), &config());

        assert_eq!(notifier.flush_platform("evg").await.unwrap().marked, 5);
        let again = notifier.flush_platform("evg").await.unwrap();
        assert_eq!(again.pending, 0);
        assert_eq!(again.marked, 0);
    }

    #[tokio::test]
    async fn flush_all_covers_every_platform() {
        let store = seeded(2).await;
        let notifier = PendingNotifier::new(store, Arc::new(Flaky::default()), &config());
        let results = notifier
            .flush_all(&["evg".to_string(), "fgv".to_string(), "unknown".to_string()])
            .await;
        let marked: Vec<usize> = results
            .iter()
            .map(|(_, r)| r.as_ref().map(|r| r.marked).unwrap_or(0))
            .collect();
        assert_eq!(marked, vec![2, 0, 0]);
    }

    #[tokio::test]
    async fn cancellation_keeps_delivered_marks() {
        let store = seeded(7).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let slow = PendingConfig {
            batch_delay_ms: 60_000,
            ..config()
        };
        let notifier = PendingNotifier::new(store.clone(), Arc::new(Flaky::default()), &slow)
            .with_cancel(cancel);

        let started = std::time::Instant::now();
        let report = notifier.flush_platform("evg").await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.batches_sent, 1);
        assert_eq!(report.marked, 3);
        assert_eq!(store.find_pending("evg", 100).await.unwrap().len(), 4);

        assert!(notifier.flush_all(&["evg".to_string()]).await.is_empty());
    }
}
