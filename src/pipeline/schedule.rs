// src/pipeline/schedule.rs

//! Periodic collection and pending-recovery loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::models::Config;
use crate::pipeline::collect::CollectionOrchestrator;
use crate::pipeline::pending::PendingNotifier;

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Run `collect_all_enabled` every `period` until cancelled.
///
/// The first tick fires immediately only when `run_on_start` is set.
pub async fn run_collect_loop(
    orchestrator: Arc<CollectionOrchestrator>,
    period: Duration,
    run_on_start: bool,
    cancel: CancellationToken,
) {
    let mut interval = ticker(period);
    if !run_on_start {
        interval.tick().await;
    }
    log::info!("collect loop started interval_secs={}", period.as_secs());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                orchestrator.collect_all_enabled().await;
            }
        }
    }
    log::info!("collect loop stopped");
}

/// Flush pending notifications for `platforms` every `period` until cancelled.
pub async fn run_pending_loop(
    pending: Arc<PendingNotifier>,
    platforms: Vec<String>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = ticker(period);
    log::info!(
        "pending loop started interval_secs={} platforms={}",
        period.as_secs(),
        platforms.join(",")
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                pending.flush_all(&platforms).await;
            }
        }
    }
    log::info!("pending loop stopped");
}

/// Spawn both loops as configured. Recovery is skipped when disabled.
pub fn spawn_schedulers(
    config: &Config,
    orchestrator: Arc<CollectionOrchestrator>,
    pending: Arc<PendingNotifier>,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = vec![tokio::spawn(run_collect_loop(
        orchestrator,
        Duration::from_secs(config.schedule.collect_interval_secs),
        config.schedule.run_on_start,
        cancel.clone(),
    ))];

    if config.pending.enabled {
        handles.push(tokio::spawn(run_pending_loop(
            pending,
            config.pending.platforms.clone(),
            Duration::from_secs(config.pending.interval_secs),
            cancel.clone(),
        )));
    } else {
        log::info!("pending recovery disabled");
    }
    handles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::{Course, PendingConfig, PlatformConfig};
    use crate::notify::NotificationPort;
    use crate::storage::{CourseStore, MemoryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[async_trait]
    impl NotificationPort for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn notify_new_courses(&self, _: &str, courses: &[Course]) -> Result<()> {
            self.0.fetch_add(courses.len(), Ordering::SeqCst);
            Ok(())
        }

        async fn notify_summary(&self, _: &str, _: usize, _: Option<&str>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn pending_loop_flushes_then_stops_on_cancel() {
        let store = Arc::new(MemoryStore::from_config(&[PlatformConfig::named("evg")]));
        let mut course = Course::candidate("Excel", "https://x.br/1", "EVG");
        course.platform_id = Some(1);
        store.upsert(&course).await.unwrap();

        let port = Arc::new(Counter::default());
        let pending = Arc::new(PendingNotifier::new(
            store.clone(),
            port.clone(),
            &PendingConfig::default(),
        ));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_pending_loop(
            pending,
            vec!["evg".to_string()],
            Duration::from_millis(20),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(port.0.load(Ordering::SeqCst), 1);
        assert!(store.find_pending("evg", 10).await.unwrap().is_empty());
    }
}
