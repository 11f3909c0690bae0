// tests/pipeline_flow.rs
//
// Collect → detect → dispatch → recover against a served catalog, a
// file store in a temp dir and a recording notification port.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{Router, extract::Query, response::Html, routing::get};
use course_crawler::error::{AppError, Result};
use course_crawler::models::{Config, Course, PlatformConfig};
use course_crawler::notify::NotificationPort;
use course_crawler::pipeline::{
    ChangeDetector, CollectStatus, CollectionOrchestrator, NewCourseNotifier, PendingNotifier,
};
use course_crawler::services::{AdapterRegistry, AdapterSettings, StopReason};
use course_crawler::storage::{CourseStore, LatestQuery, LocalStorage};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use common::{fast_config, fgv_cards, serve};

/// Records every call; fails new-course calls while `down` is set.
#[derive(Default)]
struct RecordingPort {
    slices: Mutex<Vec<Vec<String>>>,
    summaries: Mutex<Vec<usize>>,
    down: Mutex<bool>,
}

impl RecordingPort {
    fn set_down(&self, down: bool) {
        *self.down.lock().unwrap() = down;
    }

    fn delivered(&self) -> usize {
        self.slices.lock().unwrap().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl NotificationPort for RecordingPort {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify_new_courses(&self, _: &str, courses: &[Course]) -> Result<()> {
        if *self.down.lock().unwrap() {
            return Err(AppError::notify("recording", "channel down"));
        }
        self.slices
            .lock()
            .unwrap()
            .push(courses.iter().map(|c| c.title.clone()).collect());
        Ok(())
    }

    async fn notify_summary(&self, _: &str, total_new: usize, _: Option<&str>) -> Result<()> {
        self.summaries.lock().unwrap().push(total_new);
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    config: Config,
    storage: Arc<LocalStorage>,
    port: Arc<RecordingPort>,
    orchestrator: CollectionOrchestrator,
    pending: PendingNotifier,
}

async fn harness(base: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config();
    config.platforms = vec![PlatformConfig {
        base_url: base.to_string(),
        ..PlatformConfig::named("fgv")
    }];
    config.notify.max_per_run = 40;
    config.notify.per_message = 8;
    config.pending.per_message = 8;

    let storage = Arc::new(LocalStorage::open(dir.path(), &config.platforms).await.unwrap());
    let port = Arc::new(RecordingPort::default());
    let adapters = AdapterRegistry::with_defaults(&AdapterSettings::from_config(&config)).unwrap();
    let orchestrator = CollectionOrchestrator::new(
        Arc::new(config.clone()),
        storage.clone(),
        adapters,
        ChangeDetector::new(storage.clone()),
        NewCourseNotifier::new(port.clone(), storage.clone(), &config.notify),
        CancellationToken::new(),
    );
    let pending = PendingNotifier::new(storage.clone(), port.clone(), &config.pending);

    Harness {
        _dir: dir,
        config,
        storage,
        port,
        orchestrator,
        pending,
    }
}

/// 45 courses over pages 0..=2, then an empty page.
fn catalog() -> Router {
    Router::new().route(
        "/cursos/gratuitos",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            let page: u32 = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(99);
            let count = match page {
                0 | 1 => 20,
                2 => 5,
                _ => 0,
            };
            Html(fgv_cards(&format!("p{page}"), count))
        }),
    )
}

#[tokio::test]
async fn first_run_announces_then_second_run_is_quiet() {
    let base = serve(catalog()).await;
    let h = harness(&base).await;

    let report = h.orchestrator.collect_for_platform("fgv", Some(10)).await.unwrap();
    assert_eq!(report.status, CollectStatus::Completed);
    assert_eq!(report.stop_reason, Some(StopReason::NoCards));
    assert_eq!(report.fetched, 45);
    assert_eq!(report.changes.new, 45);

    // 40 announced in slices of 8, the remaining 5 summarized
    let sizes: Vec<usize> = h.port.slices.lock().unwrap().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![8, 8, 8, 8, 8]);
    assert_eq!(*h.port.summaries.lock().unwrap(), vec![5]);

    let second = h.orchestrator.collect_for_platform("fgv", Some(10)).await.unwrap();
    assert_eq!(second.changes.new, 0);
    assert_eq!(second.changes.unchanged, 45);
    assert_eq!(h.port.slices.lock().unwrap().len(), 5);

    let course_id = h
        .storage
        .find_latest(&LatestQuery {
            platform: Some("fgv".into()),
            size: 1,
            ..LatestQuery::default()
        })
        .await
        .unwrap()[0]
        .id
        .unwrap();
    assert_eq!(h.storage.snapshots_for(course_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn recovery_marks_only_delivered_batches() {
    let base = serve(catalog()).await;
    let h = harness(&base).await;

    // Dispatch never marks by default, so everything collected stays pending.
    h.port.set_down(true);
    h.orchestrator.collect_for_platform("fgv", Some(10)).await.unwrap();
    assert_eq!(h.port.delivered(), 0);
    assert_eq!(h.storage.find_pending("fgv", 500).await.unwrap().len(), 45);

    let failed = h.pending.flush_platform("fgv").await.unwrap();
    assert_eq!(failed.pending, 40);
    assert_eq!(failed.marked, 0);
    assert_eq!(h.storage.find_pending("fgv", 500).await.unwrap().len(), 45);

    h.port.set_down(false);
    let first = h.pending.flush_platform("fgv").await.unwrap();
    assert_eq!(first.marked, 40);
    let second = h.pending.flush_platform("fgv").await.unwrap();
    assert_eq!(second.marked, 5);
    assert!(h.storage.find_pending("fgv", 500).await.unwrap().is_empty());
    assert_eq!(h.port.delivered(), 45);

    // Oldest first: the first recovered slice starts with the first course of page 0.
    assert_eq!(h.port.slices.lock().unwrap()[0][0], "Curso p0 0");
}

#[tokio::test]
async fn unknown_and_disabled_platforms() {
    let base = serve(catalog()).await;
    let mut h = harness(&base).await;

    let err = h.orchestrator.collect_for_platform("coursera", None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    h.config.platforms[0].enabled = false;
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorage::open(dir.path(), &h.config.platforms).await.unwrap());
    let orchestrator = CollectionOrchestrator::new(
        Arc::new(h.config.clone()),
        storage.clone(),
        AdapterRegistry::new(),
        ChangeDetector::new(storage.clone()),
        NewCourseNotifier::new(h.port.clone(), storage.clone(), &h.config.notify),
        CancellationToken::new(),
    );
    let report = orchestrator.collect_for_platform("FGV", None).await.unwrap();
    assert_eq!(report.status, CollectStatus::Disabled);
    assert!(orchestrator.collect_all_enabled().await.is_empty());
}

#[tokio::test]
async fn held_lease_skips_the_run() {
    let base = serve(catalog()).await;
    let h = harness(&base).await;

    let _lease = h.orchestrator.locks().try_acquire("fgv").unwrap();
    let report = h.orchestrator.collect_for_platform("fgv", None).await.unwrap();
    assert_eq!(report.status, CollectStatus::Busy);
    assert_eq!(report.fetched, 0);
}

#[tokio::test]
async fn mark_on_dispatch_marks_sent_slices() {
    let base = serve(catalog()).await;
    let mut h = harness(&base).await;
    h.config.notify.mark_on_dispatch = true;

    let dispatcher = NewCourseNotifier::new(h.port.clone(), h.storage.clone(), &h.config.notify);
    let orchestrator = CollectionOrchestrator::new(
        Arc::new(h.config.clone()),
        h.storage.clone(),
        AdapterRegistry::with_defaults(&AdapterSettings::from_config(&h.config)).unwrap(),
        ChangeDetector::new(h.storage.clone()),
        dispatcher,
        CancellationToken::new(),
    );
    let report = orchestrator.collect_for_platform("fgv", Some(10)).await.unwrap();

    assert_eq!(report.dispatch.marked, 40);
    // the summarized remainder is left for recovery
    assert_eq!(h.storage.find_pending("fgv", 500).await.unwrap().len(), 5);
}
