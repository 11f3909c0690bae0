// src/pipeline/collect.rs

//! Collection orchestration: fetch → detect → dispatch, one source at a time.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::pipeline::diff::{ChangeCounts, ChangeDetector};
use crate::pipeline::dispatch::{DispatchReport, NewCourseNotifier};
use crate::pipeline::lease::RunLocks;
use crate::services::{AdapterRegistry, StopReason};
use crate::storage::PlatformRegistry;

/// How a single source run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectStatus {
    Completed,
    /// Platform is disabled in the registry
    Disabled,
    /// Another run holds the source's lease
    Busy,
    NoAdapter,
    /// Cancelled mid-walk; the partial batch was discarded
    Interrupted,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CollectReport {
    pub platform: String,
    pub status: CollectStatus,
    pub stop_reason: Option<StopReason>,
    pub pages: u32,
    pub fetched: usize,
    pub changes: ChangeCounts,
    pub dispatch: DispatchReport,
    pub took: Duration,
}

impl CollectReport {
    fn new(platform: &str, status: CollectStatus) -> Self {
        Self {
            platform: platform.to_string(),
            status,
            stop_reason: None,
            pages: 0,
            fetched: 0,
            changes: ChangeCounts::default(),
            dispatch: DispatchReport::default(),
            took: Duration::ZERO,
        }
    }
}

pub struct CollectionOrchestrator {
    config: Arc<Config>,
    platforms: Arc<dyn PlatformRegistry>,
    adapters: AdapterRegistry,
    detector: ChangeDetector,
    dispatcher: NewCourseNotifier,
    locks: RunLocks,
    cancel: CancellationToken,
}

impl CollectionOrchestrator {
    pub fn new(
        config: Arc<Config>,
        platforms: Arc<dyn PlatformRegistry>,
        adapters: AdapterRegistry,
        detector: ChangeDetector,
        dispatcher: NewCourseNotifier,
        cancel: CancellationToken,
    ) -> Self {
        let locks = RunLocks::new(Duration::from_secs(config.schedule.lease_ttl_secs));
        Self {
            config,
            platforms,
            adapters,
            detector,
            dispatcher,
            locks,
            cancel,
        }
    }

    pub fn locks(&self) -> &RunLocks {
        &self.locks
    }

    /// Page budget: explicit argument, then the platform's own, then the schedule default.
    fn max_pages_for(&self, name: &str, requested: Option<u32>) -> u32 {
        requested
            .or_else(|| self.config.platform(name).and_then(|p| p.max_pages))
            .unwrap_or(self.config.schedule.max_pages)
    }

    /// Collect one source end to end.
    ///
    /// Unknown platforms are an error; every other problem is reported in
    /// the returned [`CollectStatus`].
    pub async fn collect_for_platform(&self, name: &str, max_pages: Option<u32>) -> Result<CollectReport> {
        let started = Instant::now();
        let platform = self
            .platforms
            .find_platform(name)
            .await?
            .ok_or_else(|| AppError::not_found(format!("platform '{}'", name)))?;

        if !platform.enabled {
            log::info!("platform={} disabled, skipping", platform.name);
            return Ok(CollectReport::new(&platform.name, CollectStatus::Disabled));
        }
        let Some(adapter) = self.adapters.resolve(&platform) else {
            log::warn!("platform={} has no adapter", platform.name);
            return Ok(CollectReport::new(&platform.name, CollectStatus::NoAdapter));
        };
        let Some(_lease) = self.locks.try_acquire(&platform.name) else {
            log::warn!("platform={} already running, skipping", platform.name);
            return Ok(CollectReport::new(&platform.name, CollectStatus::Busy));
        };

        let max_pages = self.max_pages_for(&platform.name, max_pages);
        log::info!("collect start platform={} max_pages={}", platform.name, max_pages);

        let outcome = adapter.fetch_batch(&platform, max_pages, &self.cancel).await;
        let mut report = CollectReport::new(&platform.name, CollectStatus::Completed);
        report.stop_reason = Some(outcome.stop_reason);
        report.pages = outcome.pages;
        report.fetched = outcome.courses.len();

        if outcome.is_interrupted() {
            log::warn!(
                "collect interrupted platform={} discarded={}",
                platform.name,
                outcome.courses.len()
            );
            report.status = CollectStatus::Interrupted;
            report.took = started.elapsed();
            return Ok(report);
        }

        let batch: Vec<_> = outcome
            .courses
            .into_iter()
            .map(|mut course| {
                course.platform_id = Some(platform.id);
                course
            })
            .collect();

        let changes = self.detector.compute_new_or_updated(&batch).await;
        report.changes = changes.counts;
        report.dispatch = self.dispatcher.notify_new(&platform.name, &changes.new).await;
        report.took = started.elapsed();

        log::info!(
            "collect done platform={} stop={} fetched={} new={} updated={} took_ms={}",
            platform.name,
            outcome.stop_reason,
            report.fetched,
            report.changes.new,
            report.changes.updated,
            report.took.as_millis()
        );
        Ok(report)
    }

    /// Collect every enabled source in declaration order.
    ///
    /// Errors and panics are contained per source.
    pub async fn collect_all_enabled(&self) -> Vec<CollectReport> {
        let names = self.config.enabled_platforms();
        log::info!("collect-all start platforms={}", names.join(","));
        let mut reports = Vec::with_capacity(names.len());

        for name in names {
            if self.cancel.is_cancelled() {
                log::warn!("collect-all cancelled before platform={}", name);
                break;
            }
            let run = AssertUnwindSafe(self.collect_for_platform(&name, None)).catch_unwind();
            let report = match run.await {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => {
                    log::error!("collect failed platform={}: {}", name, e);
                    CollectReport::new(&name, CollectStatus::Failed(e.to_string()))
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    log::error!("collect panicked platform={}: {}", name, message);
                    CollectReport::new(&name, CollectStatus::Failed(message))
                }
            };
            reports.push(report);
        }

        let new_total: usize = reports.iter().map(|r| r.changes.new).sum();
        log::info!("collect-all done platforms={} new={}", reports.len(), new_total);
        reports
    }
}
