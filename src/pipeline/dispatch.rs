// src/pipeline/dispatch.rs

//! Announcing newly discovered courses in bounded slices.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::models::{Course, NotifyConfig};
use crate::notify::NotificationPort;
use crate::storage::CourseStore;
use crate::utils::retry::sleep_or_cancel;

/// Outcome of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub slices_sent: usize,
    pub slices_failed: usize,
    /// Courses left out of the slices and counted in the summary
    pub summarized: usize,
    pub summary_sent: bool,
    /// Courses marked as delivered (only with `mark_on_dispatch`)
    pub marked: usize,
    /// Stopped early on shutdown; unsent courses stay pending
    pub interrupted: bool,
}

/// Deep link to the course listing of a platform.
pub fn summary_link(api_base_url: Option<&str>, platform: &str) -> Option<String> {
    api_base_url
        .map(str::trim)
        .filter(|base| !base.is_empty())
        .map(|base| format!("{}?platform={}&sort=updated_at,desc", base, platform))
}

pub struct NewCourseNotifier {
    port: Arc<dyn NotificationPort>,
    store: Arc<dyn CourseStore>,
    max_per_run: usize,
    per_message: usize,
    batch_delay: Duration,
    api_base_url: Option<String>,
    mark_on_dispatch: bool,
    cancel: CancellationToken,
}

impl NewCourseNotifier {
    pub fn new(port: Arc<dyn NotificationPort>, store: Arc<dyn CourseStore>, config: &NotifyConfig) -> Self {
        Self {
            port,
            store,
            max_per_run: config.max_per_run,
            per_message: config.per_message.max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            api_base_url: config.api_base_url.clone(),
            mark_on_dispatch: config.mark_on_dispatch,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between slices once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send up to `max_per_run` courses in slices, then a summary of the rest.
    ///
    /// A failed slice is logged and the remaining slices still go out.
    /// `max_per_run == 0` sends everything.
    pub async fn notify_new(&self, platform: &str, courses: &[Course]) -> DispatchReport {
        let mut report = DispatchReport::default();
        if courses.is_empty() {
            return report;
        }

        let limit = if self.max_per_run == 0 {
            courses.len()
        } else {
            self.max_per_run.min(courses.len())
        };
        let slices: Vec<&[Course]> = courses[..limit].chunks(self.per_message).collect();
        let total = slices.len();

        for (i, slice) in slices.into_iter().enumerate() {
            match self.port.notify_new_courses(platform, slice).await {
                Ok(()) => {
                    report.slices_sent += 1;
                    if self.mark_on_dispatch {
                        report.marked += self.mark(platform, slice).await;
                    }
                }
                Err(e) => {
                    report.slices_failed += 1;
                    log::error!(
                        "dispatch slice {}/{} failed platform={} size={}: {}",
                        i + 1,
                        total,
                        platform,
                        slice.len(),
                        e
                    );
                }
            }
            if i + 1 < total && !sleep_or_cancel(self.batch_delay, &self.cancel).await {
                log::warn!(
                    "dispatch interrupted platform={} after slice {}/{}",
                    platform,
                    i + 1,
                    total
                );
                report.interrupted = true;
                break;
            }
        }

        if courses.len() > limit && !report.interrupted {
            report.summarized = courses.len() - limit;
            let link = summary_link(self.api_base_url.as_deref(), platform);
            match self
                .port
                .notify_summary(platform, report.summarized, link.as_deref())
                .await
            {
                Ok(()) => report.summary_sent = true,
                Err(e) => log::error!("dispatch summary failed platform={}: {}", platform, e),
            }
        }

        log::info!(
            "dispatch platform={} new={} slices_ok={} slices_failed={} summarized={}",
            platform,
            courses.len(),
            report.slices_sent,
            report.slices_failed,
            report.summarized
        );
        report
    }

    async fn mark(&self, platform: &str, slice: &[Course]) -> usize {
        let ids: Vec<i64> = slice.iter().filter_map(|c| c.id).collect();
        match self.store.mark_notified(&ids).await {
            Ok(marked) => marked,
            Err(e) => {
                log::error!("mark on dispatch failed platform={}: {}", platform, e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use crate::models::PlatformConfig;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        slices: Mutex<Vec<usize>>,
        summaries: Mutex<Vec<(usize, Option<String>)>>,
        fail_slice: Option<usize>,
    }

    #[async_trait]
    impl NotificationPort for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn notify_new_courses(&self, _: &str, courses: &[Course]) -> Result<()> {
            let mut slices = self.slices.lock().unwrap();
            slices.push(courses.len());
            if self.fail_slice == Some(slices.len()) {
                return Err(AppError::notify("recorder", "down"));
            }
            Ok(())
        }

        async fn notify_summary(&self, _: &str, total: usize, link: Option<&str>) -> Result<()> {
            self.summaries
                .lock()
                .unwrap()
                .push((total, link.map(str::to_string)));
            Ok(())
        }
    }

    fn courses(n: usize) -> Vec<Course> {
        (0..n)
            .map(|i| {
                let mut c = Course::candidate(&format!("c{i}"), &format!("https://x.br/{i}"), "EVG");
                c.id = Some(i as i64 + 1);
                c
            })
            .collect()
    }

    fn config() -> NotifyConfig {
        NotifyConfig {
            max_per_run: 40,
            per_message: 8,
            batch_delay_ms: 0,
            api_base_url: Some("https://api.example/courses".into()),
            ..NotifyConfig::default()
        }
    }

    fn store() -> Arc<dyn CourseStore> {
        Arc::new(MemoryStore::from_config(&[PlatformConfig::named("evg")]))
    }

    #[tokio::test]
    async fn slices_and_summary() {
        let port = Arc::new(Recorder::default());
        let notifier = NewCourseNotifier::new(port.clone(), store(), &config());

        let report = notifier.notify_new("evg", &courses(45)).await;
        assert_eq!(*port.slices.lock().unwrap(), vec![8, 8, 8, 8, 8]);
        assert_eq!(
            *port.summaries.lock().unwrap(),
            vec![(
                5,
                Some("https://api.example/courses?platform=evg&sort=updated_at,desc".to_string())
            )]
        );
        assert_eq!(report.slices_sent, 5);
        assert!(report.summary_sent);
        assert_eq!(report.marked, 0);
    }

    #[tokio::test]
    async fn no_summary_within_limit_and_unbounded_when_zero() {
        let port = Arc::new(Recorder::default());
        let notifier = NewCourseNotifier::new(port.clone(), store(), &config());
        notifier.notify_new("evg", &courses(17)).await;
        assert_eq!(*port.slices.lock().unwrap(), vec![8, 8, 1]);
        assert!(port.summaries.lock().unwrap().is_empty());

        let port = Arc::new(Recorder::default());
        let unbounded = NotifyConfig {
            max_per_run: 0,
            ..config()
        };
        let notifier = NewCourseNotifier::new(port.clone(), store(), &unbounded);
        notifier.notify_new("evg", &courses(50)).await;
        assert_eq!(port.slices.lock().unwrap().iter().sum::<usize>(), 50);
        assert!(port.summaries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_slice_does_not_stop_the_rest() {
        let port = Arc::new(Recorder {
            fail_slice: Some(2),
            ..Recorder::default()
        });
        let notifier = NewCourseNotifier::new(port.clone(), store(), &config());
        let report = notifier.notify_new("evg", &courses(24)).await;
        assert_eq!(port.slices.lock().unwrap().len(), 3);
        assert_eq!(report.slices_sent, 2);
        assert_eq!(report.slices_failed, 1);
    }

    #[tokio::test]
    async fn cancelled_dispatch_stops_between_slices() {
        let port = Arc::new(Recorder::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let slow = NotifyConfig {
            batch_delay_ms: 60_000,
            ..config()
        };
        let notifier = NewCourseNotifier::new(port.clone(), store(), &slow).with_cancel(cancel);

        let started = std::time::Instant::now();
        let report = notifier.notify_new("evg", &courses(45)).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(report.interrupted);
        assert_eq!(*port.slices.lock().unwrap(), vec![8]);
        assert!(port.summaries.lock().unwrap().is_empty());
    }

    #[test]
    fn link_requires_base() {
        assert_eq!(summary_link(None, "evg"), None);
        assert_eq!(summary_link(Some("  "), "evg"), None);
    }
}
