// src/notify/composite.rs

//! Fan-out over every configured channel.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::Course;
use crate::notify::NotificationPort;

/// Calls each channel in turn; one channel failing never stops the others.
///
/// A call succeeds when at least one channel delivered.
#[derive(Default, Clone)]
pub struct CompositeNotifier {
    channels: Vec<Arc<dyn NotificationPort>>,
}

impl CompositeNotifier {
    pub fn new(channels: Vec<Arc<dyn NotificationPort>>) -> Self {
        Self { channels }
    }

    pub fn push(&mut self, channel: Arc<dyn NotificationPort>) {
        self.channels.push(channel);
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    fn settle(&self, operation: &str, failures: Vec<String>) -> Result<()> {
        if self.channels.is_empty() {
            return Err(AppError::notify("composite", "no channel configured"));
        }
        if failures.len() == self.channels.len() {
            return Err(AppError::notify(
                "composite",
                format!("{} failed on every channel: {}", operation, failures.join("; ")),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationPort for CompositeNotifier {
    fn name(&self) -> &str {
        "composite"
    }

    async fn notify_new_courses(&self, platform: &str, courses: &[Course]) -> Result<()> {
        let mut failures = Vec::new();
        for channel in &self.channels {
            if let Err(e) = channel.notify_new_courses(platform, courses).await {
                log::error!(
                    "notify_new_courses failed channel={} platform={} courses={}: {}",
                    channel.name(),
                    platform,
                    courses.len(),
                    e
                );
                failures.push(e.to_string());
            }
        }
        self.settle("notify_new_courses", failures)
    }

    async fn notify_summary(&self, platform: &str, total_new: usize, link: Option<&str>) -> Result<()> {
        let mut failures = Vec::new();
        for channel in &self.channels {
            if let Err(e) = channel.notify_summary(platform, total_new, link).await {
                log::error!(
                    "notify_summary failed channel={} platform={}: {}",
                    channel.name(),
                    platform,
                    e
                );
                failures.push(e.to_string());
            }
        }
        self.settle("notify_summary", failures)
    }
}
