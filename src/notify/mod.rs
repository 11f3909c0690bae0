// src/notify/mod.rs

//! Notification port and its chat channels.

pub mod chunk;
pub mod composite;
pub mod delivery;
pub mod discord;
pub mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{Course, NotifyConfig};

pub use composite::CompositeNotifier;
pub use discord::DiscordNotifier;
pub use telegram::TelegramNotifier;

/// Outbound notification target.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    fn name(&self) -> &str;

    /// Announce a slice of newly discovered courses.
    async fn notify_new_courses(&self, platform: &str, courses: &[Course]) -> Result<()>;

    /// Announce how many new courses a run found, with an optional link.
    async fn notify_summary(&self, platform: &str, total_new: usize, link: Option<&str>) -> Result<()>;
}

/// Build the composite from configuration, skipping channels without credentials.
///
/// Every channel stops waiting once `cancel` fires.
pub fn build_from_config(config: &NotifyConfig, cancel: &CancellationToken) -> Result<CompositeNotifier> {
    let mut composite = CompositeNotifier::default();

    if config.telegram.is_configured() {
        composite.push(Arc::new(
            TelegramNotifier::new(&config.telegram, &config.retry)?.with_cancel(cancel.clone()),
        ));
    } else if config.telegram.enabled {
        log::warn!("telegram: bot token or chat id missing, channel skipped");
    }

    if config.discord.is_configured() {
        composite.push(Arc::new(
            DiscordNotifier::new(&config.discord, &config.retry)?.with_cancel(cancel.clone()),
        ));
    } else if config.discord.enabled {
        log::warn!("discord: webhook url missing, channel skipped");
    }

    if composite.is_empty() {
        log::warn!("no notification channel configured");
    } else {
        log::info!("notification channels: {}", composite.channel_names().join(", "));
    }
    Ok(composite)
}
