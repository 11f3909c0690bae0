// src/models/mod.rs

//! Domain models for the course crawler.

mod config;
mod course;
mod platform;

pub use config::{
    Config, DiscordConfig, HttpConfig, NotifyConfig, PendingConfig, PlatformConfig,
    ScheduleConfig, ScrapeConfig, StorageConfig, TelegramConfig,
};
pub use course::{Course, identity_hash};
pub use platform::{Platform, Snapshot};
