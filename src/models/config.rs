//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::retry::RetryPolicy;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Fetch layer settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Harvested sources
    #[serde(default = "defaults::platforms")]
    pub platforms: Vec<PlatformConfig>,

    /// Adapter tuning
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// New-course dispatch and channel settings
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Pending-notification recovery
    #[serde(default)]
    pub pending: PendingConfig,

    /// Periodic collection
    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Overlay secrets and deployment-specific values from the environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.notify.telegram.bot_token = token;
        }
        if let Some(chat) = get("TELEGRAM_CHAT_ID") {
            self.notify.telegram.chat_id = chat;
        }
        if let Some(hook) = get("DISCORD_WEBHOOK_URL") {
            self.notify.discord.webhook_url = hook;
        }
        if let Some(api) = get("COURSES_API_BASE_URL") {
            self.notify.api_base_url = Some(api);
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_ms == 0 {
            return Err(AppError::validation("http.timeout_ms must be > 0"));
        }
        if self.platforms.is_empty() {
            return Err(AppError::validation("No platforms defined"));
        }
        for p in &self.platforms {
            if p.name.trim().is_empty() {
                return Err(AppError::validation("platform name is empty"));
            }
            if !p.base_url.is_empty() {
                url::Url::parse(&p.base_url).inspect_err(|e| {
                    log::error!("platform {} has an invalid base_url {:?}: {}", p.name, p.base_url, e)
                })?;
            }
        }
        if self.notify.per_message == 0 {
            return Err(AppError::validation("notify.per_message must be > 0"));
        }
        if self.pending.per_message == 0 {
            return Err(AppError::validation("pending.per_message must be > 0"));
        }
        if self.notify.telegram.max_message_chars < 100 {
            return Err(AppError::validation(
                "notify.telegram.max_message_chars must be >= 100",
            ));
        }
        if !(1..=10).contains(&self.notify.discord.max_embeds_per_message) {
            return Err(AppError::validation(
                "notify.discord.max_embeds_per_message must be within 1..=10",
            ));
        }
        if self.schedule.collect_interval_secs == 0 || self.pending.interval_secs == 0 {
            return Err(AppError::validation("schedule intervals must be > 0"));
        }
        Ok(())
    }

    /// Find a configured platform by name, ignoring case.
    pub fn platform(&self, name: &str) -> Option<&PlatformConfig> {
        self.platforms
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Names of enabled platforms in declaration order.
    pub fn enabled_platforms(&self) -> Vec<String> {
        self.platforms
            .iter()
            .filter(|p| p.enabled)
            .map(|p| p.name.clone())
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            platforms: defaults::platforms(),
            scrape: ScrapeConfig::default(),
            notify: NotifyConfig::default(),
            pending: PendingConfig::default(),
            schedule: ScheduleConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Request headers and retry behavior for the fetch layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Primary User-Agent for stateless fetches
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Browser User-Agent tried when the primary is rejected
    #[serde(default = "defaults::fallback_user_agent")]
    pub fallback_user_agent: String,

    /// User-Agent for cookie sessions
    #[serde(default = "defaults::session_user_agent")]
    pub session_user_agent: String,

    #[serde(default = "defaults::referrer")]
    pub referrer: String,

    #[serde(default = "defaults::accept")]
    pub accept: String,

    #[serde(default = "defaults::accept_language")]
    pub accept_language: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Extra timeout added per stateless retry
    #[serde(default = "defaults::timeout_step_ms")]
    pub timeout_step_ms: u64,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            fallback_user_agent: defaults::fallback_user_agent(),
            session_user_agent: defaults::session_user_agent(),
            referrer: defaults::referrer(),
            accept: defaults::accept(),
            accept_language: defaults::accept_language(),
            timeout_ms: defaults::timeout_ms(),
            timeout_step_ms: defaults::timeout_step_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

/// A harvested source as configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub name: String,

    /// Overrides the adapter's built-in base address
    #[serde(default)]
    pub base_url: String,

    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Overrides `schedule.max_pages` for this source
    #[serde(default)]
    pub max_pages: Option<u32>,
}

impl PlatformConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: String::new(),
            enabled: true,
            max_pages: None,
        }
    }
}

/// Adapter tuning shared by every source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Replaces each adapter's own politeness delay when set
    #[serde(default)]
    pub page_delay_ms: Option<u64>,

    /// Hard cap of distinct items per run
    #[serde(default = "defaults::item_cap")]
    pub item_cap: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            page_delay_ms: None,
            item_cap: defaults::item_cap(),
        }
    }
}

/// New-course dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Courses announced individually per run and platform (0 = no cap)
    #[serde(default = "defaults::max_per_run")]
    pub max_per_run: usize,

    /// Courses grouped into one outbound message
    #[serde(default = "defaults::per_message")]
    pub per_message: usize,

    /// Pause between slices
    #[serde(default = "defaults::dispatch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Query API base used for the summary deep link
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Mark courses delivered as soon as a dispatch slice succeeds
    #[serde(default)]
    pub mark_on_dispatch: bool,

    /// Rate-limit handling for channels
    #[serde(default = "RetryPolicy::for_delivery")]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub discord: DiscordConfig,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_per_run: defaults::max_per_run(),
            per_message: defaults::per_message(),
            batch_delay_ms: defaults::dispatch_delay_ms(),
            api_base_url: None,
            mark_on_dispatch: false,
            retry: RetryPolicy::for_delivery(),
            telegram: TelegramConfig::default(),
            discord: DiscordConfig::default(),
        }
    }
}

/// Bot-API channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub bot_token: String,

    #[serde(default)]
    pub chat_id: String,

    #[serde(default = "defaults::telegram_api_base")]
    pub api_base: String,

    #[serde(default = "defaults::connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "defaults::read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Character cap per message before chunking
    #[serde(default = "defaults::max_message_chars")]
    pub max_message_chars: usize,

    #[serde(default = "defaults::telegram_delay_ms")]
    pub batch_delay_ms: u64,

    #[serde(default = "defaults::enabled")]
    pub disable_web_preview: bool,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: defaults::telegram_api_base(),
            connect_timeout_ms: defaults::connect_timeout_ms(),
            read_timeout_ms: defaults::read_timeout_ms(),
            max_message_chars: defaults::max_message_chars(),
            batch_delay_ms: defaults::telegram_delay_ms(),
            disable_web_preview: true,
        }
    }
}

/// Webhook channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub webhook_url: String,

    #[serde(default = "defaults::connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "defaults::read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "defaults::max_embeds")]
    pub max_embeds_per_message: usize,

    #[serde(default = "defaults::max_embed_chars")]
    pub max_embed_total_chars: usize,

    #[serde(default = "defaults::discord_delay_ms")]
    pub batch_delay_ms: u64,
}

impl DiscordConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.webhook_url.trim().is_empty()
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: String::new(),
            connect_timeout_ms: defaults::connect_timeout_ms(),
            read_timeout_ms: defaults::read_timeout_ms(),
            max_embeds_per_message: defaults::max_embeds(),
            max_embed_total_chars: defaults::max_embed_chars(),
            batch_delay_ms: defaults::discord_delay_ms(),
        }
    }
}

/// Pending-notification recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    #[serde(default = "defaults::pending_interval")]
    pub interval_secs: u64,

    #[serde(default = "defaults::per_message")]
    pub per_message: usize,

    /// Pending courses fetched per platform and pass (0 = store maximum)
    #[serde(default = "defaults::max_per_run")]
    pub max_per_run: usize,

    #[serde(default = "defaults::pending_delay_ms")]
    pub batch_delay_ms: u64,

    /// Sources flushed on each pass
    #[serde(default = "defaults::pending_platforms")]
    pub platforms: Vec<String>,
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: defaults::pending_interval(),
            per_message: defaults::per_message(),
            max_per_run: defaults::max_per_run(),
            batch_delay_ms: defaults::pending_delay_ms(),
            platforms: defaults::pending_platforms(),
        }
    }
}

/// Periodic collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "defaults::collect_interval")]
    pub collect_interval_secs: u64,

    /// Run a collection immediately instead of waiting one interval
    #[serde(default)]
    pub run_on_start: bool,

    /// Page budget for sources without their own `max_pages`
    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,

    /// Lifetime of a per-source run lease
    #[serde(default = "defaults::lease_ttl")]
    pub lease_ttl_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            collect_interval_secs: defaults::collect_interval(),
            run_on_start: false,
            max_pages: defaults::max_pages(),
            lease_ttl_secs: defaults::lease_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the JSON file store
    #[serde(default = "defaults::storage_dir")]
    pub dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: defaults::storage_dir(),
        }
    }
}

mod defaults {
    use super::PlatformConfig;

    // Fetch defaults
    pub fn user_agent() -> String {
        "CourseCrawler/1.0 (+https://github.com/course-crawler; polite bot)".into()
    }
    pub fn fallback_user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36"
            .into()
    }
    pub fn session_user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
            .into()
    }
    pub fn referrer() -> String {
        "https://www.google.com".into()
    }
    pub fn accept() -> String {
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".into()
    }
    pub fn accept_language() -> String {
        "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7".into()
    }
    pub fn timeout_ms() -> u64 {
        25_000
    }
    pub fn timeout_step_ms() -> u64 {
        1_000
    }

    // Sources
    pub fn platforms() -> Vec<PlatformConfig> {
        ["evg", "fgv", "sebrae"]
            .into_iter()
            .map(PlatformConfig::named)
            .collect()
    }
    pub fn enabled() -> bool {
        true
    }
    pub fn item_cap() -> usize {
        10_000
    }

    // Dispatch
    pub fn max_per_run() -> usize {
        40
    }
    pub fn per_message() -> usize {
        8
    }
    pub fn dispatch_delay_ms() -> u64 {
        300
    }

    // Channels
    pub fn telegram_api_base() -> String {
        "https://api.telegram.org".into()
    }
    pub fn connect_timeout_ms() -> u64 {
        10_000
    }
    pub fn read_timeout_ms() -> u64 {
        20_000
    }
    pub fn max_message_chars() -> usize {
        3_800
    }
    pub fn telegram_delay_ms() -> u64 {
        300
    }
    pub fn max_embeds() -> usize {
        10
    }
    pub fn max_embed_chars() -> usize {
        6_000
    }
    pub fn discord_delay_ms() -> u64 {
        350
    }

    // Recovery
    pub fn pending_interval() -> u64 {
        60
    }
    pub fn pending_delay_ms() -> u64 {
        250
    }
    pub fn pending_platforms() -> Vec<String> {
        vec!["evg".into(), "fgv".into(), "sebrae".into()]
    }

    // Schedule
    pub fn collect_interval() -> u64 {
        12 * 60 * 60
    }
    pub fn max_pages() -> u32 {
        100
    }
    pub fn lease_ttl() -> u64 {
        60 * 60
    }
    pub fn storage_dir() -> String {
        "storage".into()
    }
}
