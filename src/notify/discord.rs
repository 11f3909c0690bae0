// src/notify/discord.rs

//! Webhook channel posting rich embeds.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Course, DiscordConfig};
use crate::notify::NotificationPort;
use crate::notify::delivery::{channel_client, send_with_backoff};
use crate::utils::retry::{RetryPolicy, sleep_or_cancel};

pub const CHANNEL: &str = "discord";

const TITLE_MAX_CHARS: usize = 240;
const BLANK_VALUE: &str = "—";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    fn inline(name: &str, value: &str) -> Self {
        let value = if value.trim().is_empty() {
            BLANK_VALUE.to_string()
        } else {
            value.to_string()
        };
        Self {
            name: name.to_string(),
            value,
            inline: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

impl Embed {
    /// Approximate character weight counted against the per-message budget.
    pub fn char_count(&self) -> usize {
        let fields: usize = self
            .fields
            .iter()
            .map(|f| f.name.chars().count() + f.value.chars().count())
            .sum();
        self.title.chars().count()
            + self.url.as_deref().map_or(0, |u| u.chars().count())
            + self.description.chars().count()
            + self.footer.as_ref().map_or(0, |f| f.text.chars().count())
            + fields
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    embeds: &'a [Embed],
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Embed describing one course.
pub fn course_embed(platform: &str, course: &Course) -> Embed {
    let mut description = String::new();
    if !course.provider.trim().is_empty() {
        description.push_str(&format!("**Fornecedor:** {}\n", course.provider));
    }
    if let Some(area) = course.area.as_deref().filter(|a| !a.trim().is_empty()) {
        description.push_str(&format!("**Área:** {}\n", area));
    }

    let mut fields = vec![
        EmbedField::inline("Formato", course.status_or_default()),
        EmbedField::inline("Gratuito", if course.free { "Sim" } else { "Não" }),
    ];
    if let Some(start) = course.start_date {
        fields.push(EmbedField::inline("Início", &format_date(start)));
    }
    if let Some(end) = course.end_date {
        fields.push(EmbedField::inline("Fim", &format_date(end)));
    }
    if let Some(price) = course.price_text.as_deref().filter(|p| !p.trim().is_empty()) {
        fields.push(EmbedField::inline("Preço", price));
    }

    Embed {
        title: truncate(&course.title, TITLE_MAX_CHARS),
        url: Some(course.url.clone()).filter(|u| !u.trim().is_empty()),
        description,
        fields,
        footer: Some(EmbedFooter {
            text: platform.to_uppercase(),
        }),
    }
}

pub fn summary_embed(platform: &str, total_new: usize, link: Option<&str>) -> Embed {
    let mut description = format!("Foram encontrados **{}** novos cursos.", total_new);
    if let Some(link) = link.map(str::trim).filter(|l| !l.is_empty()) {
        description.push('\n');
        description.push_str(link);
    }
    Embed {
        title: format!("Resumo — {}", platform.to_uppercase()),
        url: None,
        description,
        fields: Vec::new(),
        footer: None,
    }
}

/// Group embeds so each post has at most `max_embeds` and stays within `max_chars`.
///
/// An embed larger than the budget on its own still gets a post of its own.
pub fn batch_embeds(embeds: Vec<Embed>, max_embeds: usize, max_chars: usize) -> Vec<Vec<Embed>> {
    let max_embeds = max_embeds.max(1);
    let mut batches = Vec::new();
    let mut current: Vec<Embed> = Vec::new();
    let mut current_chars = 0;

    for embed in embeds {
        let chars = embed.char_count();
        let full = current.len() >= max_embeds || current_chars + chars > max_chars;
        if full && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current_chars += chars;
        current.push(embed);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

pub struct DiscordNotifier {
    client: reqwest::Client,
    config: DiscordConfig,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl DiscordNotifier {
    pub fn new(config: &DiscordConfig, retry: &RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: channel_client(config.connect_timeout_ms, config.read_timeout_ms)?,
            config: config.clone(),
            retry: retry.clone(),
            cancel: CancellationToken::new(),
        })
    }

    /// Abort rate-limit waits and pending posts once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn post_embeds(&self, embeds: &[Embed]) -> Result<()> {
        let payload = WebhookPayload { embeds };
        send_with_backoff(CHANNEL, &self.retry, &self.cancel, || {
            self.client.post(&self.config.webhook_url).json(&payload)
        })
        .await
    }
}

#[async_trait]
impl NotificationPort for DiscordNotifier {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn notify_new_courses(&self, platform: &str, courses: &[Course]) -> Result<()> {
        if courses.is_empty() {
            return Ok(());
        }
        let embeds = courses.iter().map(|c| course_embed(platform, c)).collect();
        let batches = batch_embeds(
            embeds,
            self.config.max_embeds_per_message,
            self.config.max_embed_total_chars,
        );
        let total = batches.len();
        let mut first_error = None;

        for (i, batch) in batches.iter().enumerate() {
            match self.post_embeds(batch).await {
                Ok(()) => log::debug!("{}: post {}/{} embeds={}", CHANNEL, i + 1, total, batch.len()),
                Err(e) => {
                    log::error!("{}: post {}/{} failed platform={}: {}", CHANNEL, i + 1, total, platform, e);
                    first_error.get_or_insert(e);
                }
            }
            let delay = Duration::from_millis(self.config.batch_delay_ms);
            if i + 1 < total && !sleep_or_cancel(delay, &self.cancel).await {
                let unsent = total - i - 1;
                log::warn!("{}: cancelled platform={} unsent={}", CHANNEL, platform, unsent);
                first_error.get_or_insert(AppError::notify(
                    CHANNEL,
                    format!("cancelled with {unsent} posts unsent"),
                ));
                break;
            }
        }

        log::info!("{}: sent platform={} courses={} posts={}", CHANNEL, platform, courses.len(), total);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn notify_summary(&self, platform: &str, total_new: usize, link: Option<&str>) -> Result<()> {
        self.post_embeds(&[summary_embed(platform, total_new, link)]).await
    }
}
