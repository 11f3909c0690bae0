// src/notify/telegram.rs

//! Bot-API chat channel (`sendMessage`, Markdown text).

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Course, TelegramConfig};
use crate::notify::NotificationPort;
use crate::notify::chunk::split_in_chunks;
use crate::notify::delivery::{channel_client, send_with_backoff};
use crate::utils::retry::{RetryPolicy, sleep_or_cancel};

pub const CHANNEL: &str = "telegram";

/// Escape the characters legacy Markdown treats as markup.
pub fn escape_md(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '*' | '_' | '`' | '[') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Message listing new courses, before chunking.
pub fn format_new_courses(platform: &str, courses: &[Course]) -> String {
    let mut text = format!("🎓 *Novos cursos* — {}\n", platform.to_uppercase());
    for course in courses {
        let area = course
            .area
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or("Sem área");
        text.push_str(&format!(
            "• {} — {}\n{}\n",
            escape_md(&course.title),
            escape_md(area),
            course.url
        ));
    }
    text
}

pub fn format_summary(platform: &str, total_new: usize, link: Option<&str>) -> String {
    let mut text = format!("📊 {}: +{} novos cursos.", platform.to_uppercase(), total_new);
    if let Some(link) = link.map(str::trim).filter(|l| !l.is_empty()) {
        text.push(' ');
        text.push_str(link);
    }
    text
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    config: TelegramConfig,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig, retry: &RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: channel_client(config.connect_timeout_ms, config.read_timeout_ms)?,
            config: config.clone(),
            retry: retry.clone(),
            cancel: CancellationToken::new(),
        })
    }

    /// Abort rate-limit waits and pending chunks once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    async fn send_markdown(&self, text: &str) -> Result<()> {
        let endpoint = self.endpoint();
        let mut form = vec![
            ("chat_id", self.config.chat_id.as_str()),
            ("text", text),
            ("parse_mode", "Markdown"),
        ];
        if self.config.disable_web_preview {
            form.push(("disable_web_page_preview", "true"));
        }
        send_with_backoff(CHANNEL, &self.retry, &self.cancel, || {
            self.client.post(&endpoint).form(&form)
        })
        .await
    }

    /// Send every chunk; fails if any chunk failed.
    async fn send_chunks(&self, platform: &str, text: &str) -> Result<()> {
        let chunks = split_in_chunks(text, self.config.max_message_chars);
        let total = chunks.len();
        let mut first_error = None;
        let mut ok = 0;

        for (i, chunk) in chunks.iter().enumerate() {
            match self.send_markdown(chunk).await {
                Ok(()) => ok += 1,
                Err(e) => {
                    log::error!("{}: chunk {}/{} failed platform={}: {}", CHANNEL, i + 1, total, platform, e);
                    first_error.get_or_insert(e);
                }
            }
            let delay = Duration::from_millis(self.config.batch_delay_ms);
            if i + 1 < total && !sleep_or_cancel(delay, &self.cancel).await {
                let unsent = total - i - 1;
                log::warn!("{}: cancelled platform={} unsent={}", CHANNEL, platform, unsent);
                first_error.get_or_insert(AppError::notify(
                    CHANNEL,
                    format!("cancelled with {unsent} chunks unsent"),
                ));
                break;
            }
        }

        log::info!("{}: sent platform={} chunks_ok={}/{}", CHANNEL, platform, ok, total);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NotificationPort for TelegramNotifier {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn notify_new_courses(&self, platform: &str, courses: &[Course]) -> Result<()> {
        if courses.is_empty() {
            return Ok(());
        }
        self.send_chunks(platform, &format_new_courses(platform, courses))
            .await
    }

    async fn notify_summary(&self, platform: &str, total_new: usize, link: Option<&str>) -> Result<()> {
        self.send_chunks(platform, &format_summary(platform, total_new, link))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markdown_markup() {
        assert_eq!(escape_md("a_b*c`d[e]"), "a\\_b\\*c\\`d\\[e]");
    }

    #[test]
    fn new_courses_message_layout() {
        let mut with_area = Course::candidate("Excel_Avançado", "https://x.br/1", "EVG");
        with_area.area = Some("Tecnologia".into());
        let without_area = Course::candidate("Oratória", "https://x.br/2", "EVG");

        let text = format_new_courses("evg", &[with_area, without_area]);
        assert_eq!(
            text,
            "🎓 *Novos cursos* — EVG\n\
             • Excel\\_Avançado — Tecnologia\nhttps://x.br/1\n\
             • Oratória — Sem área\nhttps://x.br/2\n"
        );
    }

    #[test]
    fn summary_with_and_without_link() {
        assert_eq!(format_summary("fgv", 5, None), "📊 FGV: +5 novos cursos.");
        assert_eq!(
            format_summary("fgv", 5, Some(" https://api/x ")),
            "📊 FGV: +5 novos cursos. https://api/x"
        );
    }

    #[test]
    fn endpoint_embeds_token() {
        let config = TelegramConfig {
            bot_token: "123:abc".into(),
            api_base: "http://localhost:9/".into(),
            ..TelegramConfig::default()
        };
        let notifier = TelegramNotifier::new(&config, &RetryPolicy::for_delivery()).unwrap();
        assert_eq!(notifier.endpoint(), "http://localhost:9/bot123:abc/sendMessage");
    }
}
