// src/utils/http.rs

//! HTTP fetch layer: stateless page fetches and cookie-keeping sessions.
//!
//! Neither variant returns transport errors to adapters. A page either comes
//! back as [`FetchedPage`] or the caller receives a [`FetchFailure`] after the
//! retry budget is spent, so "empty catalog" and "page withheld" stay distinct.

use std::fmt;
use std::time::Duration;

use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA, REFERER, USER_AGENT,
};
use reqwest::{Client, StatusCode};
use scraper::Html;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::HttpConfig;
use crate::utils::retry::{RetryPolicy, sleep_or_cancel};

/// A page body returned by the fetch layer.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    /// Parse the body as an HTML document.
    ///
    /// `Html` is not `Send`, so parse inside synchronous extraction code and
    /// drop the document before the next `.await`.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

/// Fetch that gave up after exhausting its attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub url: String,
    pub attempts: u32,
    pub reason: String,
    pub cancelled: bool,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cancelled {
            write!(f, "cancelled after {} attempt(s)", self.attempts)
        } else {
            write!(f, "{} after {} attempt(s)", self.reason, self.attempts)
        }
    }
}

impl From<FetchFailure> for AppError {
    fn from(f: FetchFailure) -> Self {
        AppError::fetch(f.url.clone(), f)
    }
}

pub type FetchResult = std::result::Result<FetchedPage, FetchFailure>;

enum Attempt {
    Page(FetchedPage),
    Retry {
        reason: String,
        wait: Option<Duration>,
    },
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| AppError::config(format!("http.{name}: {e}")))
}

/// Browser-like default headers shared by both fetch variants.
fn browser_headers(config: &HttpConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, header_value("accept", &config.accept)?);
    headers.insert(
        ACCEPT_LANGUAGE,
        header_value("accept_language", &config.accept_language)?,
    );
    headers.insert(REFERER, header_value("referrer", &config.referrer)?);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    Ok(headers)
}

/// Stateless fetcher alternating between the primary and fallback user agents.
#[derive(Clone)]
pub struct HttpFetch {
    client: Client,
    config: HttpConfig,
}

impl HttpFetch {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .default_headers(browser_headers(config)?)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// GET a page, trying the primary then fallback agent before backing off.
    pub async fn get(&self, url: &str, cancel: &CancellationToken) -> FetchResult {
        let agents = [
            self.config.user_agent.as_str(),
            self.config.fallback_user_agent.as_str(),
        ];
        fetch_with_retries(&self.client, &self.config, url, &agents, true, cancel).await
    }
}

/// Cookie-keeping session for sources that hand out anti-bot cookies.
///
/// Create one per collection run; cookies live as long as the session.
pub struct HttpSession {
    client: Client,
    config: HttpConfig,
}

impl HttpSession {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .default_headers(browser_headers(config)?)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Visit a page only to collect cookies. Failures are logged, never fatal.
    pub async fn warm_up(&self, url: &str, cancel: &CancellationToken) -> bool {
        match self.get(url, cancel).await {
            Ok(page) => {
                log::debug!("warm-up ok url={} status={}", url, page.status);
                true
            }
            Err(failure) => {
                log::warn!("warm-up failed url={}: {}", url, failure);
                false
            }
        }
    }

    pub async fn get(&self, url: &str, cancel: &CancellationToken) -> FetchResult {
        let agents = [self.config.session_user_agent.as_str()];
        fetch_with_retries(&self.client, &self.config, url, &agents, false, cancel).await
    }
}

/// Attempt `agents.len() + retry.max_retries` requests.
///
/// The first round tries each agent once without waiting; later attempts
/// sleep according to the retry policy, or the server's `Retry-After` on 429.
async fn fetch_with_retries(
    client: &Client,
    config: &HttpConfig,
    url: &str,
    agents: &[&str],
    grow_timeout: bool,
    cancel: &CancellationToken,
) -> FetchResult {
    let policy = &config.retry;
    let first_round = agents.len().max(1) as u32;
    let total = first_round + policy.max_retries;

    let mut reason = String::from("no attempt made");
    let mut hinted_wait: Option<Duration> = None;

    for attempt in 0..total {
        let retry_no = attempt.saturating_sub(first_round - 1);
        let wait = match hinted_wait.take() {
            Some(wait) => wait,
            None if attempt >= first_round => policy.delay_for(retry_no),
            None => Duration::ZERO,
        };
        if !sleep_or_cancel(wait, cancel).await {
            return Err(cancelled(url, attempt));
        }

        let agent = agents.get(attempt as usize % agents.len().max(1)).copied();
        let mut timeout = Duration::from_millis(config.timeout_ms);
        if grow_timeout && attempt >= first_round {
            timeout += Duration::from_millis(config.timeout_step_ms * u64::from(retry_no));
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled(url, attempt + 1)),
            outcome = attempt_once(client, url, agent, timeout, policy) => outcome,
        };

        match outcome {
            Attempt::Page(page) => {
                if attempt > 0 {
                    log::debug!("fetched url={} on attempt {}", url, attempt + 1);
                }
                return Ok(page);
            }
            Attempt::Retry { reason: why, wait } => {
                log::debug!("attempt {}/{} failed url={}: {}", attempt + 1, total, url, why);
                reason = why;
                hinted_wait = wait;
            }
        }
    }

    log::warn!("fetch failed url={} after {} attempt(s): {}", url, total, reason);
    Err(FetchFailure {
        url: url.to_string(),
        attempts: total,
        reason,
        cancelled: false,
    })
}

fn cancelled(url: &str, attempts: u32) -> FetchFailure {
    FetchFailure {
        url: url.to_string(),
        attempts,
        reason: "cancelled".into(),
        cancelled: true,
    }
}

async fn attempt_once(
    client: &Client,
    url: &str,
    agent: Option<&str>,
    timeout: Duration,
    policy: &RetryPolicy,
) -> Attempt {
    let mut request = client.get(url).timeout(timeout);
    if let Some(agent) = agent {
        request = request.header(USER_AGENT, agent);
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            return Attempt::Retry {
                reason: e.to_string(),
                wait: None,
            };
        }
    };

    let status = response.status();
    let rate_wait = if status == StatusCode::TOO_MANY_REQUESTS {
        Some(policy.rate_limit_delay(response.headers()))
    } else {
        None
    };

    if !(status.is_success() || status.is_redirection()) {
        return Attempt::Retry {
            reason: format!("HTTP {}", status.as_u16()),
            wait: rate_wait,
        };
    }

    let final_url = response.url().to_string();
    match response.text().await {
        Ok(body) if status.is_redirection() && body.trim().is_empty() => Attempt::Retry {
            reason: format!("HTTP {} without body", status.as_u16()),
            wait: None,
        },
        Ok(body) => {
            if status.is_redirection() {
                log::debug!("parsing {} body from url={}", status.as_u16(), url);
            }
            Attempt::Page(FetchedPage {
                url: final_url,
                status: status.as_u16(),
                body,
            })
        }
        Err(e) => Attempt::Retry {
            reason: format!("body read failed: {e}"),
            wait: None,
        },
    }
}
