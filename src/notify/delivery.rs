// src/notify/delivery.rs

//! Outbound POST with rate-limit handling shared by the chat channels.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::utils::retry::{RetryPolicy, sleep_or_cancel};

/// Build a client with the channel's connect and read timeouts.
pub fn channel_client(connect_timeout_ms: u64, read_timeout_ms: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(connect_timeout_ms))
        .timeout(Duration::from_millis(connect_timeout_ms + read_timeout_ms))
        .build()?)
}

/// Send one payload, retrying on 429 up to `policy.max_retries` times.
///
/// `build` is called once per attempt so the same payload is re-sent.
/// Any other non-2xx status fails immediately, as does a cancelled 429 wait.
pub async fn send_with_backoff<F>(
    channel: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut build: F,
) -> Result<()>
where
    F: FnMut() -> RequestBuilder,
{
    let mut retries = 0;
    loop {
        let response = build()
            .send()
            .await
            .map_err(|e| AppError::notify(channel, e))?;
        let status = response.status();

        if status.is_success() {
            log::debug!("{}: delivered status={}", channel, status.as_u16());
            return Ok(());
        }

        if status == StatusCode::TOO_MANY_REQUESTS && retries < policy.max_retries {
            retries += 1;
            let wait = policy.rate_limit_delay(response.headers());
            log::warn!(
                "{}: 429 Too Many Requests (retry {}/{}), waiting {} ms",
                channel,
                retries,
                policy.max_retries,
                wait.as_millis()
            );
            if !sleep_or_cancel(wait, cancel).await {
                return Err(AppError::notify(channel, "cancelled while rate limited"));
            }
            continue;
        }

        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(300).collect();
        return Err(AppError::notify(
            channel,
            format!("HTTP {} after {} retries: {}", status.as_u16(), retries, snippet),
        ));
    }
}
