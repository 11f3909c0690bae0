// src/error.rs

//! Unified error handling for the course crawler.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Page could not be fetched after all retries
    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Record store rejected an operation
    #[error("Store error: {0}")]
    Store(String),

    /// A notification channel failed to deliver
    #[error("Notify error on {channel}: {message}")]
    Notify { channel: String, message: String },

    /// Lookup by name or id found nothing
    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fetch error for a URL.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a store error.
    pub fn store(message: impl fmt::Display) -> Self {
        Self::Store(message.to_string())
    }

    /// Create a delivery error for a channel.
    pub fn notify(channel: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Notify {
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
