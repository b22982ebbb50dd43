// src/error.rs
//! Error classes, one per unit of work. Only `ConfigError` is fatal; the
//! others are caught by the monitor and confined to one feed, item, batch
//! or save attempt.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
    #[error("Discord webhook URL is not configured (set DISCORD_WEBHOOK_URL or discord.webhook_url)")]
    MissingWebhook,
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("feed returned HTTP {0}")]
    HttpStatus(u16),
    #[error("feed xml parse error: {0}")]
    Parse(#[from] quick_xml::DeError),
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("entry has no {0}")]
    MissingField(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook returned HTTP {0}")]
    HttpStatus(u16),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("state io on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
