// src/ingest/types.rs
use time::OffsetDateTime;

use crate::config::FeedConfig;
use crate::error::FetchError;

/// One `<item>` as it came off the wire; every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub guid: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<String>,
    pub description: Option<String>,
}

/// A mission after extraction, ready for dedup and notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub link: String,
    pub pub_date: String,          // raw pubDate, kept verbatim in the state file
    pub published: Option<OffsetDateTime>, // UTC
    pub description: String,       // markup-free body
    pub content: String,           // body without budget/categories/view-link
    pub budget: String,
    pub categories: Vec<String>,
    pub feed_name: String,
    pub feed_color: u32,
}

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, feed: &FeedConfig) -> Result<Vec<RawEntry>, FetchError>;
}
