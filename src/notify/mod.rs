// src/notify/mod.rs
pub mod discord;

use time::OffsetDateTime;

use crate::error::DeliveryError;
use crate::ingest::types::Item;

/// Longest content shown in a notification before it is cut.
pub const CONTENT_PREVIEW_CHARS: usize = 300;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub total_new: usize,
    pub feed_names: Vec<String>,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send_item(&self, item: &Item) -> Result<(), DeliveryError>;

    /// Deliver `items` in as many messages as the transport requires.
    /// Returns how many items went out; a failed message is not retried.
    async fn send_batch(&self, items: &[Item]) -> usize;

    async fn send_summary(&self, summary: &CycleSummary) -> Result<(), DeliveryError>;

    /// Connectivity check used by `--test`.
    async fn send_test(&self) -> Result<(), DeliveryError>;
}

pub fn truncate_content(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

const MONTHS_FR: [&str; 12] = [
    "janvier",
    "février",
    "mars",
    "avril",
    "mai",
    "juin",
    "juillet",
    "août",
    "septembre",
    "octobre",
    "novembre",
    "décembre",
];

/// `14 octobre 2025 à 07h30`, or `Date inconnue`.
pub fn format_date_fr(dt: Option<OffsetDateTime>) -> String {
    let Some(dt) = dt else {
        return "Date inconnue".to_string();
    };
    let month = MONTHS_FR[usize::from(u8::from(dt.month())) - 1];
    format!(
        "{} {} {} à {:02}h{:02}",
        dt.day(),
        month,
        dt.year(),
        dt.hour(),
        dt.minute()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let s = "é".repeat(301);
        let out = truncate_content(&s, CONTENT_PREVIEW_CHARS);
        assert_eq!(out.chars().count(), 303);
        assert!(out.ends_with("..."));
        assert_eq!(truncate_content("court", CONTENT_PREVIEW_CHARS), "court");
    }

    #[test]
    fn french_dates() {
        assert_eq!(
            format_date_fr(Some(datetime!(2025-08-03 07:05 UTC))),
            "3 août 2025 à 07h05"
        );
        assert_eq!(format_date_fr(None), "Date inconnue");
    }
}
