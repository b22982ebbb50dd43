// src/ingest/rss.rs
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::Span;

use crate::config::FeedConfig;
use crate::error::FetchError;
use crate::ingest::types::{FeedSource, RawEntry};

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    guid: Option<Guid>,
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

// <guid isPermaLink="false">…</guid>; the attribute is ignored.
#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub entries: Vec<RawEntry>,
    /// Set when the document needed repairs before it would parse.
    pub malformed: bool,
}

/// Parse an RSS 2.0 document. HTML entities unknown to XML are rewritten
/// first and flag the feed as malformed.
pub fn parse_feed_str(xml: &str) -> Result<ParsedFeed, FetchError> {
    let clean = scrub_html_entities_for_xml(xml);
    let malformed = clean != xml;
    let rss: Rss = from_str(&clean)?;

    let entries = rss
        .channel
        .item
        .into_iter()
        .map(|it| RawEntry {
            guid: it.guid.and_then(|g| g.value),
            title: it.title,
            link: it.link,
            published: it.pub_date,
            description: it.description,
        })
        .collect();

    Ok(ParsedFeed { entries, malformed })
}

/// Rewrite named HTML entities XML does not define as numeric references.
/// Names that are not HTML entities either are dropped.
fn scrub_html_entities_for_xml(s: &str) -> String {
    static RE_ENTITY: OnceCell<Regex> = OnceCell::new();
    let re = RE_ENTITY
        .get_or_init(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]*);").expect("entity regex"));

    re.replace_all(s, |caps: &Captures| {
        let whole = &caps[0];
        if matches!(&caps[1], "amp" | "lt" | "gt" | "quot" | "apos") {
            return whole.to_string();
        }
        let decoded = html_escape::decode_html_entities(whole);
        if decoded == whole {
            return String::new();
        }
        decoded.chars().map(|c| format!("&#{};", u32::from(c))).collect()
    })
    .into_owned()
}

pub struct HttpFeedSource {
    client: reqwest::Client,
    span: Span,
}

impl HttpFeedSource {
    pub fn new(span: Span) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(Self { client, span })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, feed: &FeedConfig) -> Result<Vec<RawEntry>, FetchError> {
        tracing::info!(parent: &self.span, feed = %feed.name, url = %feed.url, "fetching feed");

        let resp = self.client.get(&feed.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        let body = resp.text().await?;

        let parsed = parse_feed_str(&body)?;
        if parsed.malformed {
            tracing::warn!(parent: &self.span, feed = %feed.name, "feed is possibly malformed, parsed best-effort");
        }
        tracing::info!(parent: &self.span, feed = %feed.name, entries = parsed.entries.len(), "feed parsed");
        Ok(parsed.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_items_with_guid_attribute_and_cdata() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Codeur</title>
<item>
  <title>Site vitrine</title>
  <link>https://www.codeur.com/projects/1</link>
  <guid isPermaLink="false">codeur-1</guid>
  <pubDate>Tue, 14 Oct 2025 09:30:00 +0200</pubDate>
  <description><![CDATA[<p>Budget : 500 € - Catégories : WordPress</p>]]></description>
</item>
<item><title>Sans guid</title><link>https://www.codeur.com/projects/2</link></item>
</channel></rss>"#;
        let feed = parse_feed_str(xml).expect("valid rss");
        assert!(!feed.malformed);
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[0].guid.as_deref(), Some("codeur-1"));
        assert!(feed.entries[0]
            .description
            .as_deref()
            .unwrap()
            .contains("Catégories"));
        assert_eq!(feed.entries[1].guid, None);
    }

    #[test]
    fn html_entities_mark_feed_malformed() {
        let xml = "<rss><channel><item><title>a&nbsp;b</title></item></channel></rss>";
        let feed = parse_feed_str(xml).expect("repaired rss");
        assert!(feed.malformed);
        assert_eq!(feed.entries[0].title.as_deref(), Some("a\u{a0}b"));
    }

    #[test]
    fn any_html_entity_is_repaired() {
        let xml = "<rss><channel>\
<item><title>Fa&ccedil;ade &amp; toiture&hellip;</title><guid>1</guid></item>\
<item><title>For&ecirc;t &bogus; c&ocirc;te</title><guid>2</guid></item>\
</channel></rss>";
        let feed = parse_feed_str(xml).expect("repaired rss");
        assert!(feed.malformed);
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[0].title.as_deref(), Some("Façade & toiture…"));
        assert_eq!(feed.entries[1].title.as_deref(), Some("Forêt  côte"));
    }

    #[test]
    fn xml_entities_are_left_alone() {
        let xml = "<rss><channel><item><title>a &lt;b&gt; &quot;c&quot;</title></item></channel></rss>";
        let feed = parse_feed_str(xml).unwrap();
        assert!(!feed.malformed);
        assert_eq!(feed.entries[0].title.as_deref(), Some("a <b> \"c\""));
    }

    #[test]
    fn empty_channel_has_no_entries() {
        let feed = parse_feed_str("<rss><channel><title>x</title></channel></rss>").unwrap();
        assert!(feed.entries.is_empty());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_feed_str("not xml at all"),
            Err(FetchError::Parse(_))
        ));
    }
}
