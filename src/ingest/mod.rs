// src/ingest/mod.rs
pub mod rss;
pub mod types;

use once_cell::sync::OnceCell;
use regex::Regex;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::config::FeedConfig;
use crate::error::ExtractionError;
use crate::extract;
use crate::ingest::types::{Item, RawEntry};

/// Flatten an HTML description to text. Block boundaries become line breaks
/// so the metadata line and the view-link stay on their own lines.
pub fn html_to_text(s: &str) -> String {
    static RE_BLOCK: OnceCell<Regex> = OnceCell::new();
    let re_block = RE_BLOCK.get_or_init(|| {
        Regex::new(r"(?i)<\s*/?\s*(br|p|div|li|ul|ol|h[1-6])\b[^>]*>").expect("block tag regex")
    });
    let out = re_block.replace_all(s, "\n");

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let out = re_tags.replace_all(&out, "");

    // Entities last, so an encoded `&lt;` never turns into a tag.
    let out = html_escape::decode_html_entities(&out).replace('\u{00A0}', " ");

    static RE_HSPACE: OnceCell<Regex> = OnceCell::new();
    let re_hspace = RE_HSPACE.get_or_init(|| Regex::new(r"[ \t]+").expect("space regex"));

    out.lines()
        .map(|line| re_hspace.replace_all(line.trim(), " ").into_owned())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn parse_rfc2822_utc(ts: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC))
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ExtractionError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ExtractionError::MissingField(field))
}

/// Turn a raw entry into an [`Item`]. `guid`, `title` and `link` are
/// required; a missing date or body degrades to empty.
pub fn assemble_item(raw: RawEntry, feed: &FeedConfig) -> Result<Item, ExtractionError> {
    let id = required(raw.guid, "guid")?;
    let title = required(raw.title, "title")?;
    let link = required(raw.link, "link")?;

    let pub_date = raw.published.unwrap_or_default();
    let published = parse_rfc2822_utc(&pub_date);

    let description = html_to_text(raw.description.as_deref().unwrap_or_default());
    let meta = extract::extract(&description);
    let content = extract::strip_metadata(&description);

    Ok(Item {
        id,
        title: html_escape::decode_html_entities(&title).into_owned(),
        link,
        pub_date,
        published,
        description,
        content,
        budget: meta.budget,
        categories: meta.categories,
        feed_name: feed.name.clone(),
        feed_color: feed.color,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> FeedConfig {
        FeedConfig {
            name: "Développement".into(),
            url: "https://www.codeur.com/projects.rss".into(),
            color: 0x3498db,
        }
    }

    #[test]
    fn html_is_flattened_line_by_line() {
        let html = "<p>Création d&#39;une&nbsp;API</p><p>Budget : 500 € - Catégories : API</p><p><a href=\"x\">Voir ce projet sur Codeur</a></p>";
        assert_eq!(
            html_to_text(html),
            "Création d'une API\nBudget : 500 € - Catégories : API\nVoir ce projet sur Codeur"
        );
    }

    #[test]
    fn encoded_tags_survive_as_text() {
        assert_eq!(html_to_text("a &lt;b&gt; c"), "a <b> c");
    }

    #[test]
    fn assemble_full_entry() {
        let raw = RawEntry {
            guid: Some(" 42 ".into()),
            title: Some("Site &amp; API".into()),
            link: Some("https://www.codeur.com/projects/42".into()),
            published: Some("Tue, 14 Oct 2025 09:30:00 +0200".into()),
            description: Some(
                "<p>Refonte complète.</p><p>Budget : Moins de 500 € - Catégories : Développement spécifique, API</p>"
                    .into(),
            ),
        };
        let item = assemble_item(raw, &feed()).expect("complete entry");
        assert_eq!(item.id, "42");
        assert_eq!(item.title, "Site & API");
        assert_eq!(item.budget, "Moins de 500 €");
        assert_eq!(item.categories, vec!["Développement spécifique", "API"]);
        assert_eq!(item.content, "Refonte complète.");
        assert_eq!(item.feed_name, "Développement");
        let published = item.published.expect("rfc2822 date");
        assert_eq!(published.hour(), 7);
        assert_eq!(published.minute(), 30);
    }

    #[test]
    fn missing_guid_is_an_extraction_error() {
        let raw = RawEntry {
            title: Some("t".into()),
            link: Some("l".into()),
            ..Default::default()
        };
        assert!(matches!(
            assemble_item(raw, &feed()),
            Err(ExtractionError::MissingField("guid"))
        ));
    }

    #[test]
    fn missing_date_and_body_degrade() {
        let raw = RawEntry {
            guid: Some("1".into()),
            title: Some("t".into()),
            link: Some("l".into()),
            ..Default::default()
        };
        let item = assemble_item(raw, &feed()).unwrap();
        assert!(item.published.is_none());
        assert_eq!(item.budget, extract::BUDGET_FALLBACK);
        assert!(item.content.is_empty());
    }
}
