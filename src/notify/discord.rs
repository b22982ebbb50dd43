// src/notify/discord.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::Span;

use super::{format_date_fr, truncate_content, CycleSummary, Notifier, CONTENT_PREVIEW_CHARS};
use crate::config::DiscordConfig;
use crate::error::DeliveryError;
use crate::ingest::types::Item;

/// Discord rejects messages with more embeds than this.
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;
pub const POST_TIMEOUT: Duration = Duration::from_secs(30);

const SUMMARY_COLOR: u32 = 0x3498db;
const TEST_COLOR: u32 = 0x00ff00;
const NO_CATEGORIES: &str = "Non spécifiées";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    fn new(name: &str, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            inline,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub embeds: Vec<Embed>,
}

/// Where payloads go. The HTTP implementation posts to the webhook; tests
/// plug in a recorder.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, payload: &WebhookPayload) -> Result<(), DeliveryError>;
}

pub struct HttpTransport {
    webhook: String,
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: POST_TIMEOUT,
        }
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(&self, payload: &WebhookPayload) -> Result<(), DeliveryError> {
        let rsp = self
            .client
            .post(&self.webhook)
            .header(reqwest::header::USER_AGENT, "RSSBot/1.0")
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await?;
        let status = rsp.status();
        if !status.is_success() {
            return Err(DeliveryError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }
}

pub struct DiscordNotifier<T: WebhookTransport = HttpTransport> {
    transport: T,
    username: Option<String>,
    avatar_url: Option<String>,
    span: Span,
}

impl DiscordNotifier<HttpTransport> {
    pub fn from_config(webhook: &str, cfg: &DiscordConfig, span: Span) -> Self {
        Self::with_transport(HttpTransport::new(webhook.to_string()), cfg, span)
    }
}

impl<T: WebhookTransport> DiscordNotifier<T> {
    pub fn with_transport(transport: T, cfg: &DiscordConfig, span: Span) -> Self {
        Self {
            transport,
            username: Some(cfg.username.clone()).filter(|u| !u.trim().is_empty()),
            avatar_url: cfg.avatar_url.clone().filter(|u| !u.trim().is_empty()),
            span,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn payload(&self, embeds: Vec<Embed>) -> WebhookPayload {
        WebhookPayload {
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
            embeds,
        }
    }
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn mission_embed(item: &Item) -> Embed {
    let categories = if item.categories.is_empty() {
        NO_CATEGORIES.to_string()
    } else {
        item.categories.join(", ")
    };

    Embed {
        title: item.title.clone(),
        url: Some(item.link.clone()),
        color: Some(item.feed_color),
        description: Some(truncate_content(&item.content, CONTENT_PREVIEW_CHARS)),
        fields: vec![
            EmbedField::new("💰 Budget", item.budget.clone(), true),
            EmbedField::new("🏷️ Catégories", categories, true),
            EmbedField::new("📡 Source", item.feed_name.clone(), true),
            EmbedField::new("📅 Publié le", format_date_fr(item.published), false),
        ],
        footer: Some(EmbedFooter {
            text: "Codeur.com • Nouvelle mission disponible".to_string(),
            icon_url: Some("https://www.codeur.com/favicon.ico".to_string()),
        }),
        timestamp: Some(now_iso()),
    }
}

fn summary_embed(summary: &CycleSummary) -> Embed {
    Embed {
        title: "📊 Résumé de surveillance".to_string(),
        color: Some(SUMMARY_COLOR),
        fields: vec![
            EmbedField::new("Nouvelles missions trouvées", summary.total_new.to_string(), true),
            EmbedField::new("Flux surveillés", summary.feed_names.join(", "), true),
        ],
        footer: Some(EmbedFooter {
            text: "Bot Surveillance Codeur.com".to_string(),
            icon_url: None,
        }),
        timestamp: Some(now_iso()),
        ..Default::default()
    }
}

fn test_embed() -> Embed {
    Embed {
        title: "🧪 Test de connexion".to_string(),
        color: Some(TEST_COLOR),
        description: Some(
            "Le bot de surveillance des missions Codeur.com est opérationnel !".to_string(),
        ),
        footer: Some(EmbedFooter {
            text: "Test de configuration".to_string(),
            icon_url: None,
        }),
        timestamp: Some(now_iso()),
        ..Default::default()
    }
}

#[async_trait]
impl<T: WebhookTransport> Notifier for DiscordNotifier<T> {
    async fn send_item(&self, item: &Item) -> Result<(), DeliveryError> {
        let payload = self.payload(vec![mission_embed(item)]);
        match self.transport.post(&payload).await {
            Ok(()) => {
                tracing::info!(parent: &self.span, id = %item.id, title = %item.title, "notification sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(parent: &self.span, id = %item.id, error = %e, "notification failed");
                Err(e)
            }
        }
    }

    async fn send_batch(&self, items: &[Item]) -> usize {
        let mut delivered = 0usize;
        for (n, chunk) in items.chunks(MAX_EMBEDS_PER_MESSAGE).enumerate() {
            let payload = self.payload(chunk.iter().map(mission_embed).collect());
            match self.transport.post(&payload).await {
                Ok(()) => {
                    delivered += chunk.len();
                    tracing::info!(parent: &self.span, chunk = n, sent = chunk.len(), "mission batch sent");
                }
                Err(e) => {
                    let ids: Vec<&str> = chunk.iter().map(|i| i.id.as_str()).collect();
                    tracing::error!(parent: &self.span, chunk = n, ?ids, error = %e, "mission batch failed");
                }
            }
        }
        delivered
    }

    async fn send_summary(&self, summary: &CycleSummary) -> Result<(), DeliveryError> {
        let payload = self.payload(vec![summary_embed(summary)]);
        self.transport.post(&payload).await.map_err(|e| {
            tracing::error!(parent: &self.span, error = %e, "summary failed");
            e
        })
    }

    async fn send_test(&self) -> Result<(), DeliveryError> {
        let payload = self.payload(vec![test_embed()]);
        match self.transport.post(&payload).await {
            Ok(()) => {
                tracing::info!(parent: &self.span, "webhook test succeeded");
                Ok(())
            }
            Err(e) => {
                tracing::error!(parent: &self.span, error = %e, "webhook test failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> Item {
        Item {
            id: "7".into(),
            title: "Application mobile".into(),
            link: "https://www.codeur.com/projects/7".into(),
            pub_date: String::new(),
            published: None,
            description: String::new(),
            content: "x".repeat(320),
            budget: "1 000 € à 10 000 €".into(),
            categories: vec![],
            feed_name: "Mobile".into(),
            feed_color: 0x9b59b6,
        }
    }

    #[test]
    fn mission_embed_fields() {
        let e = mission_embed(&item());
        assert_eq!(e.color, Some(0x9b59b6));
        assert_eq!(e.description.as_deref().map(|d| d.chars().count()), Some(303));
        assert_eq!(e.fields[0].value, "1 000 € à 10 000 €");
        assert_eq!(e.fields[1].value, NO_CATEGORIES);
        assert_eq!(e.fields[2].value, "Mobile");
        assert_eq!(e.fields[3].value, "Date inconnue");
        assert!(!e.fields[3].inline);
    }

    #[test]
    fn payload_omits_absent_identity() {
        let p = WebhookPayload {
            username: Some("Bot".into()),
            avatar_url: None,
            embeds: vec![test_embed()],
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["username"], "Bot");
        assert!(v.get("avatar_url").is_none());
        assert!(v["embeds"][0].get("fields").is_none());
        assert_eq!(v["embeds"][0]["color"], 0x00ff00);
    }
}
