// src/config.rs
//! Bot configuration: one file (YAML, TOML or JSON by extension) plus
//! environment overrides. `.env` is loaded by the binary before [`Config::load`].

use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const MAX_RETENTION_DAYS: i64 = 36_500;
const WEBHOOK_PLACEHOLDER: &str = "https://discord.com/api/webhooks/YOUR_WEBHOOK_URL";

const ENV_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";
const ENV_USERNAME: &str = "DISCORD_USERNAME";
const ENV_AVATAR_URL: &str = "DISCORD_AVATAR_URL";
const ENV_INTERVAL: &str = "CHECK_INTERVAL_MINUTES";
const ENV_MAX_ITEMS: &str = "MAX_ITEMS_PER_CHECK";
const ENV_DATA_FILE: &str = "DATA_FILE";
const ENV_RETENTION: &str = "RETENTION_DAYS";

fn default_username() -> String {
    "Bot Missions Codeur".to_string()
}
fn default_interval() -> u64 {
    5
}
fn default_max_items() -> usize {
    10
}
fn default_retention() -> i64 {
    30
}
fn default_data_file() -> PathBuf {
    PathBuf::from("missions_seen.json")
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default, deserialize_with = "deserialize_color")]
    pub color: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurveillanceConfig {
    #[serde(default = "default_interval")]
    pub check_interval_minutes: u64,
    #[serde(default = "default_max_items")]
    pub max_items_per_check: usize,
    #[serde(default)]
    pub send_summary: bool,
    #[serde(default = "default_retention")]
    pub retention_days: i64,
}

impl Default for SurveillanceConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: default_interval(),
            max_items_per_check: default_max_items(),
            send_summary: false,
            retention_days: default_retention(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rss_feeds: Vec<FeedConfig>,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub surveillance: SurveillanceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Read the file, apply env overrides and validate everything except the
    /// webhook (see [`Config::webhook_url`]), which offline modes never need.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let format = Format::from_extension(&ext)?;

        let mut cfg = parse_config(&content, format).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overrides come from `lookup` so tests need not touch the process env.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_WEBHOOK_URL) {
            self.discord.webhook_url = Some(v);
        }
        if let Some(v) = get(ENV_USERNAME) {
            self.discord.username = v;
        }
        if let Some(v) = get(ENV_AVATAR_URL) {
            self.discord.avatar_url = Some(v);
        }
        if let Some(v) = get(ENV_INTERVAL) {
            self.surveillance.check_interval_minutes = parse_env(ENV_INTERVAL, v)?;
        }
        if let Some(v) = get(ENV_MAX_ITEMS) {
            self.surveillance.max_items_per_check = parse_env(ENV_MAX_ITEMS, v)?;
        }
        if let Some(v) = get(ENV_RETENTION) {
            self.surveillance.retention_days = parse_env(ENV_RETENTION, v)?;
        }
        if let Some(v) = get(ENV_DATA_FILE) {
            self.storage.data_file = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rss_feeds.is_empty() {
            return Err(ConfigError::Invalid("no rss_feeds configured".into()));
        }
        if let Some(f) = self.rss_feeds.iter().find(|f| f.url.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("feed {:?} has no url", f.name)));
        }
        if self.surveillance.check_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "check_interval_minutes must be at least 1".into(),
            ));
        }
        if self.surveillance.max_items_per_check == 0 {
            return Err(ConfigError::Invalid(
                "max_items_per_check must be at least 1".into(),
            ));
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.surveillance.retention_days) {
            return Err(ConfigError::Invalid(format!(
                "retention_days must be between 1 and {MAX_RETENTION_DAYS}"
            )));
        }
        Ok(())
    }

    /// The configured webhook, rejecting the sample placeholder.
    pub fn webhook_url(&self) -> Result<&str, ConfigError> {
        match self.discord.webhook_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() && url != WEBHOOK_PLACEHOLDER => Ok(url),
            _ => Err(ConfigError::MissingWebhook),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    let parsed = value.trim().parse().ok();
    parsed.ok_or(ConfigError::InvalidEnv { key, value })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Toml,
    Json,
}

impl Format {
    fn from_extension(ext: &str) -> Result<Self, ConfigError> {
        match ext {
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

fn parse_config(s: &str, format: Format) -> Result<Config, String> {
    match format {
        Format::Yaml => serde_yaml::from_str(s).map_err(|e| e.to_string()),
        Format::Toml => toml::from_str(s).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(s).map_err(|e| e.to_string()),
    }
}

/// Colors are written as integers (`0x3498db` in YAML) or as `"#3498db"` /
/// `"0x3498db"` strings.
fn deserialize_color<'de, D>(de: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u32),
        Text(String),
    }

    match Raw::deserialize(de)? {
        Raw::Int(v) => Ok(v),
        Raw::Text(s) => {
            let t = s.trim();
            let hex = t
                .strip_prefix('#')
                .or_else(|| t.strip_prefix("0x"))
                .or_else(|| t.strip_prefix("0X"));
            match hex {
                Some(h) => u32::from_str_radix(h, 16),
                None => t.parse(),
            }
            .map_err(|_| serde::de::Error::custom(format!("invalid color {s:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const YAML: &str = r##"
rss_feeds:
  - name: "Développement"
    url: "https://www.codeur.com/projects/c/developpement.rss"
    color: 0x3498db
  - name: "Design"
    url: "https://www.codeur.com/projects/c/design.rss"
    color: "#e67e22"
discord:
  webhook_url: "https://discord.com/api/webhooks/YOUR_WEBHOOK_URL"
surveillance:
  check_interval_minutes: 10
  max_items_per_check: 5
storage:
  data_file: "state/missions.json"
"##;

    #[test]
    fn yaml_with_defaults_and_colors() {
        let cfg = parse_config(YAML, Format::Yaml).unwrap();
        assert_eq!(cfg.rss_feeds.len(), 2);
        assert_eq!(cfg.rss_feeds[0].color, 0x3498db);
        assert_eq!(cfg.rss_feeds[1].color, 0xe67e22);
        assert_eq!(cfg.discord.username, "Bot Missions Codeur");
        assert_eq!(cfg.surveillance.max_items_per_check, 5);
        assert_eq!(cfg.surveillance.retention_days, 30);
        assert!(!cfg.surveillance.send_summary);
        assert_eq!(cfg.storage.data_file, PathBuf::from("state/missions.json"));
        cfg.validate().unwrap();
    }

    #[test]
    fn placeholder_webhook_is_rejected() {
        let cfg = parse_config(YAML, Format::Yaml).unwrap();
        assert!(matches!(cfg.webhook_url(), Err(ConfigError::MissingWebhook)));
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut cfg = parse_config(YAML, Format::Yaml).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_WEBHOOK_URL, "https://discord.com/api/webhooks/1/abc"),
            (ENV_INTERVAL, "15"),
            (ENV_MAX_ITEMS, "3"),
            (ENV_DATA_FILE, "/tmp/seen.json"),
            (ENV_USERNAME, "  "),
        ]);
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(
            cfg.webhook_url().unwrap(),
            "https://discord.com/api/webhooks/1/abc"
        );
        assert_eq!(cfg.surveillance.check_interval_minutes, 15);
        assert_eq!(cfg.surveillance.max_items_per_check, 3);
        assert_eq!(cfg.storage.data_file, PathBuf::from("/tmp/seen.json"));
        // blank values are ignored
        assert_eq!(cfg.discord.username, "Bot Missions Codeur");
    }

    #[test]
    fn bad_numeric_override_is_config_error() {
        let mut cfg = parse_config(YAML, Format::Yaml).unwrap();
        let err = cfg
            .apply_env(|k| (k == ENV_INTERVAL).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: ENV_INTERVAL, .. }));
    }

    #[test]
    fn toml_and_json_formats_work() {
        let toml = r#"
[[rss_feeds]]
name = "Dev"
url = "https://example.com/dev.rss"
color = 255
"#;
        let json = r#"{"rss_feeds":[{"name":"Dev","url":"https://example.com/dev.rss","color":"0xff"}]}"#;
        assert_eq!(parse_config(toml, Format::Toml).unwrap().rss_feeds[0].color, 255);
        assert_eq!(parse_config(json, Format::Json).unwrap().rss_feeds[0].color, 255);
        assert!(matches!(
            Format::from_extension("ini"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn empty_feed_list_fails_validation() {
        let cfg = parse_config("discord: {}", Format::Yaml).unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn retention_window_is_bounded() {
        let mut cfg = parse_config(YAML, Format::Yaml).unwrap();
        cfg.surveillance.retention_days = MAX_RETENTION_DAYS;
        cfg.validate().unwrap();

        cfg.apply_env(|k| (k == ENV_RETENTION).then(|| "1000000000".to_string()))
            .unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        cfg.surveillance.retention_days = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }
}
