/*!
common/src/lib.rs

Shared configuration types and helpers for mnserver.

This file provides:
- Config data structures (deserialized from TOML, every section optional)
- An async loader for a TOML config file, with default/override merging
- Helpers to turn the CLI form of the feed list into a clean URL list
*/

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Feed polled when nothing else is configured.
pub const DEFAULT_FEED_URL: &str = "https://forum.manjaro.org/c/announcements.rss";

/// HTTP listener configuration section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to (e.g. "0.0.0.0")
    pub address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 10111,
        }
    }
}

/// Sources polled on every tick
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    /// RSS/Atom feeds, fetched in this order
    pub feed_urls: Vec<String>,
    /// Scraped timeline page; no timeline fetch happens when unset
    pub timeline_url: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            feed_urls: vec![DEFAULT_FEED_URL.to_string()],
            timeline_url: None,
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub refresh_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: 600,
        }
    }
}

/// Politeness / fetching configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PolitenessConfig {
    /// Per-request timeout. Requests are not bounded when unset.
    pub fetch_timeout_seconds: Option<u64>,
    pub user_agent: Option<String>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sources: SourcesConfig,
    pub scheduler: SchedulerConfig,
    pub politeness: PolitenessConfig,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence). Files that do not
    /// exist are skipped, so with neither present the built-in defaults are returned.
    pub async fn load_with_defaults(
        default_path: Option<&Path>,
        override_path: Option<&Path>,
    ) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value
            .try_into()
            .context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Check values that would make the service misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.refresh_interval_seconds == 0 {
            bail!("scheduler.refresh_interval_seconds must be greater than zero");
        }
        for feed in &self.sources.feed_urls {
            Url::parse(feed).with_context(|| format!("Invalid feed URL: {}", feed))?;
        }
        if let Some(timeline) = &self.sources.timeline_url {
            Url::parse(timeline).with_context(|| format!("Invalid timeline URL: {}", timeline))?;
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.refresh_interval_seconds)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Split the semicolon-separated feed list accepted on the command line.
/// Entries are trimmed and empty ones dropped; order is preserved.
pub fn split_feed_urls(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn config_from_string_fills_defaults() {
        let toml = r#"
            [sources]
            feed_urls = ["https://example.org/a.rss", "https://example.org/arm.rss"]
            timeline_url = "https://twitter.com/manjarolinux"
        "#;

        let cfg: Config = toml::from_str(toml).expect("parse config");
        assert_eq!(cfg.sources.feed_urls.len(), 2);
        assert_eq!(
            cfg.sources.timeline_url.as_deref(),
            Some("https://twitter.com/manjarolinux")
        );
        assert_eq!(cfg.server.port, 10111);
        assert_eq!(cfg.scheduler.refresh_interval_seconds, 600);
        assert!(cfg.politeness.fetch_timeout_seconds.is_none());
        cfg.validate().expect("valid config");
    }

    #[test]
    fn empty_file_is_default_config() {
        let cfg: Config = toml::from_str("").expect("parse empty");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.sources.feed_urls, vec![DEFAULT_FEED_URL.to_string()]);
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(600));
    }

    #[test]
    fn validate_rejects_zero_interval_and_bad_urls() {
        let mut cfg = Config::default();
        cfg.scheduler.refresh_interval_seconds = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.sources.feed_urls = vec!["not a url".to_string()];
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.sources.timeline_url = Some("::".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn split_feed_urls_skips_empty_entries() {
        let urls = split_feed_urls("https://a.example/rss;; https://b.example/arm.rss ;");
        assert_eq!(
            urls,
            vec![
                "https://a.example/rss".to_string(),
                "https://b.example/arm.rss".to_string()
            ]
        );
        assert!(split_feed_urls("").is_empty());
    }

    #[tokio::test]
    async fn override_file_wins_over_default_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let default_path = dir.path().join("config.default.toml");
        let override_path = dir.path().join("config.toml");
        fs::write(
            &default_path,
            "[server]\nport = 8000\naddress = \"127.0.0.1\"\n[scheduler]\nrefresh_interval_seconds = 60\n",
        )
        .expect("write default");
        fs::write(&override_path, "[server]\nport = 9000\n").expect("write override");

        let cfg = Config::load_with_defaults(Some(default_path.as_path()), Some(override_path.as_path()))
            .await
            .expect("load");
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.address, "127.0.0.1");
        assert_eq!(cfg.scheduler.refresh_interval_seconds, 60);
    }

    #[tokio::test]
    async fn missing_files_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");
        let cfg = Config::load_with_defaults(Some(missing.as_path()), None)
            .await
            .expect("load");
        assert_eq!(cfg, Config::default());

        assert!(Config::from_file(&missing).await.is_err());
    }
}
