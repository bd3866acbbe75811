/*
mnserver - single-binary main.rs
This binary starts the Rocket HTTP server and runs the feed poller inside the same process.
*/

use anyhow::Context;
use clap::Parser;
use common::{split_feed_urls, Config};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use mnserver::ingestion::{build_http_client, FeedFetcher};
use mnserver::scheduler::Poller;
use mnserver::scraping::{TimelineCollector, TimelineFetcher};
use mnserver::server::launch_rocket;
use mnserver::store::ArticleStore;

#[derive(Parser, Debug)]
#[command(name = "mnserver", about = "News feed aggregator serving POST /news")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// The RSS feed URL, or several separated by ';'
    #[arg(long, value_name = "URL")]
    feed_url: Option<String>,

    /// Timeline page to scrape on every refresh
    #[arg(long, value_name = "URL")]
    twitter_url: Option<String>,

    /// The interval (in seconds) in which we check for new articles
    #[arg(long, value_name = "SECONDS")]
    refresh_interval: Option<u64>,

    /// Port for the HTTP listener
    #[arg(long)]
    port: Option<u16>,

    /// Address for the HTTP listener
    #[arg(long)]
    address: Option<String>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Command-line flags win over anything read from configuration files.
fn apply_cli_overrides(config: &mut Config, args: &Args) {
    if let Some(raw) = &args.feed_url {
        config.sources.feed_urls = split_feed_urls(raw);
    }
    if let Some(url) = &args.twitter_url {
        config.sources.timeline_url = Some(url.clone()).filter(|u| !u.trim().is_empty());
    }
    if let Some(secs) = args.refresh_interval {
        config.scheduler.refresh_interval_seconds = secs;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(address) = &args.address {
        config.server.address = address.clone();
    }
}

async fn load_config(args: &Args) -> anyhow::Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = match &args.config {
        Some(p) if !p.exists() => {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p) => Some(p.clone()),
        None => Some(PathBuf::from("config.toml")),
    };

    let mut config =
        Config::load_with_defaults(Some(default_path.as_path()), override_path.as_deref()).await?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    apply_cli_overrides(&mut config, args);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = match load_config(&args).await {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("failed to load configuration: {:#}", e);
            return Err(e);
        }
    };

    // Parser client and scraper are built once and shared read-only afterwards
    let client = build_http_client(&config.politeness)?;
    let store = ArticleStore::new();

    let poller = Poller::new(
        FeedFetcher::new(client.clone(), store.clone()),
        TimelineFetcher::new(TimelineCollector::new(client)?, store.clone()),
        config.sources.feed_urls.clone(),
        config.sources.timeline_url.clone(),
        config.refresh_interval(),
    );

    info!("Spawning feed poller task");
    let poller_handle = tokio::spawn(poller.run());

    info!("Launching Rocket HTTP server");
    let served = launch_rocket(&config.server, store).await;

    poller_handle.abort();
    if let Err(e) = served {
        error!("HTTP server failed: {:#}", e);
        return Err(e);
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_config() {
        let args = Args::parse_from([
            "mnserver",
            "--feed-url",
            "https://a.example/rss;https://b.example/arm.rss",
            "--twitter-url",
            "https://twitter.com/manjarolinux",
            "--refresh-interval",
            "30",
            "--port",
            "8080",
        ]);
        let mut config = Config::default();
        apply_cli_overrides(&mut config, &args);

        assert_eq!(config.sources.feed_urls.len(), 2);
        assert_eq!(
            config.sources.timeline_url.as_deref(),
            Some("https://twitter.com/manjarolinux")
        );
        assert_eq!(config.scheduler.refresh_interval_seconds, 30);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.address, "0.0.0.0");
    }

    #[test]
    fn absent_flags_keep_config_values() {
        let args = Args::parse_from(["mnserver"]);
        let mut config = Config::default();
        apply_cli_overrides(&mut config, &args);
        assert_eq!(config, Config::default());
    }
}
