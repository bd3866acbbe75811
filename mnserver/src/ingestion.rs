use anyhow::{Context, Result};
use common::PolitenessConfig;
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use reqwest::Client;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::store::{Article, ArticleStore};

/// Category that gets a more specific label when it comes from an ARM feed.
const ANNOUNCEMENTS: &str = "Announcements";
const ARM_ANNOUNCEMENTS: &str = "ARM Announcements";
const ARM_URL_MARKER: &str = "arm";

/// Build the HTTP client shared by every fetcher for the life of the process.
pub fn build_http_client(politeness: &PolitenessConfig) -> Result<Client> {
    let user_agent = politeness
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("mnserver/{}", env!("CARGO_PKG_VERSION")));

    let mut builder = Client::builder().user_agent(user_agent);
    if let Some(secs) = politeness.fetch_timeout_seconds {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().context("failed to build reqwest client")
}

/// Fetches a feed from the given URL and parses it.
pub async fn fetch_and_parse_feed(client: &Client, url: &str) -> Result<Feed> {
    let response = client.get(url).send().await.context("failed to fetch feed")?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow::anyhow!("feed fetch failed with status: {}", status));
    }

    let bytes = response.bytes().await.context("failed to read response body")?;
    let feed = parser::parse(bytes.as_ref()).context("failed to parse feed")?;

    Ok(feed)
}

/// Category for an entry of the feed at `feed_url`: the first category the feed lists,
/// relabelled for announcements coming from an ARM feed.
pub fn resolve_category(raw: &str, feed_url: &str) -> String {
    if raw == ANNOUNCEMENTS && feed_url.contains(ARM_URL_MARKER) {
        ARM_ANNOUNCEMENTS.to_string()
    } else {
        raw.to_string()
    }
}

/// Convert a parsed feed entry into an [`Article`].
/// Returns `None` for entries without an id or without any timestamp.
pub fn article_from_entry(feed_url: &str, entry: &Entry) -> Option<Article> {
    if entry.id.is_empty() {
        return None;
    }
    let published_date = entry.published.or(entry.updated)?;
    let raw_category = entry
        .categories
        .first()
        .map(|c| c.term.as_str())
        .unwrap_or_default();

    Some(Article {
        id: entry.id.clone(),
        url: entry.links.first().map(|l| l.href.clone()).unwrap_or_default(),
        title: entry.title.as_ref().map(|t| t.content.clone()).unwrap_or_default(),
        category: resolve_category(raw_category, feed_url),
        published_date,
    })
}

/// Polls RSS/Atom feeds and adds unseen entries to the store.
#[derive(Clone)]
pub struct FeedFetcher {
    client: Client,
    store: ArticleStore,
}

impl FeedFetcher {
    pub fn new(client: Client, store: ArticleStore) -> Self {
        Self { client, store }
    }

    /// Fetch one feed and store its new entries. Returns how many were added.
    /// Failures are logged and leave the store untouched.
    pub async fn fetch_feed(&self, url: &str) -> usize {
        let feed = match fetch_and_parse_feed(&self.client, url).await {
            Ok(feed) => feed,
            Err(e) => {
                error!(%url, "error parsing news: {:#}", e);
                return 0;
            }
        };

        info!(%url, entries = feed.entries.len(), "getting news from feed");
        self.ingest_entries(url, &feed.entries)
    }

    /// Store every entry whose id has not been seen yet.
    pub fn ingest_entries(&self, feed_url: &str, entries: &[Entry]) -> usize {
        let mut added = 0;
        for entry in entries {
            if self.store.exists(&entry.id) {
                continue;
            }
            let Some(article) = article_from_entry(feed_url, entry) else {
                warn!(url = %feed_url, id = %entry.id, "skipping entry without id or date");
                continue;
            };
            let title = article.title.clone();
            if self.store.insert_if_absent(article) {
                info!(%title, "new article added");
                added += 1;
            }
        }
        added
    }
}
