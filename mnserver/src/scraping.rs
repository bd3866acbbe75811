use anyhow::{anyhow, Context, Result};
use chrono::{TimeZone, Utc};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{error, info, warn};
use url::Url;

use crate::store::{Article, ArticleStore};

/// Category given to every timeline entry.
pub const TIMELINE_CATEGORY: &str = "Twitter";
pub const TITLE_MARKER: &str = "[Twitter] ";
/// Longest title text kept, in characters, before the marker is prepended.
pub const MAX_TITLE_CHARS: usize = 80;
const ELLIPSIS: &str = "...";

const ENTRY_SELECTOR: &str = "li[id^='stream-item-tweet']";
const TIMESTAMP_SELECTOR: &str = "span._timestamp";
const TEXT_SELECTOR: &str = ".js-tweet-text-container";
const PERMALINK_SELECTOR: &str = "div.tweet";

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {}: {:?}", css, e))
}

struct TimelineSelectors {
    entry: Selector,
    timestamp: Selector,
    text: Selector,
    permalink: Selector,
}

/// One matched timeline entry, handed to the visitor during [`TimelineCollector::visit`].
pub struct TimelineElement<'a> {
    element: ElementRef<'a>,
    selectors: &'a TimelineSelectors,
}

impl<'a> TimelineElement<'a> {
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    fn child_attr(&self, selector: &Selector, name: &str) -> Option<&'a str> {
        self.element
            .select(selector)
            .find_map(|child| child.value().attr(name))
    }

    fn child_text(&self, selector: &Selector) -> String {
        let text: String = self
            .element
            .select(selector)
            .flat_map(|child| child.text())
            .collect();
        text.trim().to_string()
    }

    /// Stable entry id (`data-item-id`).
    pub fn id(&self) -> Option<&'a str> {
        self.attr("data-item-id").filter(|id| !id.is_empty())
    }

    /// Raw `data-time` value of the entry's timestamp span.
    pub fn timestamp(&self) -> Option<&'a str> {
        self.child_attr(&self.selectors.timestamp, "data-time")
    }

    pub fn text(&self) -> String {
        self.child_text(&self.selectors.text)
    }

    pub fn permalink_path(&self) -> Option<&'a str> {
        self.child_attr(&self.selectors.permalink, "data-permalink-path")
    }
}

/// Fetches timeline pages and runs a visitor over every matched entry.
pub struct TimelineCollector {
    client: Client,
    selectors: TimelineSelectors,
}

impl TimelineCollector {
    pub fn new(client: Client) -> Result<Self> {
        Ok(Self {
            client,
            selectors: TimelineSelectors {
                entry: selector(ENTRY_SELECTOR)?,
                timestamp: selector(TIMESTAMP_SELECTOR)?,
                text: selector(TEXT_SELECTOR)?,
                permalink: selector(PERMALINK_SELECTOR)?,
            },
        })
    }

    /// Fetch `url` and call `handler` for each matched entry before returning.
    /// Returns the number of entries visited.
    pub async fn visit<F>(&self, url: &str, handler: F) -> Result<usize>
    where
        F: FnMut(&TimelineElement<'_>),
    {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("failed to fetch timeline page")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("timeline fetch failed with status: {}", status));
        }

        let body = response.text().await.context("failed to read response body")?;
        Ok(self.visit_html(&body, handler))
    }

    /// Run `handler` over every matched entry of an already fetched page.
    pub fn visit_html<F>(&self, html: &str, mut handler: F) -> usize
    where
        F: FnMut(&TimelineElement<'_>),
    {
        let document = Html::parse_document(html);
        let mut visited = 0;
        for element in document.select(&self.selectors.entry) {
            handler(&TimelineElement {
                element,
                selectors: &self.selectors,
            });
            visited += 1;
        }
        visited
    }
}

/// Title shown for a timeline entry: newlines flattened, text cut to
/// [`MAX_TITLE_CHARS`] with an ellipsis, source marker in front.
pub fn timeline_title(text: &str) -> String {
    let mut title: String = text.chars().take(MAX_TITLE_CHARS).collect();
    if text.chars().nth(MAX_TITLE_CHARS).is_some() {
        title.push_str(ELLIPSIS);
    }
    format!("{}{}", TITLE_MARKER, title.replace('\n', " "))
}

/// Build the article for a matched entry; `page_url` resolves the permalink.
pub fn article_from_element(page_url: &Url, element: &TimelineElement<'_>) -> Result<Article> {
    let id = element.id().context("timeline entry has no id")?;

    let raw_time = element.timestamp().unwrap_or_default();
    let seconds: i64 = raw_time
        .parse()
        .with_context(|| format!("error converting timestamp {:?}", raw_time))?;
    let published_date = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .with_context(|| format!("timestamp out of range: {}", seconds))?;

    let path = element.permalink_path().unwrap_or_default();
    let url = page_url
        .join(path)
        .with_context(|| format!("invalid permalink path {:?}", path))?;

    Ok(Article {
        id: id.to_string(),
        url: url.to_string(),
        title: timeline_title(&element.text()),
        category: TIMELINE_CATEGORY.to_string(),
        published_date,
    })
}

/// Scrapes a social-media timeline and adds unseen entries to the store.
pub struct TimelineFetcher {
    collector: TimelineCollector,
    store: ArticleStore,
}

impl TimelineFetcher {
    pub fn new(collector: TimelineCollector, store: ArticleStore) -> Self {
        Self { collector, store }
    }

    /// Visit the timeline at `url` and store its new entries. Returns how many were added.
    /// A failed visit is logged and leaves the store untouched; a bad entry only skips that entry.
    pub async fn fetch_timeline(&self, url: &str) -> usize {
        let page_url = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                error!(%url, "invalid timeline url: {}", e);
                return 0;
            }
        };

        info!(%url, "getting news from timeline");
        let mut added = 0;
        let visit = self
            .collector
            .visit(url, |element| {
                if self.ingest_element(&page_url, element) {
                    added += 1;
                }
            })
            .await;

        if let Err(e) = visit {
            error!(%url, "error visiting timeline: {:#}", e);
        }
        added
    }

    /// Store one matched entry unless its id is already known.
    pub fn ingest_element(&self, page_url: &Url, element: &TimelineElement<'_>) -> bool {
        let Some(id) = element.id() else {
            warn!(url = %page_url, "skipping timeline entry without id");
            return false;
        };
        if self.store.exists(id) {
            return false;
        }

        match article_from_element(page_url, element) {
            Ok(article) => {
                let title = article.title.clone();
                let inserted = self.store.insert_if_absent(article);
                if inserted {
                    info!(%title, "new article added");
                }
                inserted
            }
            Err(e) => {
                warn!(%id, "skipping timeline entry: {:#}", e);
                false
            }
        }
    }
}
