use std::time::Duration;

use tracing::info;

use crate::ingestion::FeedFetcher;
use crate::scraping::TimelineFetcher;

/// Drives the polling of every configured source.
///
/// The first tick runs immediately, then one tick per `interval` for the life of the
/// process. A slow tick delays the next one; ticks never overlap because the wait
/// starts after a tick completes.
pub struct Poller {
    feeds: FeedFetcher,
    timeline: TimelineFetcher,
    feed_urls: Vec<String>,
    timeline_url: Option<String>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        feeds: FeedFetcher,
        timeline: TimelineFetcher,
        feed_urls: Vec<String>,
        timeline_url: Option<String>,
        interval: Duration,
    ) -> Self {
        Self {
            feeds,
            timeline,
            feed_urls,
            timeline_url,
            interval,
        }
    }

    /// One poll tick: every feed in configured order, then the timeline.
    /// Returns the number of articles added.
    pub async fn poll_once(&self) -> usize {
        let mut added = 0;
        for url in self.feed_urls.iter().filter(|u| !u.is_empty()) {
            added += self.feeds.fetch_feed(url).await;
        }
        if let Some(url) = self.timeline_url.as_deref().filter(|u| !u.is_empty()) {
            added += self.timeline.fetch_timeline(url).await;
        }
        info!(added, "poller: tick complete");
        added
    }

    /// Poll forever. Fetch failures are contained by the fetchers, so this never returns.
    pub async fn run(self) {
        info!(
            feeds = self.feed_urls.len(),
            timeline = self.timeline_url.is_some(),
            interval_secs = self.interval.as_secs(),
            "poller: starting"
        );
        loop {
            self.poll_once().await;
            tokio::time::sleep(self.interval).await;
        }
    }
}
