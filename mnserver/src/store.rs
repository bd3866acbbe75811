use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filter value meaning "no category restriction".
pub const ALL_CATEGORIES: &str = "All";

/// A news or timeline entry as stored and served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Source-provided identifier, the only deduplication key
    #[serde(rename = "GUID")]
    pub id: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "PublishedDate")]
    pub published_date: DateTime<Utc>,
}

/// Category restriction applied by [`ArticleStore::query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryFilter {
    All,
    Only(HashSet<String>),
}

impl CategoryFilter {
    /// Build a filter from the labels sent by a client. A list made of the single
    /// value "All" disables filtering; anything else is matched literally.
    pub fn from_labels(labels: &[String]) -> Self {
        match labels {
            [only] if only == ALL_CATEGORIES => CategoryFilter::All,
            _ => CategoryFilter::Only(labels.iter().cloned().collect()),
        }
    }

    pub fn matches(&self, category: &str) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(set) => set.contains(category),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    articles: Vec<Article>,
    ids: HashSet<String>,
}

/// Shared in-memory article collection.
///
/// Cloning the store hands out another handle to the same collection. Every operation
/// takes the same single lock, so each call is atomic with respect to the others.
/// Articles are never mutated or removed once stored.
#[derive(Debug, Clone, Default)]
pub struct ArticleStore {
    inner: Arc<Mutex<Inner>>,
}

impl ArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Critical sections are a single push or read, so a poisoned lock still guards
    // consistent data.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True iff an article with this id has already been stored.
    pub fn exists(&self, id: &str) -> bool {
        self.lock().ids.contains(id)
    }

    /// Store an article without checking for duplicates.
    ///
    /// Callers are expected to have checked [`exists`](Self::exists) first; ingestion
    /// paths should prefer [`insert_if_absent`](Self::insert_if_absent), which does the
    /// check and the insert under one lock acquisition.
    pub fn append(&self, article: Article) {
        let mut inner = self.lock();
        inner.ids.insert(article.id.clone());
        inner.articles.push(article);
    }

    /// Store the article unless its id is already known.
    /// Returns `true` when the article was inserted.
    pub fn insert_if_absent(&self, article: Article) -> bool {
        let mut inner = self.lock();
        if !inner.ids.insert(article.id.clone()) {
            return false;
        }
        inner.articles.push(article);
        true
    }

    /// All articles matching `filter`, newest first.
    pub fn query(&self, filter: &CategoryFilter) -> Vec<Article> {
        let mut matched: Vec<Article> = self
            .lock()
            .articles
            .iter()
            .filter(|a| filter.matches(&a.category))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.published_date.cmp(&a.published_date));
        matched
    }

    pub fn len(&self) -> usize {
        self.lock().articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(id: &str, category: &str, ts: i64) -> Article {
        Article {
            id: id.to_string(),
            url: format!("https://example.org/{}", id),
            title: format!("Title {}", id),
            category: category.to_string(),
            published_date: Utc.timestamp_opt(ts, 0).unwrap(),
        }
    }

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn insert_if_absent_is_idempotent() {
        let store = ArticleStore::new();
        assert!(store.insert_if_absent(article("a", "News", 10)));
        assert!(store.insert_if_absent(article("b", "News", 20)));
        let before = store.query(&CategoryFilter::All);

        let mut again = article("a", "Other", 99);
        again.title = "changed".to_string();
        assert!(!store.insert_if_absent(again));

        assert_eq!(store.len(), 2);
        assert_eq!(store.query(&CategoryFilter::All), before);
    }

    #[test]
    fn exists_tracks_appended_ids() {
        let store = ArticleStore::new();
        assert!(store.is_empty());
        assert!(!store.exists("x"));
        store.append(article("x", "News", 1));
        assert!(store.exists("x"));
        assert!(!store.exists("y"));
    }

    #[test]
    fn query_filters_by_category() {
        let store = ArticleStore::new();
        store.append(article("1", "News", 1));
        store.append(article("2", "Twitter", 2));
        store.append(article("3", "ARM Announcements", 3));

        let filter = CategoryFilter::from_labels(&labels(&["News", "Twitter"]));
        let ids: Vec<_> = store.query(&filter).into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["2", "1"]);

        let none = CategoryFilter::from_labels(&labels(&["Nope"]));
        assert!(store.query(&none).is_empty());
        assert!(store.query(&CategoryFilter::from_labels(&[])).is_empty());
    }

    #[test]
    fn all_sentinel_only_applies_alone() {
        assert_eq!(
            CategoryFilter::from_labels(&labels(&["All"])),
            CategoryFilter::All
        );

        let store = ArticleStore::new();
        store.append(article("1", "News", 1));
        store.append(article("2", "All", 2));

        assert_eq!(store.query(&CategoryFilter::from_labels(&labels(&["All"]))).len(), 2);
        let mixed = store.query(&CategoryFilter::from_labels(&labels(&["All", "Twitter"])));
        assert_eq!(mixed.len(), 1);
        assert_eq!(mixed[0].id, "2");
    }

    #[test]
    fn query_sorts_newest_first() {
        let store = ArticleStore::new();
        store.append(article("old", "News", 100));
        store.append(article("new", "News", 300));
        store.append(article("mid", "News", 200));

        let ids: Vec<_> = store
            .query(&CategoryFilter::All)
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn concurrent_inserts_keep_one_copy_per_id() {
        let store = ArticleStore::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.insert_if_absent(article(&i.to_string(), "News", i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 50);
    }
}
