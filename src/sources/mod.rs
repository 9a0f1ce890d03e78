//! Source documents and the scraper collaborators that produce them.
//!
//! Scrapers return a [`ScrapedSource`] per URL. Sources that could not be
//! read are flagged as restricted and are never ingested; they are shown to
//! the user as reference links instead.

mod page;
mod reddit;
pub mod youtube;

pub use page::PageScraper;
pub use reddit::RedditScraper;
pub use youtube::YoutubeScraper;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A document accepted for ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source_url: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
}

impl SourceDocument {
    pub fn new(
        source_url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            content: content.into(),
        }
    }
}

/// The output of a scraper for one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedSource {
    pub source_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// URL flagged as unreadable. Absent or empty when the source was read.
    #[serde(default)]
    pub restricted: Option<String>,
}

impl ScrapedSource {
    /// A source whose content was read successfully.
    pub fn accessible(
        source_url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            content: content.into(),
            restricted: None,
        }
    }

    /// A source that could not be scraped.
    pub fn restricted(source_url: impl Into<String>) -> Self {
        let source_url = source_url.into();
        Self {
            restricted: Some(source_url.clone()),
            source_url,
            title: String::new(),
            content: String::new(),
        }
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted.as_deref().is_some_and(|r| !r.is_empty())
    }
}

/// Split scraper output into ingestible documents and restricted URLs.
pub fn partition_scraped(
    scraped: impl IntoIterator<Item = ScrapedSource>,
) -> (Vec<SourceDocument>, Vec<String>) {
    let mut documents = Vec::new();
    let mut restricted = Vec::new();

    for source in scraped {
        if source.is_restricted() {
            restricted.push(source.restricted.unwrap_or(source.source_url));
        } else {
            documents.push(SourceDocument {
                source_url: source.source_url,
                title: source.title,
                content: source.content,
            });
        }
    }

    (documents, restricted)
}

/// Trait for source scrapers.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Check if this scraper can handle the given URL.
    fn can_handle(&self, url: &str) -> bool;

    /// Fetch and extract one source.
    async fn scrape(&self, url: &str) -> Result<ScrapedSource>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_scraped() {
        let (documents, restricted) = partition_scraped(vec![
            ScrapedSource::accessible("a.com", "A", "gold bar locations are in chapter 2"),
            ScrapedSource::restricted("blocked.com"),
            ScrapedSource {
                source_url: "b.com".to_string(),
                title: "B".to_string(),
                content: "to get armor, visit the blacksmith".to_string(),
                restricted: Some(String::new()),
            },
        ]);

        assert_eq!(
            documents,
            vec![
                SourceDocument::new("a.com", "A", "gold bar locations are in chapter 2"),
                SourceDocument::new("b.com", "B", "to get armor, visit the blacksmith"),
            ]
        );
        assert_eq!(restricted, vec!["blocked.com".to_string()]);
    }

    #[test]
    fn test_scraped_source_json_shape() {
        let parsed: Vec<ScrapedSource> = serde_json::from_str(
            r#"[
                {"source_url": "a.com", "title": "A", "content": "text", "restricted": ""},
                {"source_url": "c.com", "restricted": "c.com"}
            ]"#,
        )
        .unwrap();

        assert!(!parsed[0].is_restricted());
        assert!(parsed[1].is_restricted());
        assert!(parsed[1].content.is_empty());
    }
}
