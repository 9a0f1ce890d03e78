//! Reddit thread scraper using the public JSON endpoint.

use super::{ScrapedSource, Scraper};
use crate::config::RedditSettings;
use crate::error::{LodestarError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Scrapes a thread's post body and its top comments.
pub struct RedditScraper {
    client: reqwest::Client,
    max_comments: usize,
}

impl RedditScraper {
    pub fn new(config: &RedditSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LodestarError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_comments: config.max_comments,
        })
    }

    /// The JSON endpoint for a thread URL.
    pub fn json_url(url: &str) -> Result<Url> {
        let mut parsed = Url::parse(url)
            .map_err(|e| LodestarError::InvalidInput(format!("Invalid URL {}: {}", url, e)))?;

        let path = format!("{}.json", parsed.path().trim_end_matches('/'));
        parsed.set_path(&path);
        parsed.set_query(Some("raw_json=1"));
        parsed.set_fragment(None);
        Ok(parsed)
    }
}

#[async_trait]
impl Scraper for RedditScraper {
    fn can_handle(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let reddit_host = parsed
            .host_str()
            .is_some_and(|h| h == "reddit.com" || h.ends_with(".reddit.com"));
        reddit_host && parsed.path().contains("/comments/")
    }

    #[instrument(skip(self))]
    async fn scrape(&self, url: &str) -> Result<ScrapedSource> {
        let endpoint = Self::json_url(url)?;
        debug!("Fetching {}", endpoint);

        let response = self.client.get(endpoint).send().await?;
        let status = response.status();
        if matches!(
            status,
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::TOO_MANY_REQUESTS
        ) {
            warn!("Thread not readable ({}), marking restricted", status);
            return Ok(ScrapedSource::restricted(url));
        }

        let body: Value = response.error_for_status()?.json().await?;
        let source = parse_thread(url, &body, self.max_comments)?;
        info!("Scraped thread with {} characters", source.content.len());
        Ok(source)
    }
}

/// Build a source from a thread listing: title, post body, then top comments.
pub(crate) fn parse_thread(url: &str, body: &Value, max_comments: usize) -> Result<ScrapedSource> {
    let post = body
        .get(0)
        .and_then(|listing| listing.pointer("/data/children/0/data"))
        .ok_or_else(|| LodestarError::Scrape(format!("No post found in {}", url)))?;

    let title = post.get("title").and_then(Value::as_str).unwrap_or_default();
    let selftext = post.get("selftext").and_then(Value::as_str).unwrap_or_default();

    let mut content = String::new();
    content.push_str(title);
    if !selftext.trim().is_empty() {
        content.push('\n');
        content.push_str(selftext.trim());
    }

    let comments = body.get(1).map(|listing| top_comments(listing, max_comments));
    for comment in comments.unwrap_or_default() {
        content.push_str("\n\n");
        content.push_str(&comment);
    }

    Ok(ScrapedSource::accessible(url, title, content))
}

fn children(listing: &Value) -> &[Value] {
    listing
        .pointer("/data/children")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Comment bodies in breadth-first order, so top-level replies come first.
///
/// Uses an explicit queue; deeply nested threads cannot exhaust the stack.
pub(crate) fn top_comments(listing: &Value, limit: usize) -> Vec<String> {
    let mut bodies = Vec::new();
    let mut queue: VecDeque<&Value> = children(listing).iter().collect();

    while let Some(node) = queue.pop_front() {
        if bodies.len() >= limit {
            break;
        }
        if node.get("kind").and_then(Value::as_str) != Some("t1") {
            continue;
        }
        let Some(data) = node.get("data") else {
            continue;
        };

        if let Some(body) = data.get("body").and_then(Value::as_str) {
            let body = body.trim();
            if !body.is_empty() && body != "[deleted]" && body != "[removed]" {
                bodies.push(body.to_string());
            }
        }

        if let Some(replies) = data.get("replies").filter(|r| r.is_object()) {
            queue.extend(children(replies));
        }
    }

    bodies
}
