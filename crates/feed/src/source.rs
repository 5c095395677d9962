//! The fetch boundary.
//!
//! [`FeedSource`] is the seam between the pipeline and the outside world:
//! the pipeline only ever asks a source for "the current items of this
//! feed". The built-in [`DefaultSource`] fetches JSON Feed documents over
//! HTTP, or runs the feed's `exec` command and parses its stdout; tests
//! substitute an in-memory source instead.

use crate::error::{ErrorKind, Result};
use crate::{Feed, Item};
use async_trait::async_trait;
use exn::ResultExt;
use serde::Deserialize;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, instrument};

/// Produces the current items of a feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, feed: &Feed) -> Result<Vec<Item>>;
}

/// The production source: HTTP for url feeds, a subprocess for exec feeds.
pub struct DefaultSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl DefaultSource {
    /// `timeout` is in seconds and applies to the whole fetch of one feed,
    /// HTTP and subprocess alike.
    pub fn new(timeout: u64) -> Result<Self> {
        let timeout = Duration::from_secs(timeout);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .or_raise(|| ErrorKind::Client)?;
        Ok(Self { client, timeout })
    }

    async fn fetch_http(&self, feed: &Feed) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(&feed.config.url)
            .send()
            .await
            .or_raise(|| ErrorKind::Fetch(feed.name().to_string()))?
            .error_for_status()
            .or_raise(|| ErrorKind::Fetch(feed.name().to_string()))?;
        let body = response
            .bytes()
            .await
            .or_raise(|| ErrorKind::Fetch(feed.name().to_string()))?;
        Ok(body.to_vec())
    }

    async fn fetch_exec(&self, feed: &Feed) -> Result<Vec<u8>> {
        let argv = &feed.config.exec;
        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&argv[0]).args(&argv[1..]).output(),
        )
        .await
        .or_raise(|| ErrorKind::Timeout(feed.name().to_string()))?
        .or_raise(|| ErrorKind::Exec(feed.name().to_string()))?;

        if !output.status.success() {
            exn::bail!(ErrorKind::Exec(feed.name().to_string()));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl FeedSource for DefaultSource {
    #[instrument(skip(self, feed), fields(feed = feed.name()))]
    async fn fetch(&self, feed: &Feed) -> Result<Vec<Item>> {
        let body = if feed.config.url.is_empty() {
            self.fetch_exec(feed).await?
        } else {
            self.fetch_http(feed).await?
        };
        let items = parse_json_feed(&body, feed.name())?;
        debug!(count = items.len(), "fetched feed");
        Ok(items)
    }
}

#[derive(Debug, Deserialize)]
struct JsonFeed {
    #[serde(default)]
    items: Vec<JsonFeedItem>,
}

#[derive(Debug, Deserialize)]
struct JsonFeedItem {
    id: Option<String>,
    url: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    content_html: Option<String>,
    content_text: Option<String>,
    date_published: Option<String>,
    date_modified: Option<String>,
}

/// Parse a JSON Feed 1.x document into raw items.
pub fn parse_json_feed(body: &[u8], feed_name: &str) -> Result<Vec<Item>> {
    let parsed: JsonFeed =
        serde_json::from_slice(body).or_raise(|| ErrorKind::Parse(feed_name.to_string()))?;
    Ok(parsed.items.into_iter().map(Item::from).collect())
}

impl From<JsonFeedItem> for Item {
    fn from(raw: JsonFeedItem) -> Self {
        let mut item = Item::new(
            raw.id.unwrap_or_default(),
            raw.title.unwrap_or_default(),
            raw.url.unwrap_or_default(),
        );
        item.description = raw.summary.unwrap_or_default();
        item.content = raw.content_html.or(raw.content_text).unwrap_or_default();
        item.published = raw.date_published.as_deref().and_then(parse_date);
        item.updated = raw.date_modified.as_deref().and_then(parse_date);
        item
    }
}

/// Dates in JSON Feed are RFC 3339; anything unparsable is treated as
/// absent rather than failing the whole feed.
fn parse_date(s: &str) -> Option<time::UtcDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).ok().map(OffsetDateTime::to_utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "version": "https://jsonfeed.org/version/1.1",
        "title": "Example",
        "items": [
            {
                "id": "https://example.org/1",
                "url": "https://example.org/posts/1",
                "title": "First",
                "content_html": "<p>hello</p>",
                "date_published": "2024-03-01T10:00:00Z"
            },
            {
                "id": "https://example.org/2",
                "title": "Second",
                "content_text": "plain",
                "summary": "a summary",
                "date_published": "2024-03-02T10:00:00Z",
                "date_modified": "2024-03-05T09:30:00+02:00"
            }
        ]
    }"#;

    #[test]
    fn parses_json_feed() {
        let items = parse_json_feed(DOCUMENT.as_bytes(), "example").unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].guid, "https://example.org/1");
        assert_eq!(items[0].link, "https://example.org/posts/1");
        assert_eq!(items[0].content, "<p>hello</p>");
        assert!(items[0].published.is_some());
        assert!(items[0].updated.is_none());

        assert_eq!(items[1].link, "");
        assert_eq!(items[1].content, "plain");
        assert_eq!(items[1].description, "a summary");
        assert!(items[1].updated.is_some());
        assert_ne!(items[1].date(), items[1].published);
    }

    #[test]
    fn invalid_document_is_a_parse_error() {
        let err = parse_json_feed(b"<rss/>", "example").unwrap_err();
        assert!(matches!(*err, ErrorKind::Parse(_)));
    }

    #[test]
    fn bad_dates_are_dropped() {
        let body = r#"{"items": [{"id": "x", "date_published": "yesterday-ish"}]}"#;
        let items = parse_json_feed(body.as_bytes(), "example").unwrap();
        assert!(items[0].published.is_none());
    }

    #[tokio::test]
    async fn exec_source_runs_commands() {
        let feed = Feed::new(plumage_config::Feed {
            name: "exec".into(),
            url: String::new(),
            exec: vec!["echo".into(), r#"{"items":[{"id":"a","title":"t"}]}"#.into()],
            target: "exec".into(),
            item_filter: None,
            options: plumage_config::Options::default(),
        });
        let source = DefaultSource::new(5).unwrap();
        let items = source.fetch(&feed).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].guid, "a");
    }

    #[tokio::test]
    async fn failing_exec_is_an_error() {
        let feed = Feed::new(plumage_config::Feed {
            name: "exec".into(),
            url: String::new(),
            exec: vec!["false".into()],
            target: "exec".into(),
            item_filter: None,
            options: plumage_config::Options::default(),
        });
        let source = DefaultSource::new(5).unwrap();
        let err = source.fetch(&feed).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::Exec(_)));
    }
}
