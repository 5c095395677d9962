//! Local file delivery.
//!
//! Writes each item as a JSON document into the feed's target directory
//! under a configurable root. The filename is the item's external id, so
//! a revision overwrites exactly the message it updates and re-running a
//! failed delivery is idempotent.

use async_trait::async_trait;
use exn::ResultExt;
use plumage_feed::{Feed, Item};
use plumage_pipeline::Delivery;
use plumage_pipeline::error::{ErrorKind, Result};
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

pub struct FileDelivery {
    root: PathBuf,
}

impl FileDelivery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn render(item: &Item, handle: &str) -> serde_json::Value {
        serde_json::json!({
            "id": item.external_id(handle),
            "guid": item.guid,
            "title": item.title,
            "link": item.link,
            "date": item.date().and_then(|date| date.format(&Rfc3339).ok()),
            "update": item.update_only,
            "description": item.description,
            "content": item.content,
        })
    }
}

#[async_trait]
impl Delivery for FileDelivery {
    async fn deliver(&self, feed: &Feed, handle: &str, items: &[Item]) -> Result<()> {
        let dir = self.root.join(&feed.config.target);
        tokio::fs::create_dir_all(&dir)
            .await
            .or_raise(|| ErrorKind::Delivery(feed.name().to_string()))?;

        for item in items {
            let path = dir.join(format!("{}.json", item.external_id(handle)));
            let body = Self::render(item, handle).to_string();
            tokio::fs::write(&path, body)
                .await
                .or_raise(|| ErrorKind::Delivery(feed.name().to_string()))?;
            debug!(feed = feed.name(), path = %path.display(), "delivered");
        }
        Ok(())
    }
}
