//! The delivery boundary.
//!
//! The pipeline hands each feed's diff output (items tagged new or
//! update, each with a stable external id) to a [`Delivery`]
//! implementation and commits the feed's cache entry only once that
//! implementation returns success. The mail/IMAP machinery lives behind
//! this trait; [`DryRun`] is the built-in stand-in that only logs.

use crate::error::Result;
use async_trait::async_trait;
use plumage_feed::{Feed, Item};
use tracing::info;

/// Consumes one feed's diff output.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Deliver `items` for `feed`. `handle` is the feed's cache handle;
    /// `item.external_id(handle)` yields the cross-reference key an
    /// update must replace.
    ///
    /// Returning an error leaves the feed's cache entry uncommitted, so
    /// the same items are offered again on the next run.
    async fn deliver(&self, feed: &Feed, handle: &str, items: &[Item]) -> Result<()>;
}

/// Logs what would have been delivered, committing nothing to a mailbox.
#[derive(Debug, Default)]
pub struct DryRun;

#[async_trait]
impl Delivery for DryRun {
    async fn deliver(&self, feed: &Feed, handle: &str, items: &[Item]) -> Result<()> {
        for item in items {
            info!(
                feed = feed.name(),
                target = %feed.config.target,
                id = %item.external_id(handle),
                update = item.update_only,
                reasons = ?item.reasons(),
                "would deliver '{}'",
                item.title,
            );
        }
        Ok(())
    }
}
