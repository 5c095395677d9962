//! Versioned persistent cache of delivered feed items.
//!
//! This crate remembers, across runs, which items of which feed have
//! already been delivered, so that a feed item becomes mail exactly once.
//! The cache is not advisory: losing it means re-delivering history,
//! corrupting it silently means skipping items, so everything here fails
//! hard rather than guessing.
//!
//! # Architecture
//! - [`CacheStore`] owns the whole in-memory cache, loads and stores the
//!   versioned binary file, and holds the advisory file lock for the
//!   process lifetime.
//! - The identity index (see [`CacheStore::resolve`]) maps a feed's
//!   configured `(name, url)` descriptor to a stable numeric [`FeedId`],
//!   surviving renames and url changes.
//! - [`CacheFeedEntry::diff`] reconciles freshly fetched items against a
//!   feed's history and tags each surviving item new or update; its
//!   result is staged and only [committed](CacheFeedEntry::commit) after
//!   delivery succeeds.
//! - The retention policy caps per-feed history and evicts feeds that
//!   are stale and gone from the configuration.

mod data;
mod diff;
pub mod error;
mod models;
mod retain;
mod store;
mod version;

pub use crate::diff::Diff;
pub use crate::models::{CacheFeedEntry, CachedItem, FeedId, ItemDigest};
pub use crate::store::CacheStore;
pub use crate::version::{CURRENT_VERSION, Version};
