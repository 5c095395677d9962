//! Feed and item models, plus the fetch boundary.
//!
//! This crate owns what a feed *is*: its configured identity
//! ([`Descriptor`]), its raw fetched items ([`Item`]) and their stable ids
//! ([`ItemId`]), plus the [`FeedSource`] seam through which items enter
//! the system. What happens to those items afterwards (diffing against
//! the persistent cache, delivery) lives in the cache and pipeline crates.

pub mod error;
mod feed;
mod filter;
mod item;
mod source;

pub use crate::feed::{Descriptor, Feed};
pub use crate::filter::ItemFilter;
pub use crate::item::{Item, ItemId};
pub use crate::source::{DefaultSource, FeedSource, parse_json_feed};
