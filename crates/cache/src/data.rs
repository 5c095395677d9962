//! The top-level cache container: identity index plus per-feed entries.

use crate::models::{CacheFeedEntry, FeedId, display_time};
use plumage_feed::Descriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::warn;

/// First feed id ever allocated.
const START_FEED_ID: u64 = 1;

/// Everything the cache persists: the descriptor-to-id index, the id
/// allocator, and the per-feed entries.
///
/// Invariants: `next_id` is greater than every allocated id, and every id
/// in `ids` gains an entry in `feeds` once the feed is first touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheData {
    pub(crate) ids: HashMap<Descriptor, FeedId>,
    pub(crate) next_id: u64,
    pub(crate) feeds: HashMap<FeedId, CacheFeedEntry>,
}

impl Default for CacheData {
    fn default() -> Self {
        Self { ids: HashMap::new(), next_id: START_FEED_ID, feeds: HashMap::new() }
    }
}

impl CacheData {
    /// Map a descriptor to its feed id, surviving renames.
    ///
    /// Resolution order: exact match; same name with a different url
    /// (the feed moved); same url with a different name (the feed was
    /// renamed). Both heuristics reassign the existing id to the new
    /// descriptor so history is kept. A descriptor matching neither gets
    /// a fresh id, which means a feed changing name and url at once is
    /// indistinguishable from a new feed and loses its history.
    pub fn resolve(&mut self, descriptor: &Descriptor) -> FeedId {
        if let Some(&id) = self.ids.get(descriptor) {
            return id;
        }

        // a name match wins over a url match, independent of map order
        let renamed = self
            .ids
            .iter()
            .find(|(other, _)| other.name == descriptor.name)
            .inspect(|(other, _)| {
                warn!(
                    "feed {} seems to have changed URLs: new '{}', old '{}'; updating",
                    descriptor.name, descriptor.url, other.url
                );
            })
            .or_else(|| {
                self.ids.iter().find(|(other, _)| other.url == descriptor.url).inspect(
                    |(other, _)| {
                        warn!(
                            "feed with URL '{}' seems to have changed its name: new '{}', old '{}'; updating",
                            descriptor.url, descriptor.name, other.name
                        );
                    },
                )
            })
            .map(|(other, &id)| (other.clone(), id));

        let id = match renamed {
            Some((old, id)) => {
                self.ids.remove(&old);
                id
            },
            None => {
                let id = FeedId::new(self.next_id);
                self.next_id += 1;
                id
            },
        };

        self.ids.insert(descriptor.clone(), id);
        id
    }

    /// The entry for a resolved feed id, created empty on first touch.
    pub fn entry(&mut self, id: FeedId) -> &mut CacheFeedEntry {
        self.feeds.entry(id).or_default()
    }

    /// One line per cached feed, sorted by name: id, descriptor, item count.
    pub fn summary(&self) -> String {
        let mut descriptors: Vec<&Descriptor> = self.ids.keys().collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));

        let mut out = String::new();
        for descr in descriptors {
            let id = self.ids[descr];
            let items = self.feeds.get(&id).map_or(0, |entry| entry.items().len());
            let _ = writeln!(out, "{:>3}: {} ({}) ({} items)", id.to_string(), descr.name, descr.url, items);
        }
        out
    }

    /// Full detail for one feed, looked up by its hex id.
    pub fn feed_info(&self, hex_id: &str) -> Option<String> {
        let id = FeedId::from_hex(hex_id)?;
        let entry = self.feeds.get(&id)?;

        let mut out = String::new();
        if let Some((descr, _)) = self.ids.iter().find(|&(_, &other)| other == id) {
            let _ = writeln!(out, "{} -- {}", descr.name, descr.url);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Last Check: {}", display_time(entry.last_check()));
        let _ = writeln!(out, "Num Failures: {}", entry.failures());
        let _ = writeln!(out, "Num Items: {}", entry.items().len());
        for item in entry.items() {
            let _ = writeln!(out, "\n--------------------");
            let _ = write!(out, "{item}");
        }
        Some(out)
    }
}
