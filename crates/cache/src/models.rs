//! The persisted cache records: feed handles, item digests, cached items
//! and the per-feed entry with its two-phase commit.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use plumage_feed::Item;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use time::UtcDateTime;
use uuid::Uuid;

/// Opaque numeric feed handle, allocated monotonically starting at 1 and
/// stable for the lifetime of a descriptor. Displayed as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedId(u64);

impl FeedId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        u64::from_str_radix(s, 16).ok().map(Self)
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// 32-byte SHA-256 digest over an item's description and content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemDigest([u8; 32]);

impl ItemDigest {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }
}

impl fmt::Display for ItemDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// One delivered item as remembered across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedItem {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub date: Option<UtcDateTime>,
    pub digest: ItemDigest,
    /// Stable id; immutable once assigned to a logical item.
    pub id: Uuid,
}

/// The value an item is deduplicated and matched by. Deliberately leaves
/// out the stable id: two fetches of the same logical item carry
/// different freshly generated ids but must still collapse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ItemKey {
    guid: String,
    title: String,
    link: String,
    date: Option<UtcDateTime>,
    digest: ItemDigest,
}

impl CachedItem {
    /// Derive the cache record for a freshly fetched item.
    pub fn derive(item: &Item) -> Self {
        Self {
            guid: item.guid.clone(),
            title: item.title.clone(),
            link: item.link.clone(),
            date: item.date(),
            digest: ItemDigest::of(&item.digest_input()),
            id: item.id.uuid(),
        }
    }

    pub(crate) fn key(&self) -> ItemKey {
        ItemKey {
            guid: self.guid.clone(),
            title: self.title.clone(),
            link: self.link.clone(),
            date: self.date,
            digest: self.digest,
        }
    }

    /// Similarity match: equal title, link and date, and equal digest
    /// unless the feed asked for hashes to be ignored.
    pub fn similar_to(&self, other: &CachedItem, ignore_hash: bool) -> bool {
        self.title == other.title
            && self.link == other.link
            && self.date == other.date
            && (ignore_hash || self.digest == other.digest)
    }
}

impl fmt::Display for CachedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        writeln!(f, "  ID: {}", URL_SAFE_NO_PAD.encode(self.id.as_bytes()))?;
        writeln!(f, "  Title: {:?}", self.title)?;
        writeln!(f, "  Guid: {:?}", self.guid)?;
        writeln!(f, "  Link: {:?}", self.link)?;
        writeln!(f, "  Date: {}", display_time(self.date))?;
        writeln!(f, "  Hash: {}", self.digest)?;
        write!(f, "}}")
    }
}

pub(crate) fn display_time(time: Option<UtcDateTime>) -> String {
    match time {
        Some(time) => time.to_string(),
        None => "not set".to_string(),
    }
}

/// The cached state of one feed.
///
/// `last_check` and `items` are the committed, persisted state. A run
/// stages its results next to them (`current_check`, `pending`) and
/// promotes both in one step via [`commit`](Self::commit), so a failed
/// fetch or delivery leaves the committed state untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheFeedEntry {
    last_check: Option<UtcDateTime>,
    failures: u32,
    items: Vec<CachedItem>,
    #[serde(skip)]
    current_check: Option<UtcDateTime>,
    #[serde(skip)]
    pending: Option<Vec<CachedItem>>,
}

impl CacheFeedEntry {
    /// Record the outcome of a fetch attempt. The check time stays
    /// pending until [`commit`](Self::commit); the failure counter is
    /// effective immediately so it persists even for aborted runs.
    pub fn checked(&mut self, failed: bool) {
        self.checked_at(UtcDateTime::now(), failed);
    }

    pub(crate) fn checked_at(&mut self, when: UtcDateTime, failed: bool) {
        self.current_check = Some(when);
        if failed {
            self.failures += 1;
        } else {
            self.failures = 0;
        }
    }

    /// Consecutive fetch failures up to now.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// The last *committed* check time.
    pub fn last_check(&self) -> Option<UtcDateTime> {
        self.last_check
    }

    pub fn items(&self) -> &[CachedItem] {
        &self.items
    }

    /// Hold a diff's staged item list as the pending replacement and hand
    /// back the diff's delivery output. The staged list is applied as a
    /// whole on commit or dropped as a whole, never partially merged.
    pub fn stage(&mut self, diff: crate::diff::Diff) -> Vec<Item> {
        let crate::diff::Diff { output, staged } = diff;
        self.pending = Some(staged);
        output
    }

    /// Promote staged state: pending items replace the committed items,
    /// the pending check time becomes the committed one.
    pub fn commit(&mut self) {
        if let Some(items) = self.pending.take() {
            self.items = items;
        }
        if let Some(check) = self.current_check.take() {
            self.last_check = Some(check);
        }
    }

    #[cfg(test)]
    pub(crate) fn with_items(items: Vec<CachedItem>) -> Self {
        Self { items, ..Self::default() }
    }
}
