//! A single fetched feed item.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use time::UtcDateTime;
use uuid::Uuid;

/// Stable per-item identifier.
///
/// Assigned freshly when an item is first seen and preserved across later
/// revisions of the same logical item; downstream message ids and
/// cross-references depend on it never changing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Compact url-safe representation, used in external ids.
    pub fn encoded(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0.as_bytes())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ItemId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A raw item as produced by the fetch layer.
#[derive(Debug, Clone)]
pub struct Item {
    /// Publisher-supplied unique id; empty when the feed does not carry one.
    pub guid: String,
    pub title: String,
    pub link: String,
    pub published: Option<UtcDateTime>,
    pub updated: Option<UtcDateTime>,
    /// Short summary, when the feed distinguishes it from the content.
    pub description: String,
    pub content: String,
    /// Stable id; replaced with the cached item's id when the diff decides
    /// this is a revision of something already delivered.
    pub id: ItemId,
    /// Set when delivery should replace an earlier message instead of
    /// appending a new one.
    pub update_only: bool,
    reasons: Vec<&'static str>,
}

impl Item {
    pub fn new(guid: impl Into<String>, title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            title: title.into(),
            link: link.into(),
            published: None,
            updated: None,
            description: String::new(),
            content: String::new(),
            id: ItemId::new(),
            update_only: false,
            reasons: Vec::new(),
        }
    }

    /// The item's effective date: the update date when present, the
    /// publication date otherwise.
    pub fn date(&self) -> Option<UtcDateTime> {
        self.updated.or(self.published)
    }

    /// The bytes fed into the content digest.
    pub fn digest_input(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.description.len() + self.content.len());
        bytes.extend_from_slice(self.description.as_bytes());
        bytes.extend_from_slice(self.content.as_bytes());
        bytes
    }

    /// Tag this item as a revision of an already delivered item, taking
    /// over that item's stable id.
    pub fn mark_update(&mut self, previous: ItemId) {
        self.update_only = true;
        self.id = previous;
    }

    /// Record why the diff decided to include this item. Duplicates are
    /// dropped; the list only feeds debug output.
    pub fn add_reason(&mut self, reason: &'static str) {
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }

    pub fn reasons(&self) -> &[&'static str] {
        &self.reasons
    }

    /// The id handed to the delivery layer: `<feed handle>#<base64 stable id>`.
    pub fn external_id(&self, feed_handle: &str) -> String {
        format!("{feed_handle}#{}", self.id.encoded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::utc_datetime;

    #[test]
    fn date_prefers_updated() {
        let mut item = Item::new("g", "t", "l");
        item.published = Some(utc_datetime!(2024-01-01 00:00));
        assert_eq!(item.date(), item.published);
        item.updated = Some(utc_datetime!(2024-06-01 12:00));
        assert_eq!(item.date(), item.updated);
    }

    #[test]
    fn external_id_format() {
        let item = Item::new("", "t", "l");
        let external = item.external_id("2a");
        let (handle, encoded) = external.split_once('#').unwrap();
        assert_eq!(handle, "2a");
        assert_eq!(encoded, item.id.encoded());
        // 16 uuid bytes, base64 without padding
        assert_eq!(encoded.len(), 22);
    }

    #[test]
    fn mark_update_transplants_id() {
        let previous = ItemId::new();
        let mut item = Item::new("g", "t", "l");
        item.mark_update(previous);
        assert!(item.update_only);
        assert_eq!(item.id, previous);
    }

    #[test]
    fn reasons_deduplicate() {
        let mut item = Item::new("g", "t", "l");
        item.add_reason("guid");
        item.add_reason("guid");
        item.add_reason("new");
        assert_eq!(item.reasons(), ["guid", "new"]);
    }
}
