//! Per-feed item filtering.
//!
//! A feed's `item-filter` is a regular expression applied to every
//! fetched item before diffing; items it does not match are dropped. A
//! pattern that fails to compile is a configuration error surfaced when
//! the feed is set up, not a silent no-op at fetch time.

use crate::Item;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use regex::Regex;

/// A compiled item filter. An item passes when the pattern matches its
/// title, description or content.
#[derive(Debug, Clone)]
pub struct ItemFilter {
    pattern: Regex,
}

impl ItemFilter {
    pub fn new(pattern: &str, feed_name: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).or_raise(|| ErrorKind::Filter(feed_name.to_string()))?;
        Ok(Self { pattern })
    }

    pub fn matches(&self, item: &Item) -> bool {
        self.pattern.is_match(&item.title)
            || self.pattern.is_match(&item.description)
            || self.pattern.is_match(&item.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, content: &str) -> Item {
        let mut item = Item::new("g", title, "https://example.org/1");
        item.content = content.into();
        item
    }

    #[test]
    fn matches_title_or_content() {
        let filter = ItemFilter::new("Release", "news").unwrap();
        assert!(filter.matches(&item("Release 1.0", "")));
        assert!(filter.matches(&item("update", "the Release notes")));
        assert!(!filter.matches(&item("unrelated", "nothing here")));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = ItemFilter::new("(unclosed", "news").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Filter(name) if name == "news"));
    }
}
