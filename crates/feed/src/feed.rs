//! The feed itself: configured identity plus refresh bookkeeping.

use serde::{Deserialize, Serialize};
use time::UtcDateTime;
use tracing::debug;

/// The (name, url) pair identifying a feed's configured identity.
///
/// Used as a lookup key into the persistent cache and never mutated. For
/// feeds produced by a subprocess a synthetic `exec://` url is derived
/// from the argument vector, so that every feed has a url-shaped key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    pub url: String,
}

/// A configured feed.
#[derive(Debug, Clone)]
pub struct Feed {
    pub config: plumage_config::Feed,
}

impl Feed {
    pub fn new(config: plumage_config::Feed) -> Self {
        Self { config }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Compile the feed's configured item filter, if any.
    pub fn item_filter(&self) -> crate::error::Result<Option<crate::ItemFilter>> {
        self.config
            .item_filter
            .as_deref()
            .map(|pattern| crate::ItemFilter::new(pattern, self.name()))
            .transpose()
    }

    pub fn descriptor(&self) -> Descriptor {
        let url = if self.config.url.is_empty() {
            format!("exec://{}", self.config.exec.join("/"))
        } else {
            self.config.url.clone()
        };
        Descriptor { name: self.config.name.clone(), url }
    }

    /// Whether this feed is due for a check, given the last committed
    /// check time. A min-frequency of zero means "always".
    pub fn needs_update(&self, last_check: Option<UtcDateTime>) -> bool {
        let min_frequency = self.config.options.min_frequency();
        if min_frequency == 0 {
            return true;
        }
        if let Some(last) = last_check
            && (UtcDateTime::now() - last).whole_hours() < i64::from(min_frequency)
        {
            debug!("feed '{}' does not need updating, skipping", self.name());
            return false;
        }
        true
    }
}
