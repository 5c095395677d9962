//! Retention policy: per-feed item caps and whole-feed eviction.

use crate::data::CacheData;
use crate::models::CachedItem;
use plumage_feed::Descriptor;
use std::collections::HashSet;
use time::UtcDateTime;
use tracing::info;

/// Upper bound on remembered items per feed.
pub(crate) const MAX_CACHE_ITEMS: usize = 1000;
/// A feed no longer configured is dropped once its last check is older
/// than this.
pub(crate) const MAX_CACHE_DAYS: i64 = 180;

/// Cap a staged item list to the first [`MAX_CACHE_ITEMS`] entries, in
/// staging order. Staging puts this run's decisions first and untouched
/// survivors last, so the overflow dropped here is the oldest history.
pub(crate) fn cap_items(mut staged: Vec<CachedItem>) -> Vec<CachedItem> {
    staged.truncate(MAX_CACHE_ITEMS);
    staged
}

/// Drop feeds that are both stale and gone from the configuration.
///
/// Runs once per store cycle, after all per-feed commits: a feed merely
/// absent from one run's fetch set keeps its history, a feed removed from
/// the configuration keeps it for [`MAX_CACHE_DAYS`] more days.
pub(crate) fn evict_stale(data: &mut CacheData, known: &HashSet<Descriptor>) {
    evict_stale_at(data, known, UtcDateTime::now());
}

pub(crate) fn evict_stale_at(data: &mut CacheData, known: &HashSet<Descriptor>, now: UtcDateTime) {
    let stale: Vec<_> = data
        .ids
        .iter()
        .filter(|(descr, _)| !known.contains(descr))
        .filter(|(_, id)| {
            match data.feeds.get(id).and_then(|entry| entry.last_check()) {
                None => true,
                Some(last) => (now - last).whole_days() > MAX_CACHE_DAYS,
            }
        })
        .map(|(descr, id)| (descr.clone(), *id))
        .collect();

    for (descr, id) in stale {
        info!(feed = %descr.name, %id, "evicting stale feed from cache");
        data.feeds.remove(&id);
        data.ids.remove(&descr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CacheFeedEntry, ItemDigest};
    use time::Duration;
    use uuid::Uuid;

    fn cached(n: usize) -> CachedItem {
        CachedItem {
            guid: format!("guid-{n}"),
            title: format!("title {n}"),
            link: format!("https://example.org/{n}"),
            date: None,
            digest: ItemDigest::of(format!("content {n}").as_bytes()),
            id: Uuid::new_v4(),
        }
    }

    #[test]
    fn cap_keeps_first_thousand_in_staging_order() {
        let staged: Vec<_> = (0..1500).map(cached).collect();
        let capped = cap_items(staged);
        assert_eq!(capped.len(), 1000);
        assert_eq!(capped[0].guid, "guid-0");
        assert_eq!(capped[999].guid, "guid-999");
    }

    #[test]
    fn cap_leaves_short_lists_alone() {
        let staged: Vec<_> = (0..3).map(cached).collect();
        assert_eq!(cap_items(staged).len(), 3);
    }

    fn descriptor(name: &str) -> Descriptor {
        Descriptor { name: name.into(), url: format!("https://example.org/{name}") }
    }

    fn data_with_feed(descr: &Descriptor, checked_days_ago: Option<i64>) -> CacheData {
        let now = UtcDateTime::now();
        let mut data = CacheData::default();
        let id = data.resolve(descr);
        let entry = data.entry(id);
        if let Some(days) = checked_days_ago {
            entry.checked_at(now - Duration::days(days), false);
            entry.commit();
        }
        data
    }

    #[test]
    fn stale_unconfigured_feed_is_evicted() {
        let descr = descriptor("gone");
        let mut data = data_with_feed(&descr, Some(200));
        evict_stale(&mut data, &HashSet::new());
        assert!(data.ids.is_empty());
        assert!(data.feeds.is_empty());
    }

    #[test]
    fn never_checked_unconfigured_feed_is_evicted() {
        let descr = descriptor("gone");
        let mut data = data_with_feed(&descr, None);
        evict_stale(&mut data, &HashSet::new());
        assert!(data.ids.is_empty());
    }

    #[test]
    fn recently_checked_feed_is_kept() {
        let descr = descriptor("paused");
        let mut data = data_with_feed(&descr, Some(90));
        evict_stale(&mut data, &HashSet::new());
        assert_eq!(data.ids.len(), 1);
    }

    #[test]
    fn configured_feed_is_kept_no_matter_how_stale() {
        let descr = descriptor("old-but-known");
        let mut data = data_with_feed(&descr, Some(500));
        let known = HashSet::from([descr.clone()]);
        evict_stale(&mut data, &known);
        assert_eq!(data.ids.len(), 1);
        assert!(data.feeds.contains_key(&data.ids[&descr]));
    }

    #[test]
    fn fresh_entry_for_commit_helper() {
        // guard: data_with_feed really commits a last_check
        let descr = descriptor("x");
        let data = data_with_feed(&descr, Some(10));
        let entry: &CacheFeedEntry = &data.feeds[&data.ids[&descr]];
        assert!(entry.last_check().is_some());
    }
}
