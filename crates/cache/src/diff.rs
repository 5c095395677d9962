//! The item diffing engine.
//!
//! Given a feed's cached history and its freshly fetched items, decide
//! which fresh items are new, which are updates of something already
//! delivered, and which have been delivered before and must not be sent
//! again. Matching strategies in priority order:
//!
//! 1. **GUID**: the strongest signal a publisher can give. A guid match
//!    with full similarity means "seen before"; a guid match with changed
//!    content is an update that keeps the cached item's stable id.
//! 2. **Similarity**: title, link, date and (unless `ignore_hash`) the
//!    content digest all equal, common for feeds with absent or
//!    inconsistent guids.
//! 3. **Link**: last resort, treated as an update unless `always_new`
//!    opts the feed out (for feeds that legitimately reuse links for
//!    distinct posts).
//!
//! The pass is pure: it never mutates the entry. Its result is staged
//! onto the entry and only applied by a later commit.

use crate::models::{CacheFeedEntry, CachedItem};
use crate::retain;
use plumage_feed::Item;
use std::collections::HashSet;
use tracing::{debug, instrument, trace};

/// The outcome of diffing one feed: the items delivery should see
/// (tagged new or update) and the staged replacement for the cached item
/// list, already pruned by the retention cap.
#[derive(Debug)]
pub struct Diff {
    pub output: Vec<Item>,
    pub(crate) staged: Vec<CachedItem>,
}

impl CacheFeedEntry {
    /// Reconcile freshly fetched items against this entry's history.
    pub fn diff(&self, items: Vec<Item>, ignore_hash: bool, always_new: bool) -> Diff {
        diff_items(self.items(), items, ignore_hash, always_new)
    }
}

#[instrument(skip_all, fields(cached = existing.len(), fresh = fresh.len()))]
pub(crate) fn diff_items(
    existing: &[CachedItem],
    fresh: Vec<Item>,
    ignore_hash: bool,
    always_new: bool,
) -> Diff {
    if fresh.is_empty() {
        return Diff { output: Vec::new(), staged: existing.to_vec() };
    }

    // Transient per-pass markers over the existing items; never persisted.
    let mut seen_in_pass = vec![false; existing.len()];
    let mut output: Vec<Item> = Vec::new();
    let mut staged: Vec<CachedItem> = Vec::new();

    let batch = dedupe(fresh);
    debug!(count = batch.len(), "items after deduplication");

    'fresh: for (mut derived, mut item) in batch {
        trace!(item = %derived, "checking item");

        if !derived.guid.is_empty() {
            for (idx, old) in existing.iter().enumerate() {
                if old.guid == derived.guid {
                    if old.similar_to(&derived, ignore_hash) {
                        trace!("guid matches and similar, ignoring");
                        seen_in_pass[idx] = true;
                        staged.push(old.clone());
                    } else {
                        trace!("guid matches with changes, updating");
                        item.add_reason("guid (upd)");
                        item.mark_update(old.id.into());
                        derived.id = old.id;
                        seen_in_pass[idx] = true;
                        staged.push(derived);
                        output.push(item);
                    }
                    continue 'fresh;
                }
            }

            trace!("no matching guid, including");
            item.add_reason("guid");
            staged.push(derived);
            output.push(item);
            continue;
        }

        for (idx, old) in existing.iter().enumerate() {
            if old.similar_to(&derived, ignore_hash) {
                trace!("similarity matches, ignoring");
                seen_in_pass[idx] = true;
                staged.push(old.clone());
                continue 'fresh;
            }

            if old.link == derived.link {
                if always_new {
                    trace!("link matches, but always-new");
                    item.add_reason("always-new");
                    continue;
                }
                trace!("link matches, updating");
                item.add_reason("link (upd)");
                item.mark_update(old.id.into());
                derived.id = old.id;
                seen_in_pass[idx] = true;
                staged.push(derived);
                output.push(item);
                continue 'fresh;
            }
        }

        trace!("no match found, inserting");
        item.add_reason("new");
        staged.push(derived);
        output.push(item);
    }

    // Existing items never touched in this pass are carried forward as-is.
    for (idx, old) in existing.iter().enumerate() {
        if !seen_in_pass[idx] {
            staged.push(old.clone());
        }
    }

    debug!(output = output.len(), staged = staged.len(), "items after diffing");
    Diff { output, staged: retain::cap_items(staged) }
}

/// Collapse exact duplicates within one fetched batch, keyed by the
/// derived item value. The first occurrence is kept as representative, so
/// batch order is preserved.
fn dedupe(fresh: Vec<Item>) -> Vec<(CachedItem, Item)> {
    let mut keys = HashSet::with_capacity(fresh.len());
    let mut batch = Vec::with_capacity(fresh.len());
    for item in fresh {
        let derived = CachedItem::derive(&item);
        if keys.insert(derived.key()) {
            batch.push((derived, item));
        } else {
            trace!(title = %item.title, "dropping exact in-batch duplicate");
        }
    }
    batch
}
