//! The run state: every configured feed bound to its cache entry, plus
//! the stage drivers for the fetch → diff → deliver → commit pipeline.

use crate::deliver::Delivery;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use plumage_cache::{CacheStore, FeedId};
use plumage_config::Config;
use plumage_feed::{Descriptor, Feed, FeedSource, Item, ItemFilter};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{Level, debug, error, info, instrument, warn};

/// One configured feed bound to its cache entry, carrying its
/// intermediate results through the pipeline stages.
struct Bound {
    feed: Feed,
    id: FeedId,
    /// Compiled item filter, when the feed configures one.
    filter: Option<ItemFilter>,
    /// Fetched items, present between the fetch and diff stages.
    items: Option<Vec<Item>>,
    /// Diff output, present between the diff and delivery stages.
    output: Option<Vec<Item>>,
}

/// All feeds of one run, bound to the cache.
pub struct State {
    store: CacheStore,
    bound: Vec<Bound>,
    /// Descriptors of everything configured, undue feeds included; the
    /// stale-feed eviction must not treat a merely-undue feed as gone.
    known: HashSet<Descriptor>,
    max_failures: u32,
}

impl State {
    /// Bind every configured feed to its cache entry. Fails when a
    /// feed's item-filter pattern does not compile.
    pub fn new(cfg: &Config, mut store: CacheStore) -> Result<Self> {
        let mut bound = Vec::with_capacity(cfg.feeds.len());
        let mut known = HashSet::with_capacity(cfg.feeds.len());

        for feed_cfg in &cfg.feeds {
            let feed = Feed::new(feed_cfg.clone());
            let filter = feed
                .item_filter()
                .or_raise(|| ErrorKind::Feed(feed.name().to_string()))?;
            let descriptor = feed.descriptor();
            let id = store.resolve(&descriptor);
            store.entry(id);
            known.insert(descriptor);
            bound.push(Bound { feed, id, filter, items: None, output: None });
        }

        Ok(Self { store, bound, known, max_failures: cfg.max_failures })
    }

    pub fn num_feeds(&self) -> usize {
        self.bound.len()
    }

    /// Drop feeds that are disabled or were checked within their
    /// min-frequency window. Runs before any fetch happens.
    pub fn remove_undue(&mut self) {
        let store = &mut self.store;
        self.bound.retain(|bound| {
            if bound.feed.config.options.disabled() {
                debug!("feed '{}' is disabled, skipping", bound.feed.name());
                return false;
            }
            bound.feed.needs_update(store.entry(bound.id).last_check())
        });
    }

    /// Fan fetches out over all bound feeds and record each outcome on
    /// the feed's cache entry. Returns the number of successful fetches.
    #[instrument(skip_all, fields(feeds = self.bound.len()))]
    pub async fn fetch(&mut self, source: Arc<dyn FeedSource>) -> usize {
        let mut set = JoinSet::new();
        for (idx, bound) in self.bound.iter().enumerate() {
            info!("fetching {} from {}", bound.feed.name(), bound.feed.descriptor().url);
            let feed = bound.feed.clone();
            let source = Arc::clone(&source);
            set.spawn(async move { (idx, source.fetch(&feed).await) });
        }

        let mut successes = 0;
        while let Some(joined) = set.join_next().await {
            let (idx, result) = match joined {
                Ok(pair) => pair,
                Err(err) => {
                    error!("fetch task failed: {err}");
                    continue;
                },
            };
            let bound = &mut self.bound[idx];
            let entry = self.store.entry(bound.id);
            match result {
                Ok(items) => {
                    debug!(feed = bound.feed.name(), count = items.len(), "fetched");
                    bound.items = Some(items);
                    entry.checked(false);
                    successes += 1;
                },
                Err(err) => {
                    entry.checked(true);
                    let failures = entry.failures();
                    if failures > self.max_failures {
                        error!(feed = bound.feed.name(), failures, "fetching failed: {err:?}");
                    } else {
                        warn!(feed = bound.feed.name(), failures, "fetching failed: {err:?}");
                    }
                },
            }
        }
        successes
    }

    /// Diff every successfully fetched feed against its cache entry and
    /// stage the results. Runs feeds concurrently, except under debug
    /// logging where sequential execution keeps the output readable.
    pub async fn filter(&mut self) {
        if tracing::enabled!(Level::DEBUG) {
            for bound in &mut self.bound {
                Self::filter_one(&mut self.store, bound);
            }
            return;
        }

        let mut set = JoinSet::new();
        for (idx, bound) in self.bound.iter_mut().enumerate() {
            let Some(items) = bound.items.take() else { continue };
            // the diff is pure; hand a snapshot of the entry to the task
            // and stage the result on the real entry after the join
            let entry = self.store.entry(bound.id).clone();
            let filter = bound.filter.clone();
            let name = bound.feed.name().to_string();
            let ignore_hash = bound.feed.config.options.ignore_hash();
            let always_new = bound.feed.config.options.always_new();
            set.spawn(async move {
                let items = Self::keep_matching(filter.as_ref(), &name, items);
                (idx, entry.diff(items, ignore_hash, always_new))
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, diff)) => {
                    let id = self.bound[idx].id;
                    let output = self.store.entry(id).stage(diff);
                    info!(feed = self.bound[idx].feed.name(), count = output.len(), "items to deliver");
                    self.bound[idx].output = Some(output);
                },
                Err(err) => error!("diff task failed: {err}"),
            }
        }
    }

    fn filter_one(store: &mut CacheStore, bound: &mut Bound) {
        let Some(items) = bound.items.take() else { return };
        let items = Self::keep_matching(bound.filter.as_ref(), bound.feed.name(), items);
        let entry = store.entry(bound.id);
        let diff = entry.diff(
            items,
            bound.feed.config.options.ignore_hash(),
            bound.feed.config.options.always_new(),
        );
        let output = entry.stage(diff);
        info!(feed = bound.feed.name(), count = output.len(), "items to deliver");
        bound.output = Some(output);
    }

    /// Drop fetched items the feed's item filter rejects.
    fn keep_matching(filter: Option<&ItemFilter>, feed: &str, mut items: Vec<Item>) -> Vec<Item> {
        let Some(filter) = filter else { return items };
        let before = items.len();
        items.retain(|item| filter.matches(item));
        debug!(feed, before, after = items.len(), "applied item filter");
        items
    }

    /// Hand each feed's diff output to the delivery layer; a feed's
    /// entry commits only once its own delivery succeeded. Feeds whose
    /// delivery fails stay uncommitted and are offered again next run.
    pub async fn deliver(&mut self, delivery: Arc<dyn Delivery>) -> Result<()> {
        let mut set = JoinSet::new();
        for (idx, bound) in self.bound.iter_mut().enumerate() {
            let Some(items) = bound.output.take() else { continue };
            if items.is_empty() {
                // nothing new; commit the check time right away
                self.store.entry(bound.id).commit();
                continue;
            }
            let feed = bound.feed.clone();
            let handle = bound.id.to_string();
            let delivery = Arc::clone(&delivery);
            set.spawn(async move { (idx, delivery.deliver(&feed, &handle, &items).await) });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, Ok(()))) => {
                    let id = self.bound[idx].id;
                    self.store.entry(id).commit();
                },
                Ok((idx, Err(err))) => {
                    warn!(feed = self.bound[idx].feed.name(), "delivery failed: {err:?}");
                },
                Err(err) => error!("delivery task failed: {err}"),
            }
        }
        Ok(())
    }

    /// Mark every bound feed as checked and commit, without fetching or
    /// delivering anything. Recovers a lost cache file without
    /// re-delivering history.
    pub fn build_cache(&mut self) {
        for bound in &self.bound {
            let entry = self.store.entry(bound.id);
            entry.checked(false);
            entry.commit();
        }
    }

    /// Evict stale unconfigured feeds and write the cache back,
    /// releasing the lock.
    pub fn finalize(mut self, path: &Path) -> Result<()> {
        self.store.evict_stale(&self.known);
        self.store.store(path).or_raise(|| ErrorKind::Cache)
    }

    /// Release the cache lock without storing, for error-driven teardown.
    pub fn unlock(&mut self) {
        self.store.unlock();
    }
}
