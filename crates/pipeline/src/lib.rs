//! The run orchestrator.
//!
//! One run walks every configured feed through four stages:
//!
//! 1. **fetch**: every due feed's items are pulled through the
//!    [`FeedSource`] seam, concurrently; failures are counted on the
//!    feed's cache entry and never abort the run unless *all* fetches
//!    fail.
//! 2. **filter**: each fetched batch passes the feed's item filter (if
//!    configured) and is diffed against the feed's cache entry;
//!    surviving items are tagged new or update and the resulting cache
//!    state is staged.
//! 3. **deliver**: each feed's surviving items are handed to the
//!    [`Delivery`] implementation.
//! 4. **commit**: a feed's staged cache state becomes permanent only
//!    after its own delivery succeeded, so a crash or delivery failure
//!    re-offers the same items next run instead of dropping them.
//!
//! The cache file is written back, and the lock released, only at the
//! very end of a successful run.

pub mod deliver;
pub mod error;
mod state;

pub use crate::deliver::{Delivery, DryRun};
pub use crate::state::State;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use plumage_cache::CacheStore;
use plumage_config::Config;
use plumage_feed::FeedSource;
use std::sync::Arc;
use tracing::{info, instrument};

/// Knobs for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Mark every feed checked and commit without fetching or delivering
    /// anything. Rebuilds a lost cache without re-delivering history.
    pub build_cache: bool,
    /// Rewrite an old-version cache file to the current format on load.
    pub migrate: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { build_cache: false, migrate: true }
    }
}

/// Execute one full run against the cache at `cfg.cache_path`.
///
/// On success the cache is stored and unlocked; on error committed state
/// is left exactly as the previous run wrote it.
#[instrument(skip_all)]
pub async fn run(
    cfg: &Config,
    source: Arc<dyn FeedSource>,
    delivery: Arc<dyn Delivery>,
    options: RunOptions,
) -> Result<()> {
    let store = CacheStore::load(&cfg.cache_path, options.migrate).or_raise(|| ErrorKind::Cache)?;
    let mut state = State::new(cfg, store)?;
    match drive(&mut state, source, delivery, &options).await {
        Ok(()) => state.finalize(&cfg.cache_path),
        Err(err) => {
            state.unlock();
            Err(err)
        },
    }
}

async fn drive(
    state: &mut State,
    source: Arc<dyn FeedSource>,
    delivery: Arc<dyn Delivery>,
    options: &RunOptions,
) -> Result<()> {
    if options.build_cache {
        info!("populating the cache without fetching or delivering");
        state.build_cache();
        return Ok(());
    }

    state.remove_undue();
    if state.num_feeds() == 0 {
        info!("no feeds are due");
        return Ok(());
    }

    let fetched = state.fetch(source).await;
    info!("fetched {fetched} of {} feeds", state.num_feeds());
    if fetched == 0 {
        exn::bail!(ErrorKind::AllFeedsFailed);
    }

    state.filter().await;
    state.deliver(delivery).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use plumage_feed::{Feed, Item};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves canned items per feed name; unknown feeds fail to fetch.
    struct StaticSource {
        feeds: HashMap<String, Vec<Item>>,
    }

    impl StaticSource {
        fn new(feeds: &[(&str, Vec<Item>)]) -> Arc<Self> {
            let feeds =
                feeds.iter().map(|(name, items)| (name.to_string(), items.clone())).collect();
            Arc::new(Self { feeds })
        }
    }

    #[async_trait]
    impl FeedSource for StaticSource {
        async fn fetch(&self, feed: &Feed) -> plumage_feed::error::Result<Vec<Item>> {
            match self.feeds.get(feed.name()) {
                Some(items) => Ok(items.clone()),
                None => exn::bail!(plumage_feed::error::ErrorKind::Fetch(feed.name().to_string())),
            }
        }
    }

    /// Records (feed name, item title) pairs.
    #[derive(Default)]
    struct Recorder {
        delivered: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Delivery for Recorder {
        async fn deliver(&self, feed: &Feed, _handle: &str, items: &[Item]) -> Result<()> {
            let mut log = self.delivered.lock().unwrap();
            for item in items {
                log.push((feed.name().to_string(), item.title.clone()));
            }
            Ok(())
        }
    }

    struct FailingDelivery;

    #[async_trait]
    impl Delivery for FailingDelivery {
        async fn deliver(&self, feed: &Feed, _handle: &str, _items: &[Item]) -> Result<()> {
            exn::bail!(ErrorKind::Delivery(feed.name().to_string()))
        }
    }

    fn feed(name: &str) -> plumage_config::Feed {
        plumage_config::Feed {
            name: name.into(),
            url: format!("https://example.org/{name}.json"),
            exec: Vec::new(),
            target: name.into(),
            item_filter: None,
            options: plumage_config::Options {
                min_frequency: Some(0),
                ..plumage_config::Options::default()
            },
        }
    }

    fn config(dir: &Path, feeds: Vec<plumage_config::Feed>) -> Config {
        Config { timeout: 5, max_failures: 2, cache_path: dir.join("plumage.cache"), feeds }
    }

    fn items(name: &str, count: usize) -> Vec<Item> {
        (0..count)
            .map(|n| {
                Item::new(
                    format!("{name}-{n}"),
                    format!("{name} item {n}"),
                    format!("https://example.org/{name}/{n}"),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn new_items_are_delivered_exactly_once() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), vec![feed("birds")]);
        let source = StaticSource::new(&[("birds", items("birds", 2))]);

        let first = Arc::new(Recorder::default());
        run(&cfg, source.clone(), first.clone(), RunOptions::default()).await.unwrap();
        assert_eq!(first.delivered.lock().unwrap().len(), 2);

        let second = Arc::new(Recorder::default());
        run(&cfg, source, second.clone(), RunOptions::default()).await.unwrap();
        assert!(second.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_failing_feed_does_not_abort_the_run() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), vec![feed("good"), feed("broken")]);
        let source = StaticSource::new(&[("good", items("good", 1))]);

        let recorder = Arc::new(Recorder::default());
        run(&cfg, source, recorder.clone(), RunOptions::default()).await.unwrap();

        let delivered = recorder.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "good");
        assert!(cfg.cache_path.exists());
    }

    #[tokio::test]
    async fn all_feeds_failing_aborts_and_releases_the_lock() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), vec![feed("a"), feed("b")]);
        let source = StaticSource::new(&[]);

        let recorder = Arc::new(Recorder::default());
        let err = run(&cfg, source, recorder.clone(), RunOptions::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AllFeedsFailed));
        assert!(recorder.delivered.lock().unwrap().is_empty());

        // nothing was committed and the lock is gone
        CacheStore::load(&cfg.cache_path, false).unwrap();
    }

    #[tokio::test]
    async fn build_cache_neither_fetches_nor_delivers() {
        let dir = TempDir::new().unwrap();
        // an undeliverable source would make any fetch attempt fail loudly
        let cfg = config(dir.path(), vec![feed("birds")]);
        let source = StaticSource::new(&[]);

        let recorder = Arc::new(Recorder::default());
        let options = RunOptions { build_cache: true, ..RunOptions::default() };
        run(&cfg, source, recorder.clone(), options).await.unwrap();

        assert!(recorder.delivered.lock().unwrap().is_empty());
        assert!(cfg.cache_path.exists());
    }

    #[tokio::test]
    async fn disabled_feeds_are_skipped() {
        let dir = TempDir::new().unwrap();
        let mut disabled = feed("birds");
        disabled.options.disable = Some(true);
        let cfg = config(dir.path(), vec![disabled]);
        // fetching this feed would succeed, so a delivery would be visible
        let source = StaticSource::new(&[("birds", items("birds", 1))]);

        let recorder = Arc::new(Recorder::default());
        run(&cfg, source, recorder.clone(), RunOptions::default()).await.unwrap();
        assert!(recorder.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn item_filter_drops_non_matching_items() {
        let dir = TempDir::new().unwrap();
        let mut filtered = feed("birds");
        filtered.item_filter = Some("item [02]".into());
        let cfg = config(dir.path(), vec![filtered]);
        let source = StaticSource::new(&[("birds", items("birds", 3))]);

        let recorder = Arc::new(Recorder::default());
        run(&cfg, source, recorder.clone(), RunOptions::default()).await.unwrap();

        let delivered = recorder.delivered.lock().unwrap();
        let titles: Vec<_> = delivered.iter().map(|(_, title)| title.as_str()).collect();
        assert_eq!(titles, ["birds item 0", "birds item 2"]);
    }

    #[tokio::test]
    async fn invalid_item_filter_aborts_and_releases_the_lock() {
        let dir = TempDir::new().unwrap();
        let mut broken = feed("birds");
        broken.item_filter = Some("[unclosed".into());
        let cfg = config(dir.path(), vec![broken]);
        let source = StaticSource::new(&[("birds", items("birds", 1))]);

        let recorder = Arc::new(Recorder::default());
        let err = run(&cfg, source, recorder.clone(), RunOptions::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Feed(name) if name == "birds"));
        assert!(recorder.delivered.lock().unwrap().is_empty());

        // the lock was released when the state failed to build
        CacheStore::load(&cfg.cache_path, false).unwrap();
    }

    #[tokio::test]
    async fn failed_delivery_is_offered_again_next_run() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), vec![feed("birds")]);
        let source = StaticSource::new(&[("birds", items("birds", 2))]);

        run(&cfg, source.clone(), Arc::new(FailingDelivery), RunOptions::default())
            .await
            .unwrap();

        let recorder = Arc::new(Recorder::default());
        run(&cfg, source, recorder.clone(), RunOptions::default()).await.unwrap();
        assert_eq!(recorder.delivered.lock().unwrap().len(), 2);
    }
}
