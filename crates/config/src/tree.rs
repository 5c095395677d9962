//! The group/feed tree builder.
//!
//! The `feeds` list in the configuration is a tree: entries are either
//! feeds or groups holding further entries. Flattening walks the tree,
//! composing target paths from the group hierarchy and merging default
//! options into every feed.

use crate::error::{ErrorKind, Result};
use crate::{Feed, Options};
use serde::Deserialize;
use std::collections::HashSet;

/// One entry in the configuration tree, not yet resolved into a feed or
/// a group. Which of the two it is gets decided during flattening.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct RawEntry {
    // feed fields
    name: Option<String>,
    url: Option<String>,
    exec: Option<Vec<String>>,
    item_filter: Option<String>,
    #[serde(flatten)]
    options: Options,
    // group fields
    group: Option<String>,
    feeds: Option<Vec<RawEntry>>,
    // common
    target: Option<String>,
}

impl RawEntry {
    fn is_feed(&self) -> bool {
        self.name.is_some()
    }

    fn is_group(&self) -> bool {
        self.group.is_some()
    }

    /// The target component this entry contributes: an explicit `target`
    /// wins, otherwise the feed or group name. An explicit empty target
    /// skips the level entirely.
    fn target(&self) -> &str {
        self.target
            .as_deref()
            .or(self.name.as_deref())
            .or(self.group.as_deref())
            .unwrap_or("")
    }
}

/// Append a path component to a target prefix.
fn app_target(target: &str, component: &str) -> String {
    match (target.is_empty(), component.is_empty()) {
        (true, _) => component.to_string(),
        (_, true) => target.to_string(),
        _ => format!("{target}/{component}"),
    }
}

/// Flatten the configuration tree into a list of feeds.
///
/// Feed order follows the document; duplicate feed names and entries that
/// are both (or neither) feed and group are hard errors.
pub(crate) fn build_feeds(
    entries: Vec<RawEntry>,
    target: &str,
    defaults: &Options,
) -> Result<Vec<Feed>> {
    let mut feeds = Vec::new();
    let mut names = HashSet::new();
    walk(entries, target, defaults, &mut feeds, &mut names)?;
    Ok(feeds)
}

fn walk(
    entries: Vec<RawEntry>,
    target: &str,
    defaults: &Options,
    feeds: &mut Vec<Feed>,
    names: &mut HashSet<String>,
) -> Result<()> {
    for entry in entries {
        let target = app_target(target, entry.target());
        match (entry.is_feed(), entry.is_group()) {
            (true, true) => exn::bail!(ErrorKind::FeedAndGroup(target)),
            (false, false) => exn::bail!(ErrorKind::NeitherFeedNorGroup(target)),
            (true, false) => feeds.push(build_feed(entry, target, defaults, names)?),
            (false, true) => walk(entry.feeds.unwrap_or_default(), &target, defaults, feeds, names)?,
        }
    }
    Ok(())
}

fn build_feed(
    entry: RawEntry,
    target: String,
    defaults: &Options,
    names: &mut HashSet<String>,
) -> Result<Feed> {
    let name = entry.name.unwrap_or_default();
    if !names.insert(name.clone()) {
        exn::bail!(ErrorKind::DuplicateFeed(name));
    }

    let url = entry.url.unwrap_or_default();
    let exec = entry.exec.unwrap_or_default();
    if url.is_empty() == exec.is_empty() {
        exn::bail!(ErrorKind::FeedSource(name));
    }

    let mut options = entry.options;
    options.merge_from(defaults);

    Ok(Feed { name, url, exec, target, item_filter: entry.item_filter, options })
}
