//! Configuration loading and validation.
//!
//! Configuration is a single YAML document, loaded through [`figment`].
//! The top level carries global options (timeout, failure threshold, cache
//! location, target prefix) plus a `feeds` list. Entries in that list are
//! either feeds or named groups of further entries; groups compose
//! mailbox-style target paths (`parent/child`) for every feed below them.
//!
//! Per-feed options (`min-frequency`, `always-new`, `ignore-hash`,
//! `disable`) can also be given once at the top level under `options`,
//! serving as defaults for every feed that does not set them itself.

pub mod error;
mod tree;

use crate::error::{ErrorKind, Result};
use crate::tree::build_feeds;
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Format, Yaml};
use serde::Deserialize;
use std::path::{Path, PathBuf};


/// Default fetch timeout in seconds.
const DEFAULT_TIMEOUT: u64 = 30;
/// Default number of consecutive failures before a feed is logged at error level.
const DEFAULT_MAX_FAILURES: u32 = 10;
/// Default minimum refresh interval in hours.
const DEFAULT_MIN_FREQUENCY: u32 = 1;

/// Per-feed options, all optional so that unset values can inherit from
/// the global `options` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Options {
    /// Minimum hours between two checks of this feed.
    pub min_frequency: Option<u32>,
    /// Never treat a link match as an update of an older item.
    pub always_new: Option<bool>,
    /// Ignore the content digest when deciding whether an item changed.
    pub ignore_hash: Option<bool>,
    /// Skip this feed entirely.
    pub disable: Option<bool>,
}

impl Options {
    /// Fill unset fields from `other`.
    pub fn merge_from(&mut self, other: &Options) {
        if self.min_frequency.is_none() {
            self.min_frequency = other.min_frequency;
        }
        if self.always_new.is_none() {
            self.always_new = other.always_new;
        }
        if self.ignore_hash.is_none() {
            self.ignore_hash = other.ignore_hash;
        }
        if self.disable.is_none() {
            self.disable = other.disable;
        }
    }

    pub fn min_frequency(&self) -> u32 {
        self.min_frequency.unwrap_or(DEFAULT_MIN_FREQUENCY)
    }

    pub fn always_new(&self) -> bool {
        self.always_new.unwrap_or(false)
    }

    pub fn ignore_hash(&self) -> bool {
        self.ignore_hash.unwrap_or(false)
    }

    pub fn disabled(&self) -> bool {
        self.disable.unwrap_or(false)
    }
}

/// One configured feed, after group flattening.
///
/// Exactly one of `url` and `exec` is set; an empty `url` means the feed
/// is produced by running `exec` as a subprocess.
#[derive(Debug, Clone)]
pub struct Feed {
    pub name: String,
    pub url: String,
    pub exec: Vec<String>,
    /// Mailbox target path composed from the enclosing groups.
    pub target: String,
    /// Pattern deciding which fetched items are kept; unset keeps all.
    pub item_filter: Option<String>,
    pub options: Options,
}

/// The fully built configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Fetch timeout in seconds, applied per feed.
    pub timeout: u64,
    /// Failure count at which fetch errors switch from warning to error level.
    pub max_failures: u32,
    /// Location of the persistent cache file.
    pub cache_path: PathBuf,
    pub feeds: Vec<Feed>,
}

/// Raw deserialization target for the YAML document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    timeout: Option<u64>,
    max_failures: Option<u32>,
    cache: Option<PathBuf>,
    target: Option<String>,
    /// Default feed options.
    options: Option<Options>,
    #[serde(default)]
    feeds: Vec<tree::RawEntry>,
}

impl Config {
    /// Load and validate the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            exn::bail!(ErrorKind::Read(path.to_path_buf()));
        }
        Self::from_figment(Figment::new().merge(Yaml::file(path)))
    }

    /// Build a configuration from an in-memory YAML document.
    ///
    /// Mostly useful for tests; [`Config::load`] is the production entry
    /// point.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::from_figment(Figment::new().merge(Yaml::string(yaml)))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let raw: RawConfig = figment.extract().or_raise(|| ErrorKind::Parse)?;

        let defaults = raw.options.unwrap_or_default();
        let feeds = build_feeds(raw.feeds, raw.target.as_deref().unwrap_or(""), &defaults)?;

        Ok(Config {
            timeout: raw.timeout.unwrap_or(DEFAULT_TIMEOUT),
            max_failures: raw.max_failures.unwrap_or(DEFAULT_MAX_FAILURES),
            cache_path: raw.cache.unwrap_or_else(default_cache_path),
            feeds,
        })
    }
}

/// The cache location used when the configuration does not name one:
/// the platform cache directory, falling back to the working directory.
pub fn default_cache_path() -> PathBuf {
    ProjectDirs::from("", "", "plumage")
        .map(|dirs| dirs.cache_dir().join("feed.cache"))
        .unwrap_or_else(|| PathBuf::from("feed.cache"))
}
