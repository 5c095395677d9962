//! Configuration Error Types
//!
//! Structured errors using `exn` for automatic location tracking, with
//! `derive_more` display/error derives on the kind enum.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Configuration file could not be read.
    #[display("cannot read configuration file: {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    /// Configuration file could not be parsed as YAML.
    #[display("invalid configuration")]
    Parse,
    /// Two feeds share the same name.
    #[display("duplicate feed name '{_0}'")]
    DuplicateFeed(#[error(not(source))] String),
    /// An entry declares both `name` and `group`.
    #[display("entry with target '{_0}' is both a feed and a group")]
    FeedAndGroup(#[error(not(source))] String),
    /// An entry declares neither `name` nor `group`.
    #[display("entry with target '{_0}' is neither a feed nor a group")]
    NeitherFeedNorGroup(#[error(not(source))] String),
    /// A feed must have exactly one of `url` and `exec`.
    #[display("feed '{_0}' needs either a url or an exec command, but not both")]
    FeedSource(#[error(not(source))] String),
}
