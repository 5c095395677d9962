//! Feed Error Types
//!
//! Structured errors using `exn` for automatic location tracking, with
//! `derive_more` display/error derives on the kind enum.

use derive_more::{Display, Error};

/// A feed error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for feed operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// HTTP client could not be constructed.
    #[display("building the http client")]
    Client,
    /// Fetching the feed document over HTTP failed.
    #[display("fetching feed '{_0}'")]
    Fetch(#[error(not(source))] String),
    /// Running the feed's exec command failed.
    #[display("running exec command for feed '{_0}'")]
    Exec(#[error(not(source))] String),
    /// The fetch did not complete within the configured timeout.
    #[display("feed '{_0}' timed out")]
    Timeout(#[error(not(source))] String),
    /// The fetched document is not a valid JSON Feed.
    #[display("parsing feed '{_0}'")]
    Parse(#[error(not(source))] String),
    /// The feed's item-filter pattern did not compile.
    #[display("parsing item-filter of feed '{_0}'")]
    Filter(#[error(not(source))] String),
}
