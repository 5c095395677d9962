//! Pipeline Error Types
//!
//! Structured errors using `exn` for automatic location tracking, with
//! `derive_more` display/error derives on the kind enum.

use derive_more::{Display, Error};

/// A pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The persistent cache could not be loaded or stored.
    #[display("cache error")]
    Cache,
    /// Every configured feed failed to fetch; the run is aborted without
    /// touching committed state.
    #[display("fetching of all feeds failed; giving up")]
    AllFeedsFailed,
    /// A feed's configuration could not be turned into a runnable feed.
    #[display("setting up feed '{_0}'")]
    Feed(#[error(not(source))] String),
    /// Handing a feed's items to the delivery layer failed.
    #[display("delivering items of feed '{_0}'")]
    Delivery(#[error(not(source))] String),
}
