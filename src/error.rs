//! Binary Error Types
//!
//! Structured errors using `exn` for automatic location tracking, with
//! `derive_more` display/error derives on the kind enum.

use derive_more::{Display, Error};

/// A top-level error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for the binary.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The configuration file could not be loaded or validated.
    #[display("loading the configuration")]
    Config,
    /// The cache could not be opened for inspection.
    #[display("inspecting the cache")]
    Inspect,
    /// The HTTP client could not be constructed.
    #[display("building the feed source")]
    Source,
    /// The run itself failed.
    #[display("the run failed")]
    Run,
}
