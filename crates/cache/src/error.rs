//! Cache Error Types
//!
//! Structured errors using `exn` for automatic location tracking, with
//! `derive_more` display/error derives on the kind enum. Everything here
//! is fatal for the whole run: the cache guards against duplicate mail
//! delivery, so proceeding with a half-understood cache file is never an
//! option.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The version byte at the start of the cache file is not one we know.
    #[display("unknown cache version '{_0}'")]
    UnknownVersion(#[error(not(source))] u8),
    /// The payload of a recognized version failed to decode.
    #[display("decoding cache payload for version '{_0}'")]
    Decode(#[error(not(source))] u8),
    /// The in-memory cache failed to serialize.
    #[display("encoding cache")]
    Encode,
    /// No transform chain exists between the two versions.
    #[display("cannot transform cache from version '{_0}' to '{_1}'")]
    Migration(#[error(not(source))] u8, u8),
    /// The advisory lock is already held, presumably by a concurrently
    /// running instance.
    #[display("locking cache via '{}'", _0.display())]
    Lock(#[error(not(source))] PathBuf),
    /// The cache file could not be read.
    #[display("reading cache from '{}'", _0.display())]
    Read(#[error(not(source))] PathBuf),
    /// The cache file could not be written.
    #[display("writing cache to '{}'", _0.display())]
    Write(#[error(not(source))] PathBuf),
    /// Refusing to store a cache that was loaded without migration.
    #[display("trying to store cache with unsupported version '{_0}'")]
    StoreVersion(#[error(not(source))] u8),
}
