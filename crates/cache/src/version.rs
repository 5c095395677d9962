//! The versioned on-disk codec.
//!
//! A cache file is `[1 version byte][version-specific payload]`. The
//! version set is closed and known at compile time, so versions are a
//! plain enum and the payload snapshot a tagged union rather than an
//! open trait object.
//!
//! - **Version 1**: the cache container serialized with bincode under
//!   strict options (trailing bytes rejected).
//! - **Version 2**: version 1's payload run through gzip.
//!
//! Loading an unknown version byte is a hard failure, as is a transform
//! between versions that has no implemented chain. There is no silent
//! best-effort migration.

use crate::data::CacheData;
use crate::error::{ErrorKind, Result};
use bincode::Options as _;
use exn::ResultExt;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fmt;
use std::io::{Read, Write};

/// A supported on-disk format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Version {
    V1 = 1,
    V2 = 2,
}

/// The version newly created and stored caches use.
pub const CURRENT_VERSION: Version = Version::V2;

impl Version {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(Version::V1),
            2 => Ok(Version::V2),
            other => exn::bail!(ErrorKind::UnknownVersion(other)),
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_byte())
    }
}

/// An in-memory cache tagged with the version it was decoded from (or
/// will be encoded as).
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Snapshot {
    V1(CacheData),
    V2(CacheData),
}

impl Snapshot {
    pub(crate) fn new_current() -> Self {
        Snapshot::V2(CacheData::default())
    }

    pub(crate) fn version(&self) -> Version {
        match self {
            Snapshot::V1(_) => Version::V1,
            Snapshot::V2(_) => Version::V2,
        }
    }

    pub(crate) fn data(&self) -> &CacheData {
        match self {
            Snapshot::V1(data) | Snapshot::V2(data) => data,
        }
    }

    pub(crate) fn data_mut(&mut self) -> &mut CacheData {
        match self {
            Snapshot::V1(data) | Snapshot::V2(data) => data,
        }
    }

    /// Decode a payload for a known version.
    pub(crate) fn decode(version: Version, payload: &[u8]) -> Result<Self> {
        match version {
            Version::V1 => Ok(Snapshot::V1(decode_bincode(payload, version)?)),
            Version::V2 => {
                let mut inflated = Vec::new();
                GzDecoder::new(payload)
                    .read_to_end(&mut inflated)
                    .or_raise(|| ErrorKind::Decode(version.as_byte()))?;
                Ok(Snapshot::V2(decode_bincode(&inflated, version)?))
            },
        }
    }

    /// Encode this snapshot's payload (without the leading version byte).
    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let plain = bincode_options().serialize(self.data()).or_raise(|| ErrorKind::Encode)?;
        match self {
            Snapshot::V1(_) => Ok(plain),
            Snapshot::V2(_) => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
                encoder.write_all(&plain).or_raise(|| ErrorKind::Encode)?;
                encoder.finish().or_raise(|| ErrorKind::Encode)
            },
        }
    }

    /// Walk the transform chain towards `target`. Only the identity
    /// transform and V1 to V2 are implemented; anything else fails hard.
    pub(crate) fn transform_to(self, target: Version) -> Result<Self> {
        let from = self.version();
        match (self, target) {
            (snapshot, target) if snapshot.version() == target => Ok(snapshot),
            (Snapshot::V1(data), Version::V2) => Ok(Snapshot::V2(data)),
            _ => exn::bail!(ErrorKind::Migration(from.as_byte(), target.as_byte())),
        }
    }
}

fn bincode_options() -> impl bincode::Options {
    // the default options reject trailing bytes, which is exactly the
    // strictness the file format demands
    bincode::options()
}

fn decode_bincode(payload: &[u8], version: Version) -> Result<CacheData> {
    bincode_options()
        .deserialize(payload)
        .or_raise(|| ErrorKind::Decode(version.as_byte()))
}
