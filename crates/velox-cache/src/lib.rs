//! Caching primitives for velox.
//!
//! - [`fingerprint`]: the stable key a build request is cached under
//! - [`ArchiveCache`]: downloaded server archives, keyed by server reference
//! - [`ExpiringLru`]: bounded, time-limited map used for built binaries and
//!   for the set of builds currently in flight

mod archive;
mod fingerprint;
mod lru;

pub use archive::ArchiveCache;
pub use fingerprint::{FINGERPRINT_VERSION, Fingerprint, fingerprint};
pub use lru::{EvictReason, ExpiringLru};

use velox_proto::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("refusing to cache an empty archive for {key}")]
    EmptyBlob { key: String },
}

impl CacheError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::EmptyBlob { .. } => ErrorKind::CacheInconsistent,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
