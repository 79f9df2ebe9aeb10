//! Resource resolution
//!
//! Maps a logical path to a byte stream and a last-modified timestamp.
//! Two backing strategies exist: loose files under a root directory
//! ([`DirResolver`]) and archive-packaged resources ([`BundleResolver`]).
//! [`ChainResolver`] presents several of them as a single namespace,
//! first match wins.
//!
//! Logical paths use forward slashes and a leading slash regardless of
//! backing store.

pub mod bundle;
pub mod dir;

pub use bundle::{BundleResolver, ChainResolver};
pub use dir::DirResolver;

use crate::error::{NimbusError, NimbusResult};
use chrono::{DateTime, Utc};
use std::io::Read;

/// Translates a logical path into bytes plus a modification timestamp
pub trait ResourceResolver: Send + Sync {
    /// Current modification timestamp, `Ok(None)` if the path does not
    /// exist
    fn stat(&self, path: &str) -> NimbusResult<Option<DateTime<Utc>>>;

    /// Open the resource for reading
    fn open(&self, path: &str) -> NimbusResult<Box<dyn Read + Send>>;
}

/// Canonicalize a logical path: forward slashes, leading slash
pub fn canonical(path: &str) -> String {
    let p = path.replace('\\', "/");
    if p.starts_with('/') {
        p
    } else {
        format!("/{p}")
    }
}

/// Read an entire resource into a UTF-8 string
pub fn read_to_string(resolver: &dyn ResourceResolver, path: &str) -> NimbusResult<String> {
    let mut reader = resolver.open(path)?;
    let mut source = String::new();
    reader
        .read_to_string(&mut source)
        .map_err(|e| NimbusError::read(path, e))?;
    Ok(source)
}
