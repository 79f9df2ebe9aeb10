//! Packaged resource resolution
//!
//! [`BundleResolver`] serves resources from an in-memory archive, the
//! deployment shape where scripts and templates ship inside the build
//! artifact instead of as loose files. [`ChainResolver`] searches several
//! resolvers in order under one namespace, the way deployments overlay
//! loose files over a packaged bundle (loose file wins).

use crate::error::{NimbusError, NimbusResult};
use crate::resource::{canonical, ResourceResolver};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct BundleFile {
    bytes: Arc<[u8]>,
    last_modified: DateTime<Utc>,
}

/// Resolver over archive-packaged resources held in memory
///
/// Entries carry the timestamp they were packaged with; a bundle never
/// changes at runtime, so cache entries backed by it stay fresh forever.
#[derive(Debug, Clone, Default)]
pub struct BundleResolver {
    files: HashMap<String, BundleFile>,
}

impl BundleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a packaged resource under its logical path
    pub fn insert(
        &mut self,
        path: &str,
        bytes: impl Into<Vec<u8>>,
        last_modified: DateTime<Utc>,
    ) {
        self.files.insert(
            canonical(path),
            BundleFile {
                bytes: bytes.into().into(),
                last_modified,
            },
        );
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with_file(
        mut self,
        path: &str,
        bytes: impl Into<Vec<u8>>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        self.insert(path, bytes, last_modified);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ResourceResolver for BundleResolver {
    fn stat(&self, path: &str) -> NimbusResult<Option<DateTime<Utc>>> {
        Ok(self.files.get(&canonical(path)).map(|f| f.last_modified))
    }

    fn open(&self, path: &str) -> NimbusResult<Box<dyn Read + Send>> {
        let logical = canonical(path);
        match self.files.get(&logical) {
            Some(f) => Ok(Box::new(Cursor::new(Arc::clone(&f.bytes)))),
            None => Err(NimbusError::ResourceNotFound(logical)),
        }
    }
}

/// Presents several resolvers as one namespace, first match wins
pub struct ChainResolver {
    resolvers: Vec<Arc<dyn ResourceResolver>>,
}

impl ChainResolver {
    pub fn new(resolvers: Vec<Arc<dyn ResourceResolver>>) -> Self {
        Self { resolvers }
    }
}

impl ResourceResolver for ChainResolver {
    fn stat(&self, path: &str) -> NimbusResult<Option<DateTime<Utc>>> {
        for resolver in &self.resolvers {
            if let Some(ts) = resolver.stat(path)? {
                return Ok(Some(ts));
            }
        }
        Ok(None)
    }

    fn open(&self, path: &str) -> NimbusResult<Box<dyn Read + Send>> {
        for resolver in &self.resolvers {
            if resolver.stat(path)?.is_some() {
                return resolver.open(path);
            }
        }
        Err(NimbusError::ResourceNotFound(canonical(path)))
    }
}
