//! Loose-file resource resolution
//!
//! Resolves logical paths against a root directory on disk, the layout
//! used during development where edits to source files must be picked up
//! by the running process.

use crate::error::{NimbusError, NimbusResult};
use crate::resource::{canonical, ResourceResolver};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Resolver over loose files rooted at a directory
#[derive(Debug, Clone)]
pub struct DirResolver {
    root: PathBuf,
}

impl DirResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a logical path onto the filesystem, rejecting traversal
    fn real_path(&self, path: &str) -> NimbusResult<PathBuf> {
        let logical = canonical(path);
        for segment in logical.split('/') {
            if segment == ".." || segment.contains('\0') {
                return Err(NimbusError::read(
                    logical.clone(),
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "path escapes resource root",
                    ),
                ));
            }
        }
        Ok(self.root.join(logical.trim_start_matches('/')))
    }
}

impl ResourceResolver for DirResolver {
    fn stat(&self, path: &str) -> NimbusResult<Option<DateTime<Utc>>> {
        let real = self.real_path(path)?;
        match fs::metadata(&real) {
            Ok(meta) => {
                let modified = meta.modified().map_err(|e| NimbusError::read(path, e))?;
                Ok(Some(DateTime::<Utc>::from(modified)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(NimbusError::read(path, e)),
        }
    }

    fn open(&self, path: &str) -> NimbusResult<Box<dyn Read + Send>> {
        let real = self.real_path(path)?;
        match fs::File::open(&real) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(NimbusError::ResourceNotFound(canonical(path)))
            }
            Err(e) => Err(NimbusError::read(path, e)),
        }
    }
}
