//! Cache entries and freshness states

use crate::engine::CompiledUnit;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Answer of a freshness check for a cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Entry can be trusted as-is
    Fresh,
    /// Backing resource changed; entry must be recompiled
    Stale,
    /// No entry exists for the key
    Missing,
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Stale => write!(f, "stale"),
            Self::Missing => write!(f, "missing"),
        }
    }
}

/// One compiled unit with its freshness metadata
///
/// Replaced wholesale on recompile; only `last_checked` is refreshed in
/// place, and monotonically.
pub struct CacheEntry {
    key: String,
    revision: u64,
    last_modified: DateTime<Utc>,
    last_checked_ms: AtomicI64,
    unit: Arc<CompiledUnit>,
    dependencies: Vec<String>,
}

impl CacheEntry {
    pub(crate) fn new(
        key: impl Into<String>,
        revision: u64,
        last_modified: DateTime<Utc>,
        checked_at: DateTime<Utc>,
        unit: Arc<CompiledUnit>,
        dependencies: Vec<String>,
    ) -> Self {
        Self {
            key: key.into(),
            revision,
            last_modified,
            last_checked_ms: AtomicI64::new(checked_at.timestamp_millis()),
            unit,
            dependencies,
        }
    }

    /// Logical resource path this entry caches
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Monotonically increasing id assigned at each successful
    /// (re)compile of this key. Scope-local tiers record the revision
    /// they executed, so a shared recompile is never missed.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Resolver timestamp at the last successful (re)compile
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Wall-clock time of the last freshness confirmation
    pub fn last_checked(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_checked_ms.load(Ordering::Acquire))
            .unwrap_or(self.last_modified)
    }

    /// The compiled artifact
    pub fn unit(&self) -> &Arc<CompiledUnit> {
        &self.unit
    }

    /// Template dependencies loaded before this entry's own body
    /// compiled (empty for plain scripts)
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Whether the entry is still inside the reload window
    pub(crate) fn within_window(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.last_checked() < window
    }

    /// Refresh the last-checked stamp; never moves it backwards
    pub(crate) fn refresh_checked(&self, now: DateTime<Utc>) {
        self.last_checked_ms
            .fetch_max(now.timestamp_millis(), Ordering::AcqRel);
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("revision", &self.revision)
            .field("last_modified", &self.last_modified)
            .field("last_checked", &self.last_checked())
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
