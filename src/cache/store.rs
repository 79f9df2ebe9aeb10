//! Concurrent key→entry store with freshness checking
//!
//! Shared across workers. Replacement is by whole-entry swap under a
//! concurrent map, so two workers racing to recompile the same stale key
//! both publish internally consistent entries and the last one wins.

use crate::cache::entry::{CacheEntry, Freshness};
use crate::clock::Clock;
use crate::engine::CompiledUnit;
use crate::error::{NimbusError, NimbusResult};
use crate::resource::ResourceResolver;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Process-wide cache of compiled units keyed by logical path
pub struct UnitCache {
    entries: DashMap<String, Arc<CacheEntry>>,
    /// Per-key singleflight locks collapsing concurrent recompiles
    locks: DashMap<String, Arc<Mutex<()>>>,
    revisions: AtomicU64,
    window: Duration,
}

impl UnitCache {
    /// Create a cache trusting entries for `window` between stats
    pub fn new(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            locks: DashMap::new(),
            revisions: AtomicU64::new(0),
            window,
        }
    }

    /// The configured reload window
    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.entries.get(key).map(|e| Arc::clone(e.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decide whether the entry for `key` can be trusted without I/O,
    /// survives a timestamp re-check, or must be reloaded.
    ///
    /// Within the reload window the entry is trusted with zero resolver
    /// calls. Outside it, one `stat` either refreshes the last-checked
    /// stamp (timestamp unchanged) or reports `Stale`. A resolver
    /// not-found propagates as `ResourceNotFound`; the caller decides
    /// fatality.
    pub fn freshness(
        &self,
        key: &str,
        resolver: &dyn ResourceResolver,
        clock: &dyn Clock,
    ) -> NimbusResult<Freshness> {
        let Some(entry) = self.get(key) else {
            return Ok(Freshness::Missing);
        };
        let now = clock.now();
        if entry.within_window(now, self.window) {
            return Ok(Freshness::Fresh);
        }
        let current = resolver
            .stat(key)?
            .ok_or_else(|| NimbusError::ResourceNotFound(key.to_string()))?;
        if current == entry.last_modified() {
            entry.refresh_checked(now);
            Ok(Freshness::Fresh)
        } else {
            debug!(key, %current, cached = %entry.last_modified(), "resource changed");
            Ok(Freshness::Stale)
        }
    }

    /// Publish a brand-new entry for `key`, superseding any prior one.
    ///
    /// The new entry gets the next revision; readers holding the old
    /// `Arc` keep a consistent view.
    pub fn replace(
        &self,
        key: &str,
        last_modified: DateTime<Utc>,
        unit: Arc<CompiledUnit>,
        dependencies: Vec<String>,
        clock: &dyn Clock,
    ) -> Arc<CacheEntry> {
        let revision = self.revisions.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = Arc::new(CacheEntry::new(
            key,
            revision,
            last_modified,
            clock.now(),
            unit,
            dependencies,
        ));
        self.entries.insert(key.to_string(), Arc::clone(&entry));
        debug!(key, revision, "cache entry replaced");
        entry
    }

    /// Keep serving the current entry despite a failed recompile: refresh
    /// its last-checked stamp so the window damps repeated attempts while
    /// the source stays broken.
    pub(crate) fn touch_failed(&self, key: &str, clock: &dyn Clock) {
        if let Some(entry) = self.get(key) {
            entry.refresh_checked(clock.now());
        }
    }

    /// Singleflight lock for `key`; holders serialize recompiles of the
    /// same stale key within this process
    pub(crate) fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Drop every entry. Entries are otherwise never deleted; this exists
    /// for process shutdown and tests.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for UnitCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitCache")
            .field("entries", &self.entries.len())
            .field("window", &self.window)
            .finish()
    }
}
