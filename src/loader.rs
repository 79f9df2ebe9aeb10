//! Script compile-and-load pipeline
//!
//! Turns a logical path into a compiled unit executed in the caller's
//! scope, recompiling only when the backing resource changed. Two cache
//! tiers cooperate here: the shared [`UnitCache`] holds the immutable
//! unit, the scope-local tier records whether *this* worker has run the
//! unit's top-level side effects at the cached revision. Conflating them
//! would either recompile per worker or skip re-execution after a shared
//! recompile.

use crate::cache::{Freshness, UnitCache};
use crate::clock::Clock;
use crate::engine::{CompiledUnit, ScriptEngine};
use crate::error::{NimbusError, NimbusResult};
use crate::resource::{self, ResourceResolver};
use crate::scope::Scope;
use std::sync::Arc;
use tracing::{debug, info};

/// Loads scripts through the shared cache into worker scopes
pub struct ScriptLoader {
    cache: Arc<UnitCache>,
    resolver: Arc<dyn ResourceResolver>,
    engine: Arc<dyn ScriptEngine>,
    clock: Arc<dyn Clock>,
}

impl ScriptLoader {
    pub fn new(
        cache: Arc<UnitCache>,
        resolver: Arc<dyn ResourceResolver>,
        engine: Arc<dyn ScriptEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            resolver,
            engine,
            clock,
        }
    }

    pub fn cache(&self) -> &Arc<UnitCache> {
        &self.cache
    }

    pub fn resolver(&self) -> &Arc<dyn ResourceResolver> {
        &self.resolver
    }

    pub fn engine(&self) -> &Arc<dyn ScriptEngine> {
        &self.engine
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Ensure `key` is compiled, current and executed in `scope`.
    ///
    /// Returns the unit and whether this call (re)ran its top-level
    /// effects in the scope: `false` only on a scope-tier hit, `true`
    /// after a recompile or after executing a shared unit this scope had
    /// not run at its current revision.
    ///
    /// A failed recompile leaves the previous shared entry untouched, so
    /// other requests keep the last good version while the error bubbles
    /// to this caller.
    pub fn load(&self, key: &str, scope: &mut Scope) -> NimbusResult<(Arc<CompiledUnit>, bool)> {
        let key = resource::canonical(key);
        if let Freshness::Fresh =
            self.cache
                .freshness(&key, self.resolver.as_ref(), self.clock.as_ref())?
        {
            if let Some(entry) = self.cache.get(&key) {
                return self.execute_if_unseen(&key, entry.revision(), entry.unit(), scope);
            }
        }
        self.reload(&key, scope)
    }

    /// Scope-tier check: run top-level effects only if this scope has not
    /// executed this revision yet
    fn execute_if_unseen(
        &self,
        key: &str,
        revision: u64,
        unit: &Arc<CompiledUnit>,
        scope: &mut Scope,
    ) -> NimbusResult<(Arc<CompiledUnit>, bool)> {
        if scope.executed_revision(key) == Some(revision) {
            return Ok((Arc::clone(unit), false));
        }
        debug!(key, revision, scope = %scope.id(), "executing cached unit in scope");
        self.engine.execute(unit, scope)?;
        scope.mark_executed(key, revision);
        Ok((Arc::clone(unit), true))
    }

    /// Slow path: fetch, compile, publish, execute
    fn reload(&self, key: &str, scope: &mut Scope) -> NimbusResult<(Arc<CompiledUnit>, bool)> {
        let lock = self.cache.key_lock(key);
        // a worker that panicked mid-compile published nothing; the lock
        // itself guards no data
        let _flight = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // the winner of a concurrent race already recompiled while we
        // waited on the key lock; reuse its entry
        if let Freshness::Fresh =
            self.cache
                .freshness(key, self.resolver.as_ref(), self.clock.as_ref())?
        {
            if let Some(entry) = self.cache.get(key) {
                return self.execute_if_unseen(key, entry.revision(), entry.unit(), scope);
            }
        }

        let last_modified = self
            .resolver
            .stat(key)?
            .ok_or_else(|| NimbusError::ResourceNotFound(key.to_string()))?;
        let source = resource::read_to_string(self.resolver.as_ref(), key)?;

        info!(key, "compiling");
        let unit = match self.engine.compile(key, &source) {
            Ok(unit) => unit,
            Err(e) => {
                // stale-but-working fallback: the previous entry keeps
                // serving, and its refreshed stamp keeps the window from
                // retrying the broken source on every request
                self.cache.touch_failed(key, self.clock.as_ref());
                return Err(e);
            }
        };

        let entry = self
            .cache
            .replace(key, last_modified, Arc::clone(&unit), vec![], self.clock.as_ref());
        self.engine.execute(&unit, scope)?;
        scope.mark_executed(key, entry.revision());
        Ok((unit, true))
    }
}

impl std::fmt::Debug for ScriptLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptLoader")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
