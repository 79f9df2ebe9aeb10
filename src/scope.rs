//! Per-worker execution scope
//!
//! One persistent `Scope` per worker, reused across many requests to
//! amortize setup. A scope carries two kinds of state: named bindings
//! visible to compiled units, and the scope-local record of which cache
//! revisions this worker has already executed top-level. Transient
//! request bindings are installed through [`Scope::bind_transients`],
//! whose guard removes them again no matter how the request ends.

use crate::error::{NimbusError, NimbusResult};
use crate::value::{HostRegistry, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Binding environment in which compiled units run
#[derive(Debug)]
pub struct Scope {
    id: Uuid,
    bindings: HashMap<String, Value>,
    /// Scope-local cache tier: key -> revision whose top-level side
    /// effects this scope has run. Distinct from the shared unit cache:
    /// a unit is shared, "has this worker executed it" is not.
    executed: HashMap<String, u64>,
}

impl Scope {
    /// Create a worker scope seeded with the registry's host functions
    pub fn new(hosts: &HostRegistry) -> Self {
        let mut bindings = HashMap::new();
        for (name, f) in hosts.iter() {
            bindings.insert(name.to_string(), Value::Callable(f.clone()));
        }
        Self {
            id: Uuid::new_v4(),
            bindings,
            executed: HashMap::new(),
        }
    }

    /// Stable identifier for this worker scope, used in logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn put(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Remove a binding, reporting whether it existed
    pub fn delete(&mut self, name: &str) -> bool {
        self.bindings.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Call a callable binding by name
    pub fn call(&mut self, name: &str, args: &[Value]) -> NimbusResult<Value> {
        let f = match self.bindings.get(name) {
            Some(Value::Callable(f)) => f.clone(),
            Some(_) => {
                return Err(NimbusError::execution(name, "binding is not callable"));
            }
            None => {
                return Err(NimbusError::execution(name, "no such binding"));
            }
        };
        f.call(self, args)
    }

    /// Revision of `key` whose top-level effects this scope has executed
    pub fn executed_revision(&self, key: &str) -> Option<u64> {
        self.executed.get(key).copied()
    }

    /// Record that this scope executed `key` at `revision`
    pub fn mark_executed(&mut self, key: impl Into<String>, revision: u64) {
        self.executed.insert(key.into(), revision);
    }

    /// Install transient request bindings, returning a guard that removes
    /// them on drop. Transient names must not collide with persistent
    /// bindings: release removes the name outright.
    pub fn bind_transients(&mut self, pairs: Vec<(String, Value)>) -> BoundScope<'_> {
        let mut keys = Vec::with_capacity(pairs.len());
        for (name, value) in pairs {
            self.bindings.insert(name.clone(), value);
            keys.push(name);
        }
        BoundScope { scope: self, keys }
    }
}

/// Guard holding a scope with transient bindings installed
///
/// Dropping the guard removes every transient binding, so one request's
/// request/response objects cannot leak into an unrelated request on the
/// same worker, whether the dispatch completed, failed or panicked.
#[derive(Debug)]
pub struct BoundScope<'a> {
    scope: &'a mut Scope,
    keys: Vec<String>,
}

impl BoundScope<'_> {
    /// The underlying scope, with transients bound
    pub fn scope(&mut self) -> &mut Scope {
        self.scope
    }

    /// Names installed by this binding
    pub fn bound_keys(&self) -> &[String] {
        &self.keys
    }
}

impl Drop for BoundScope<'_> {
    fn drop(&mut self) {
        for key in &self.keys {
            self.scope.bindings.remove(key);
        }
    }
}
