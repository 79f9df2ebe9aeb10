//! Script/template engine collaborator interface
//!
//! The engine turns source text into compiled units and runs them
//! against a caller-supplied scope. nimbus never looks inside a unit:
//! the payload is engine-private, and the cache shares units across
//! workers as immutable values.

use crate::error::{NimbusError, NimbusResult};
use crate::scope::Scope;
use crate::value::Value;
use std::any::Any;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Immutable compiled artifact, opaque to the cache
pub struct CompiledUnit {
    name: String,
    payload: Arc<dyn Any + Send + Sync>,
}

impl CompiledUnit {
    /// Wrap an engine-private payload under the unit's source name
    pub fn new(name: impl Into<String>, payload: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Source name the unit was compiled from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Downcast the payload back to the engine's concrete type
    pub fn payload<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.payload).downcast::<T>().ok()
    }
}

impl fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Compiles and executes script and template source
pub trait ScriptEngine: Send + Sync {
    /// Compile source text into a unit. Failures carry the source name
    /// and position as a `Compile` error.
    fn compile(&self, name: &str, source: &str) -> NimbusResult<Arc<CompiledUnit>>;

    /// Run the unit's top-level side effects against the scope (binds
    /// top-level declarations into it)
    fn execute(&self, unit: &CompiledUnit, scope: &mut Scope) -> NimbusResult<()>;

    /// Invoke a function the unit exports
    fn call(
        &self,
        unit: &CompiledUnit,
        scope: &mut Scope,
        function: &str,
        args: &[Value],
    ) -> NimbusResult<Value>;

    /// Render a fresh instance of a compiled template definition into the
    /// sink. Must not mutate the shared definition: per-render state is
    /// constructed inside this call.
    fn render(
        &self,
        unit: &CompiledUnit,
        scope: &mut Scope,
        out: &mut dyn RenderSink,
        context: &Value,
    ) -> NimbusResult<()>;
}

/// Output writer supplied at render time, never cached
pub trait RenderSink {
    fn write_str(&mut self, s: &str) -> NimbusResult<()>;
}

/// Sink collecting rendered output into a string
#[derive(Debug, Default)]
pub struct StringSink {
    buf: String,
}

impl StringSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

impl RenderSink for StringSink {
    fn write_str(&mut self, s: &str) -> NimbusResult<()> {
        self.buf.push_str(s);
        Ok(())
    }
}

/// Sink adapter over any `io::Write` (e.g. a response body writer)
#[derive(Debug)]
pub struct IoSink<W: io::Write> {
    inner: W,
}

impl<W: io::Write> IoSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> RenderSink for IoSink<W> {
    fn write_str(&mut self, s: &str) -> NimbusResult<()> {
        self.inner
            .write_all(s.as_bytes())
            .map_err(|e| NimbusError::execution("render sink", e.to_string()))
    }
}
