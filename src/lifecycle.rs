//! Request lifecycle: bind, dispatch, unbind
//!
//! A request runs `Idle → Bound → Dispatched → {Completed | Failed} →
//! Idle` against its worker's persistent scope. The controller installs
//! the transient request bindings, ensures the entry script is fresh,
//! invokes the configured entry function, and releases the transients on
//! every outcome so the worker can take an unrelated request next.

use crate::config::Config;
use crate::error::NimbusResult;
use crate::loader::ScriptLoader;
use crate::resource;
use crate::scope::Scope;
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info_span, warn};
use uuid::Uuid;

/// Phase of a request against its worker scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    Bound,
    Dispatched,
    Completed,
    Failed,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Bound => write!(f, "bound"),
            Self::Dispatched => write!(f, "dispatched"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Inbound request values handed over by the outer dispatch layer
///
/// The core treats these as opaque bound values; method, path and params
/// become scope bindings for the duration of the dispatch.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub params: Vec<(String, String)>,
    /// Additional request-scoped bindings (e.g. a response-writer handle)
    pub extras: Vec<(String, Value)>,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            params: Vec::new(),
            extras: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extras.push((name.into(), value));
        self
    }
}

/// Binds request state into worker scopes and runs the entry script
pub struct Dispatcher {
    loader: Arc<ScriptLoader>,
    entry_script: String,
    entry_function: String,
}

impl Dispatcher {
    /// Create a dispatcher for the configured entry point
    pub fn new(loader: Arc<ScriptLoader>, config: &Config) -> NimbusResult<Self> {
        config.validate()?;
        Ok(Self {
            loader,
            entry_script: resource::canonical(&config.paths.entry_script),
            entry_function: config.paths.entry_function.clone(),
        })
    }

    pub fn entry_script(&self) -> &str {
        &self.entry_script
    }

    /// Resolve and load the entry script into a worker scope ahead of
    /// the first request.
    ///
    /// Embedders call this at startup; an error here means the process
    /// cannot dispatch at all and should be treated as fatal rather
    /// than starting degraded.
    pub fn preload(&self, scope: &mut Scope) -> NimbusResult<()> {
        let (_, reloaded) = self.loader.load(&self.entry_script, scope)?;
        debug!(entry = %self.entry_script, reloaded, "entry script preloaded");
        Ok(())
    }

    /// Run one request to completion on the calling worker's scope.
    ///
    /// The transient bindings (`method`, `path`, `params` and any
    /// extras) are installed before dispatch and removed afterwards on
    /// every path out of this function, success, error or unwind.
    pub fn dispatch(&self, scope: &mut Scope, request: Request) -> NimbusResult<Value> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "dispatch",
            %request_id,
            method = %request.method,
            path = %request.path,
            worker = %scope.id(),
        );
        let _enter = span.enter();

        let mut params = IndexMap::new();
        for (name, value) in request.params {
            params.insert(name, Value::Str(value));
        }
        let mut transients: Vec<(String, Value)> = vec![
            ("method".to_string(), Value::Str(request.method)),
            ("path".to_string(), Value::Str(request.path)),
            ("params".to_string(), Value::Map(params)),
        ];
        transients.extend(request.extras);

        let mut bound = scope.bind_transients(transients);
        debug!(phase = %RequestPhase::Bound);

        let result = self.run(bound.scope());
        match &result {
            Ok(_) => debug!(phase = %RequestPhase::Completed),
            Err(e) => warn!(phase = %RequestPhase::Failed, error = %e),
        }
        // guard drop releases the transients; explicit here so the Idle
        // transition is visible in one place
        drop(bound);
        debug!(phase = %RequestPhase::Idle);
        result
    }

    fn run(&self, scope: &mut Scope) -> NimbusResult<Value> {
        let (unit, reloaded) = self.loader.load(&self.entry_script, scope)?;
        if reloaded {
            debug!(entry = %self.entry_script, "entry script (re)loaded in scope");
        }
        debug!(phase = %RequestPhase::Dispatched, function = %self.entry_function);
        self.loader
            .engine()
            .call(&unit, scope, &self.entry_function, &[])
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("entry_script", &self.entry_script)
            .field("entry_function", &self.entry_function)
            .finish_non_exhaustive()
    }
}
