//! Tagged script values and host function registration
//!
//! Compiled units and host code exchange data through a single tagged
//! value type instead of reflection over engine-native objects. Host
//! functions are registered by name in a [`HostRegistry`] and seeded as
//! callable bindings into every new [`Scope`].

use crate::error::NimbusResult;
use crate::scope::Scope;
use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A script-visible value
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<Value>),
    /// Insertion-ordered map, the shape request params and render
    /// contexts travel in
    Map(IndexMap<String, Value>),
    Callable(HostFn),
    Handle(NativeHandle),
}

impl Value {
    /// Borrow the string payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric payload, if any
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean payload, if any
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Script truthiness: null, false, 0, NaN and "" are falsy
    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::List(_) | Self::Map(_) | Self::Callable(_) | Self::Handle(_) => true,
        }
    }

    /// Total conversion to JSON for logging and dumps. Callables and
    /// handles render as placeholder strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Self::Callable(f) => serde_json::Value::String(format!("<function {}>", f.name())),
            Self::Handle(h) => serde_json::Value::String(format!("<handle {}>", h.tag())),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            // callables and handles compare by identity
            (Self::Callable(a), Self::Callable(b)) => Arc::ptr_eq(&a.f, &b.f),
            (Self::Handle(a), Self::Handle(b)) => Arc::ptr_eq(&a.inner, &b.inner),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Self {
        Self::Map(v)
    }
}

type HostFnImpl = dyn Fn(&mut Scope, &[Value]) -> NimbusResult<Value> + Send + Sync;

/// A named host function callable from script code
#[derive(Clone)]
pub struct HostFn {
    name: Arc<str>,
    f: Arc<HostFnImpl>,
}

impl HostFn {
    /// Wrap a closure as a named host function
    pub fn new(
        name: impl Into<Arc<str>>,
        f: impl Fn(&mut Scope, &[Value]) -> NimbusResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function against the given scope
    pub fn call(&self, scope: &mut Scope, args: &[Value]) -> NimbusResult<Value> {
        (self.f)(scope, args)
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFn({})", self.name)
    }
}

/// An opaque host object passed through script code by reference
#[derive(Clone)]
pub struct NativeHandle {
    tag: Arc<str>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl NativeHandle {
    /// Wrap a host object under a descriptive tag
    pub fn new(tag: impl Into<Arc<str>>, inner: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            tag: tag.into(),
            inner,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Downcast back to the concrete host type
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({})", self.tag)
    }
}

/// Named host functions seeded into every new scope
#[derive(Clone, Default)]
pub struct HostRegistry {
    fns: IndexMap<String, HostFn>,
}

impl HostRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in log and escape helpers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("log", |_, args| {
            tracing::info!(target: "nimbus::script", "{}", dump(args));
            Ok(Value::Null)
        });
        registry.register("print", |_, args| {
            tracing::info!(target: "nimbus::script", "{}", dump(args));
            Ok(Value::Null)
        });
        registry.register("logwarn", |_, args| {
            tracing::warn!(target: "nimbus::script", "{}", dump(args));
            Ok(Value::Null)
        });
        registry.register("logerror", |_, args| {
            tracing::error!(target: "nimbus::script", "{}", dump(args));
            Ok(Value::Null)
        });
        registry.register("h", |_, args| match args.first() {
            None | Some(Value::Null) => Ok(Value::Str(String::new())),
            Some(Value::Str(s)) => Ok(Value::Str(html_escape(s))),
            Some(other) => Ok(Value::Str(html_escape(&dump(std::slice::from_ref(
                other,
            ))))),
        });
        registry
    }

    /// Register a host function under the given name, replacing any
    /// previous registration
    pub fn register(
        &mut self,
        name: &str,
        f: impl Fn(&mut Scope, &[Value]) -> NimbusResult<Value> + Send + Sync + 'static,
    ) {
        self.fns
            .insert(name.to_string(), HostFn::new(name, f));
    }

    pub fn get(&self, name: &str) -> Option<&HostFn> {
        self.fns.get(name)
    }

    /// Iterate registered functions in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HostFn)> {
        self.fns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }
}

impl fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRegistry")
            .field("fns", &self.fns.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Format call arguments for log output: a lone string passes through,
/// anything else renders as JSON
pub fn dump(args: &[Value]) -> String {
    match args {
        [] => String::new(),
        [Value::Str(s)] => s.clone(),
        [one] => one.to_json().to_string(),
        many => {
            serde_json::Value::Array(many.iter().map(Value::to_json).collect()).to_string()
        }
    }
}

/// HTML-escape a string for safe template output
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
