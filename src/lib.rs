//! nimbus - hot-reload compile/cache engine for dynamic scripts and templates
//!
//! Dispatches work to dynamically-loaded, dynamically-typed application
//! code whose source files can change on disk while the process keeps
//! running. For every logical resource name nimbus decides whether a
//! previously compiled unit is still valid, recompiles when the backing
//! resource changed, resolves template dependency chains, and manages the
//! per-worker execution environment that runs compiled code safely across
//! many requests.
//!
//! HTTP plumbing, routing, storage and the script engine itself are
//! collaborators behind narrow traits ([`resource::ResourceResolver`],
//! [`engine::ScriptEngine`], [`engine::RenderSink`]); this crate owns the
//! caching, freshness, dependency and lifecycle decisions between them.

pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod resource;
pub mod scope;
pub mod template;
pub mod value;

pub use error::{NimbusError, NimbusResult};
