//! Template loading, dependency resolution and rendering
//!
//! Templates reference other templates with inline directives; loading
//! one loads its whole dependency chain depth-first, so a dependent may
//! use a dependency's declarations the moment its own body compiles.
//! Compiled definitions are shared through the [`TemplateRegistry`];
//! per-render instances are never shared and live only inside a render
//! call.

mod directive;

use crate::cache::Freshness;
use crate::config::PathsConfig;
use crate::engine::{CompiledUnit, RenderSink};
use crate::error::{NimbusError, NimbusResult};
use crate::loader::ScriptLoader;
use crate::resource;
use crate::scope::Scope;
use crate::value::Value;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared compiled template definition
///
/// Distinct from any per-render instance: callers render through the
/// definition but never mutate it.
#[derive(Debug)]
pub struct TemplateDef {
    name: String,
    unit: Arc<CompiledUnit>,
    dependencies: Vec<String>,
}

impl TemplateDef {
    /// Template name, dot-separated (`"user.list"`)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &Arc<CompiledUnit> {
        &self.unit
    }

    /// Names this definition required loaded before its body compiled
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

/// Shared name→definition registry
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: DashMap<String, Arc<TemplateDef>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<TemplateDef>> {
        self.templates.get(name).map(|t| Arc::clone(t.value()))
    }

    /// Register a definition, overwriting any prior one for the name
    pub fn insert(&self, def: Arc<TemplateDef>) {
        self.templates.insert(def.name().to_string(), def);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Drop every definition (process shutdown and tests)
    pub fn clear(&self) {
        self.templates.clear();
    }
}

/// Loads template dependency chains and renders definitions
pub struct TemplateLoader {
    loader: Arc<ScriptLoader>,
    registry: TemplateRegistry,
    root: String,
    ext: String,
    cycle_skips: AtomicU64,
}

impl TemplateLoader {
    pub fn new(loader: Arc<ScriptLoader>, paths: &PathsConfig) -> Self {
        Self {
            loader,
            registry: TemplateRegistry::new(),
            root: resource::canonical(&paths.template_root),
            ext: paths.template_ext.clone(),
            cycle_skips: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Count of circular dependency edges skipped since startup
    pub fn cycle_skips(&self) -> u64 {
        self.cycle_skips.load(Ordering::Relaxed)
    }

    /// Logical resource path for a template name: dots become path
    /// separators under the template root
    pub fn template_path(&self, name: &str) -> String {
        format!("{}/{}.{}", self.root, name.replace('.', "/"), self.ext)
    }

    /// Load `name` and its dependency chain, returning the registered
    /// definition
    pub fn load(&self, name: &str, scope: &mut Scope) -> NimbusResult<Arc<TemplateDef>> {
        let mut visiting = HashSet::new();
        visiting.insert(name.to_string());
        self.load_inner(name, scope, &mut visiting)
    }

    fn load_inner(
        &self,
        name: &str,
        scope: &mut Scope,
        visiting: &mut HashSet<String>,
    ) -> NimbusResult<Arc<TemplateDef>> {
        let path = self.template_path(name);
        let cache = self.loader.cache();
        let resolver = self.loader.resolver();
        let clock = self.loader.clock();

        // reuse only when the source is fresh AND the definition is
        // registered; the registry can trail the cache after a clear
        if let Ok(Freshness::Fresh) = cache.freshness(&path, resolver.as_ref(), clock.as_ref())
        {
            if let Some(def) = self.registry.get(name) {
                return Ok(def);
            }
        }

        let last_modified = resolver
            .stat(&path)?
            .ok_or_else(|| NimbusError::TemplateNotFound {
                name: name.to_string(),
                path: path.clone(),
            })?;
        let source = match resource::read_to_string(resolver.as_ref(), &path) {
            Ok(source) => source,
            Err(NimbusError::ResourceNotFound(_)) => {
                return Err(NimbusError::TemplateNotFound {
                    name: name.to_string(),
                    path,
                })
            }
            Err(e) => return Err(e),
        };

        // depth-first: every dependency is registered before this body
        // compiles, so the body may reference its declarations
        let dependencies = directive::scan(&source);
        for dep in &dependencies {
            if visiting.contains(dep) {
                self.cycle_skips.fetch_add(1, Ordering::Relaxed);
                debug!(template = name, dependency = %dep, "ignoring circular template dependency");
                continue;
            }
            visiting.insert(dep.clone());
            let loaded = self.load_inner(dep, scope, visiting);
            visiting.remove(dep);
            loaded?;
        }

        info!(template = name, path = %path, "compiling template");
        let unit = self.loader.engine().compile(&path, &source)?;
        cache.replace(
            &path,
            last_modified,
            Arc::clone(&unit),
            dependencies.clone(),
            clock.as_ref(),
        );

        let def = Arc::new(TemplateDef {
            name: name.to_string(),
            unit,
            dependencies,
        });
        self.registry.insert(Arc::clone(&def));
        Ok(def)
    }

    /// Load `name` (refreshing it if stale) and render a fresh instance
    /// into the caller-supplied sink
    pub fn render(
        &self,
        name: &str,
        scope: &mut Scope,
        out: &mut dyn RenderSink,
        context: &Value,
    ) -> NimbusResult<()> {
        let def = self.load(name, scope)?;
        self.loader
            .engine()
            .render(def.unit(), scope, out, context)
    }
}

impl std::fmt::Debug for TemplateLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateLoader")
            .field("root", &self.root)
            .field("registered", &self.registry.len())
            .field("cycle_skips", &self.cycle_skips())
            .finish()
    }
}
