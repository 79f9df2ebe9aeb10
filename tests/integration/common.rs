//! Shared test doubles: a counting in-memory resolver, a scripted mock
//! engine and a harness wiring them to the real cache, loader and
//! dispatcher.
#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use nimbus::cache::UnitCache;
use nimbus::clock::ManualClock;
use nimbus::config::Config;
use nimbus::engine::{CompiledUnit, RenderSink, ScriptEngine};
use nimbus::error::{NimbusError, NimbusResult};
use nimbus::lifecycle::Dispatcher;
use nimbus::loader::ScriptLoader;
use nimbus::resource::{canonical, ResourceResolver};
use nimbus::scope::Scope;
use nimbus::template::TemplateLoader;
use nimbus::value::{HostRegistry, Value};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

/// Initialize test logging once; `RUST_LOG` controls verbosity
pub fn init_logs() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// In-memory resolver that counts stat and open calls and lets tests
/// change timestamps and sources mid-run
#[derive(Default)]
pub struct FakeResolver {
    files: Mutex<HashMap<String, (DateTime<Utc>, String)>>,
    stats: AtomicUsize,
    opens: AtomicUsize,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, last_modified: DateTime<Utc>, source: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(canonical(path), (last_modified, source.to_string()));
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().unwrap().remove(&canonical(path));
    }

    pub fn stat_calls(&self) -> usize {
        self.stats.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl ResourceResolver for FakeResolver {
    fn stat(&self, path: &str) -> NimbusResult<Option<DateTime<Utc>>> {
        self.stats.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(&canonical(path))
            .map(|(ts, _)| *ts))
    }

    fn open(&self, path: &str) -> NimbusResult<Box<dyn Read + Send>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let logical = canonical(path);
        match self.files.lock().unwrap().get(&logical) {
            Some((_, source)) => Ok(Box::new(Cursor::new(source.clone().into_bytes()))),
            None => Err(NimbusError::ResourceNotFound(logical)),
        }
    }
}

/// Scripted engine: units carry their source as payload, execution
/// installs a `loaded:<name>` binding, calls echo function, path and
/// source. A source containing `COMPILE_FAIL` fails to compile; one
/// containing `RUN_FAIL` fails when called.
#[derive(Default)]
pub struct MockEngine {
    pub compiles: Mutex<Vec<String>>,
    pub executes: Mutex<Vec<String>>,
    pub renders: Mutex<Vec<String>>,
    /// Artificial compile latency for race tests
    pub compile_delay: Mutex<Option<std::time::Duration>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile_count(&self) -> usize {
        self.compiles.lock().unwrap().len()
    }

    pub fn compiled_names(&self) -> Vec<String> {
        self.compiles.lock().unwrap().clone()
    }

    pub fn compiles_of(&self, name: &str) -> usize {
        self.compiles
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    fn source_of(unit: &CompiledUnit) -> String {
        unit.payload::<String>()
            .map(|s| s.as_ref().clone())
            .unwrap_or_default()
    }
}

impl ScriptEngine for MockEngine {
    fn compile(&self, name: &str, source: &str) -> NimbusResult<Arc<CompiledUnit>> {
        if let Some(delay) = *self.compile_delay.lock().unwrap() {
            std::thread::sleep(delay);
        }
        self.compiles.lock().unwrap().push(name.to_string());
        if source.contains("COMPILE_FAIL") {
            return Err(NimbusError::compile(name, 1, "forced compile failure"));
        }
        Ok(Arc::new(CompiledUnit::new(
            name,
            Arc::new(source.to_string()),
        )))
    }

    fn execute(&self, unit: &CompiledUnit, scope: &mut Scope) -> NimbusResult<()> {
        self.executes.lock().unwrap().push(unit.name().to_string());
        scope.put(
            format!("loaded:{}", unit.name()),
            Value::Str(Self::source_of(unit)),
        );
        Ok(())
    }

    fn call(
        &self,
        unit: &CompiledUnit,
        scope: &mut Scope,
        function: &str,
        _args: &[Value],
    ) -> NimbusResult<Value> {
        let source = Self::source_of(unit);
        if source.contains("RUN_FAIL") {
            return Err(NimbusError::execution(unit.name(), "forced handler failure"));
        }
        let path = scope
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or("-")
            .to_string();
        Ok(Value::Str(format!("{function}@{path}:{source}")))
    }

    fn render(
        &self,
        unit: &CompiledUnit,
        _scope: &mut Scope,
        out: &mut dyn RenderSink,
        context: &Value,
    ) -> NimbusResult<()> {
        self.renders.lock().unwrap().push(unit.name().to_string());
        out.write_str(&format!(
            "[{}|{}]",
            Self::source_of(unit),
            context.to_json()
        ))
    }
}

/// Real cache/loader/templates/dispatcher over the test doubles
pub struct Harness {
    pub resolver: Arc<FakeResolver>,
    pub engine: Arc<MockEngine>,
    pub clock: Arc<ManualClock>,
    pub cache: Arc<UnitCache>,
    pub loader: Arc<ScriptLoader>,
    pub templates: Arc<TemplateLoader>,
    pub dispatcher: Dispatcher,
    pub hosts: HostRegistry,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        config.validate().expect("test config is valid");
        let resolver = Arc::new(FakeResolver::new());
        let engine = Arc::new(MockEngine::new());
        let clock = Arc::new(ManualClock::new(ts(0)));
        let cache = Arc::new(UnitCache::new(config.reload_window()));
        let loader = Arc::new(ScriptLoader::new(
            Arc::clone(&cache),
            Arc::clone(&resolver) as _,
            Arc::clone(&engine) as _,
            Arc::clone(&clock) as _,
        ));
        let templates = Arc::new(TemplateLoader::new(Arc::clone(&loader), &config.paths));
        let dispatcher =
            Dispatcher::new(Arc::clone(&loader), &config).expect("dispatcher config is valid");
        Self {
            resolver,
            engine,
            clock,
            cache,
            loader,
            templates,
            dispatcher,
            hosts: HostRegistry::with_builtins(),
        }
    }

    /// Fresh worker scope seeded with the built-in host functions
    pub fn scope(&self) -> Scope {
        Scope::new(&self.hosts)
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(Duration::seconds(secs));
    }
}
