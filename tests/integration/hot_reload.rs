//! Hot-reload behavior of the shared cache and loader: window-trusted
//! hits, reload on change, compile-failure fallback and concurrent
//! recompiles.

use crate::common::{ts, Harness};
use nimbus::error::NimbusError;
use nimbus::value::Value;
use std::sync::Arc;

const APP: &str = "/app/main.js";

#[test]
fn cache_stable_within_window() {
    let h = Harness::new(); // 5s window
    h.resolver.insert(APP, ts(100), "v1");
    let mut scope = h.scope();

    let (u1, reloaded) = h.loader.load(APP, &mut scope).unwrap();
    assert!(reloaded);
    assert_eq!(h.engine.compile_count(), 1);

    let stats = h.resolver.stat_calls();
    let opens = h.resolver.open_calls();

    // t=2s: within the window the same unit comes back with zero
    // additional resolver calls
    h.advance_secs(2);
    let (u2, reloaded) = h.loader.load(APP, &mut scope).unwrap();
    assert!(Arc::ptr_eq(&u1, &u2));
    assert!(!reloaded);
    assert_eq!(h.resolver.stat_calls(), stats);
    assert_eq!(h.resolver.open_calls(), opens);
    assert_eq!(h.engine.compile_count(), 1);
}

#[test]
fn window_elapsed_unchanged_costs_one_stat() {
    let h = Harness::new();
    h.resolver.insert(APP, ts(100), "v1");
    let mut scope = h.scope();

    let (u1, _) = h.loader.load(APP, &mut scope).unwrap();
    let stats = h.resolver.stat_calls();
    let opens = h.resolver.open_calls();

    h.advance_secs(6);
    let (u2, reloaded) = h.loader.load(APP, &mut scope).unwrap();
    assert!(Arc::ptr_eq(&u1, &u2));
    assert!(!reloaded);
    assert_eq!(h.resolver.stat_calls(), stats + 1);
    assert_eq!(h.resolver.open_calls(), opens);
    assert_eq!(h.engine.compile_count(), 1);

    // the stat refreshed the stamp: the next call is window-trusted again
    let stats = h.resolver.stat_calls();
    h.advance_secs(2);
    h.loader.load(APP, &mut scope).unwrap();
    assert_eq!(h.resolver.stat_calls(), stats);
}

#[test]
fn reload_on_change_after_window() {
    let h = Harness::new();
    h.resolver.insert(APP, ts(100), "v1");
    let mut scope = h.scope();

    let (u1, _) = h.loader.load(APP, &mut scope).unwrap();

    // t=6s: window elapsed and the resolver now reports a newer stamp
    h.advance_secs(6);
    h.resolver.insert(APP, ts(150), "v2");

    let (u2, reloaded) = h.loader.load(APP, &mut scope).unwrap();
    assert!(reloaded);
    assert!(!Arc::ptr_eq(&u1, &u2));
    assert_eq!(h.engine.compile_count(), 2);

    // subsequent calls observe the new unit's behavior, not the old
    assert_eq!(
        u2.payload::<String>().as_deref().map(String::as_str),
        Some("v2")
    );
    assert_eq!(
        scope.get(&format!("loaded:{APP}")),
        Some(&Value::from("v2"))
    );

    let (u3, reloaded) = h.loader.load(APP, &mut scope).unwrap();
    assert!(Arc::ptr_eq(&u2, &u3));
    assert!(!reloaded);
}

#[test]
fn shared_unit_executes_once_per_scope() {
    let h = Harness::new();
    h.resolver.insert(APP, ts(100), "v1");
    let mut first = h.scope();
    let mut second = h.scope();

    let (u1, _) = h.loader.load(APP, &mut first).unwrap();

    // second worker reuses the shared compile but must run the unit's
    // top-level effects in its own scope
    let (u2, reloaded) = h.loader.load(APP, &mut second).unwrap();
    assert!(Arc::ptr_eq(&u1, &u2));
    assert!(reloaded);
    assert_eq!(h.engine.compile_count(), 1);
    assert_eq!(h.engine.executes.lock().unwrap().len(), 2);
    assert!(second.get(&format!("loaded:{APP}")).is_some());

    // and only once per scope
    let (_, reloaded) = h.loader.load(APP, &mut second).unwrap();
    assert!(!reloaded);
    assert_eq!(h.engine.executes.lock().unwrap().len(), 2);
}

#[test]
fn compile_failure_keeps_last_good() {
    let h = Harness::new();
    h.resolver.insert(APP, ts(100), "v1");
    let mut scope = h.scope();

    let (u1, _) = h.loader.load(APP, &mut scope).unwrap();

    // a bad edit lands after the window
    h.advance_secs(6);
    h.resolver.insert(APP, ts(150), "v2 COMPILE_FAIL");

    let err = h.loader.load(APP, &mut scope).unwrap_err();
    assert!(matches!(err, NimbusError::Compile { .. }));
    assert!(err.keeps_last_good());

    // no cache poisoning: the shared entry still serves the prior unit
    let entry = h.cache.get(APP).unwrap();
    assert!(Arc::ptr_eq(entry.unit(), &u1));

    // and a subsequent load returns the prior valid unit instead of
    // hammering the broken source on every request
    h.advance_secs(1);
    let (u2, reloaded) = h.loader.load(APP, &mut scope).unwrap();
    assert!(Arc::ptr_eq(&u1, &u2));
    assert!(!reloaded);

    // once the window passes the loader tries again and surfaces the
    // same compile error
    h.advance_secs(6);
    assert!(h.loader.load(APP, &mut scope).is_err());
}

#[test]
fn fixed_source_recovers_after_failure() {
    let h = Harness::new();
    h.resolver.insert(APP, ts(100), "v1");
    let mut scope = h.scope();
    h.loader.load(APP, &mut scope).unwrap();

    h.advance_secs(6);
    h.resolver.insert(APP, ts(150), "v2 COMPILE_FAIL");
    h.loader.load(APP, &mut scope).unwrap_err();

    h.advance_secs(6);
    h.resolver.insert(APP, ts(200), "v3");
    let (unit, reloaded) = h.loader.load(APP, &mut scope).unwrap();
    assert!(reloaded);
    assert_eq!(
        unit.payload::<String>().as_deref().map(String::as_str),
        Some("v3")
    );
}

#[test]
fn missing_resource_surfaces() {
    let h = Harness::new();
    let mut scope = h.scope();

    let err = h.loader.load("/app/nope.js", &mut scope).unwrap_err();
    assert!(matches!(err, NimbusError::ResourceNotFound(_)));
    assert_eq!(h.engine.compile_count(), 0);
}

#[test]
fn vanished_resource_surfaces_but_keeps_entry() {
    let h = Harness::new();
    h.resolver.insert(APP, ts(100), "v1");
    let mut scope = h.scope();
    h.loader.load(APP, &mut scope).unwrap();

    h.advance_secs(6);
    h.resolver.remove(APP);

    let err = h.loader.load(APP, &mut scope).unwrap_err();
    assert!(matches!(err, NimbusError::ResourceNotFound(_)));
    // the shared entry is not evicted; the resource may reappear
    assert!(h.cache.get(APP).is_some());
}

#[test]
fn concurrent_stale_loads_compile_once() {
    let h = Harness::new();
    h.resolver.insert(APP, ts(100), "v1");
    let mut scope = h.scope();
    h.loader.load(APP, &mut scope).unwrap();

    // make the source stale and compilation slow enough to race
    h.advance_secs(6);
    h.resolver.insert(APP, ts(150), "v2");
    *h.engine.compile_delay.lock().unwrap() = Some(std::time::Duration::from_millis(50));

    let loader_a = Arc::clone(&h.loader);
    let loader_b = Arc::clone(&h.loader);
    let hosts = h.hosts.clone();
    let hosts_b = h.hosts.clone();

    let a = std::thread::spawn(move || {
        let mut scope = nimbus::scope::Scope::new(&hosts);
        loader_a.load(APP, &mut scope).unwrap();
    });
    let b = std::thread::spawn(move || {
        let mut scope = nimbus::scope::Scope::new(&hosts_b);
        loader_b.load(APP, &mut scope).unwrap();
    });
    a.join().unwrap();
    b.join().unwrap();

    // singleflight: the loser of the race reuses the winner's entry
    // instead of recompiling (1 initial + 1 reload)
    assert_eq!(h.engine.compile_count(), 2);
    assert_eq!(
        h.cache
            .get(APP)
            .unwrap()
            .unit()
            .payload::<String>()
            .as_deref()
            .map(String::as_str),
        Some("v2")
    );
}
