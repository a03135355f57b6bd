//! Integration Tests for the Cache Engine
//!
//! Several threads, each with its own cache over one database file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;

use tablecache::cache::{KeyFunctionRegistry, Timeout};
use tablecache::config::CacheOptions;
use tablecache::{CacheError, CacheSettings, DatabaseCache};
use tempfile::TempDir;

const THREADS: usize = 8;

// == Helper Functions ==

fn settings() -> CacheSettings {
    CacheSettings {
        location: "shared cache".to_string(),
        options: CacheOptions {
            max_entries: 1000,
            cull_frequency: 0,
        },
        ..CacheSettings::default()
    }
}

fn database() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    // Create the table before threads race for it
    DatabaseCache::open(&path, &settings()).unwrap();
    (dir, path)
}

/// Runs `f` on `THREADS` threads released together, each with its own cache.
fn run_concurrently<T, F>(path: &Path, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize, &DatabaseCache) -> T + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(THREADS));
    let f = Arc::new(f);

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let barrier = barrier.clone();
            let f = f.clone();
            let path = path.to_path_buf();
            thread::spawn(move || {
                let cache = DatabaseCache::open(&path, &settings()).unwrap();
                barrier.wait();
                f(i, &cache)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

// == Concurrency Tests ==

#[test]
fn test_concurrent_add_has_exactly_one_winner() {
    let (_dir, path) = database();

    let results = run_concurrently(&path, |i, cache| {
        cache.add("contested", &i, Timeout::Default, None).unwrap()
    });

    assert_eq!(results.iter().filter(|added| **added).count(), 1);

    let winner = results.iter().position(|added| *added).unwrap();
    let cache = DatabaseCache::open(&path, &settings()).unwrap();
    assert_eq!(cache.get::<usize>("contested", None).unwrap(), Some(winner));
}

#[test]
fn test_concurrent_incr_loses_no_update() {
    let (_dir, path) = database();
    DatabaseCache::open(&path, &settings())
        .unwrap()
        .set("counter", &0, Timeout::Never, None)
        .unwrap();

    const INCREMENTS: usize = 25;
    run_concurrently(&path, |_, cache| {
        for _ in 0..INCREMENTS {
            cache.incr("counter", 1, None).unwrap();
        }
    });

    let cache = DatabaseCache::open(&path, &settings()).unwrap();
    assert_eq!(
        cache.get::<i64>("counter", None).unwrap(),
        Some((THREADS * INCREMENTS) as i64)
    );
}

#[test]
fn test_concurrent_set_many_is_atomic() {
    let (_dir, path) = database();

    run_concurrently(&path, |i, cache| {
        let entries: HashMap<String, usize> = (0..50).map(|k| (format!("k{}", k), i)).collect();
        cache.set_many(entries, Timeout::Default, None).unwrap();
    });

    // Every key was last written by the same batch
    let cache = DatabaseCache::open(&path, &settings()).unwrap();
    let keys: Vec<String> = (0..50).map(|k| format!("k{}", k)).collect();
    let found: HashMap<String, usize> = cache.get_many(keys.as_slice(), None).unwrap();
    assert_eq!(found.len(), 50);
    let first = found["k0"];
    assert!(found.values().all(|v| *v == first));
}

// == Shared Table Tests ==

#[test]
fn test_caches_sharing_a_table_stay_isolated() {
    let (_dir, path) = database();

    let plain = DatabaseCache::open(&path, &settings()).unwrap();
    let prefixed = DatabaseCache::open(
        &path,
        &CacheSettings {
            key_prefix: "other".to_string(),
            ..settings()
        },
    )
    .unwrap();
    let v2 = DatabaseCache::open(
        &path,
        &CacheSettings {
            version: 2,
            ..settings()
        },
    )
    .unwrap();

    let mut registry = KeyFunctionRegistry::new();
    registry.register("reversed", |key: &str, prefix: &str, version: i64| {
        format!("{}|{}|{}", key.chars().rev().collect::<String>(), prefix, version)
    });
    let custom = DatabaseCache::open_with_registry(
        &path,
        &CacheSettings {
            key_function: Some("reversed".to_string()),
            ..settings()
        },
        &registry,
    )
    .unwrap();

    for (n, cache) in [&plain, &prefixed, &v2, &custom].into_iter().enumerate() {
        cache.set("key", &n, Timeout::Default, None).unwrap();
    }
    for (n, cache) in [&plain, &prefixed, &v2, &custom].into_iter().enumerate() {
        assert_eq!(cache.get::<usize>("key", None).unwrap(), Some(n));
    }
    assert_eq!(plain.stats().unwrap().total_entries, 4);

    plain.delete("key", None).unwrap();
    assert!(prefixed.has_key("key", None).unwrap());
    assert!(v2.has_key("key", None).unwrap());
    assert!(custom.has_key("key", None).unwrap());
}

#[test]
fn test_incr_missing_key_across_caches() {
    let (_dir, path) = database();
    let writer = DatabaseCache::open(&path, &settings()).unwrap();
    let reader = DatabaseCache::open(&path, &settings()).unwrap();

    assert!(matches!(
        reader.incr("later", 1, None),
        Err(CacheError::NotFound(_))
    ));
    writer.set("later", &1, Timeout::Default, None).unwrap();
    assert_eq!(reader.incr("later", 1, None).unwrap(), 2);
}
