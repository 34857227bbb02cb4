//! Integration tests for Tincan Persist

use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;
use tincan_persist::storage::{FileStorage, MemoryStorage, Storage};
use tincan_persist::{
    batch, create_effect, use_persisted, use_persisted_with, PersistOptions, StorageError,
};

/// Memory storage that counts writes.
#[derive(Clone, Default)]
struct CountingStorage {
    inner: MemoryStorage,
    writes: Arc<AtomicUsize>,
}

impl CountingStorage {
    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Storage for CountingStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}

/// Memory storage that takes a while to write one particular value.
#[derive(Clone, Default)]
struct SlowStorage {
    inner: MemoryStorage,
}

impl Storage for SlowStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if value == "1" {
            thread::sleep(Duration::from_millis(300));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct AudioSettings {
    volume: u8,
    muted: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Preferences {
    name: String,
    settings: AudioSettings,
}

fn preferences() -> Preferences {
    Preferences {
        name: "test".to_string(),
        settings: AudioSettings {
            volume: 3,
            muted: false,
        },
    }
}

#[test]
fn theme_defaults_then_persists() {
    let storage = MemoryStorage::new();
    let (theme, set_theme) = use_persisted(storage.clone(), "theme", "light".to_string()).unwrap();

    assert_eq!(theme.get(), "light");
    assert_eq!(storage.get("theme").unwrap(), None);

    set_theme.set("dark".to_string());
    assert_eq!(theme.get(), "dark");
    assert_eq!(storage.get("theme").unwrap().as_deref(), Some("\"dark\""));
}

#[test]
fn stored_value_wins_over_default() {
    let storage = MemoryStorage::new();
    storage.set("counter", "5").unwrap();

    let (counter, _) = use_persisted(storage, "counter", 0).unwrap();
    assert_eq!(counter.get(), 5);
}

#[test]
fn stored_json_round_trips() {
    let value = serde_json::json!({
        "list": [1, 2.5, "three", null, true],
        "nested": { "empty": {}, "flag": false },
        "text": "ünïcödé"
    });
    let storage = MemoryStorage::new();
    storage
        .set("doc", &serde_json::to_string(&value).unwrap())
        .unwrap();

    let (doc, _) = use_persisted(storage.clone(), "doc", serde_json::Value::Null).unwrap();
    assert_eq!(doc.get(), value);

    doc.persist().unwrap();
    let stored: serde_json::Value =
        serde_json::from_str(&storage.get("doc").unwrap().unwrap()).unwrap();
    assert_eq!(stored, value);
}

#[test]
fn nested_update_writes_whole_object() {
    let storage = MemoryStorage::new();
    let (prefs, _) = use_persisted(storage.clone(), "prefs", preferences()).unwrap();

    prefs.update(|p| p.settings.volume = 10);

    let stored: Preferences = serde_json::from_str(&storage.get("prefs").unwrap().unwrap()).unwrap();
    assert_eq!(
        stored,
        Preferences {
            settings: AudioSettings {
                volume: 10,
                muted: false,
            },
            ..preferences()
        }
    );
}

#[test]
fn every_mutation_writes_once() {
    let storage = CountingStorage::default();
    let (count, set_count) = use_persisted(storage.clone(), "count", 0u32).unwrap();
    assert_eq!(storage.writes(), 0);

    set_count.set(1);
    count.set(2);
    count.update(|n| *n += 1);

    assert_eq!(storage.writes(), 3);
    assert_eq!(storage.get("count").unwrap().as_deref(), Some("3"));
}

#[test]
fn batched_mutations_write_last_value_once() {
    let storage = CountingStorage::default();
    let (count, set_count) = use_persisted(storage.clone(), "count", 0u32).unwrap();

    batch(|| {
        for n in 1..=10 {
            set_count.set(n);
        }
        assert_eq!(storage.writes(), 0);
    });

    assert_eq!(count.get(), 10);
    assert_eq!(storage.writes(), 1);
    assert_eq!(storage.get("count").unwrap().as_deref(), Some("10"));
}

#[test]
fn setter_keeps_persisting_after_cell_is_dropped() {
    let storage = MemoryStorage::new();
    let (cell, set_cell) = use_persisted(storage.clone(), "late", 0).unwrap();
    drop(cell);

    set_cell.set(9);
    assert_eq!(storage.get("late").unwrap().as_deref(), Some("9"));
}

#[test]
fn same_key_is_last_write_wins() {
    let storage = MemoryStorage::new();
    let (a, _) = use_persisted(storage.clone(), "shared", 0).unwrap();
    let (b, _) = use_persisted(storage.clone(), "shared", 0).unwrap();

    a.set(1);
    b.set(2);
    assert_eq!(storage.get("shared").unwrap().as_deref(), Some("2"));

    a.set(3);
    assert_eq!(storage.get("shared").unwrap().as_deref(), Some("3"));
    assert_eq!(b.get(), 2);
}

#[test]
fn effects_observe_persisted_cells() {
    let storage = MemoryStorage::new();
    let (volume, set_volume) = use_persisted(storage, "volume", 5u8).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let _effect = create_effect({
        let volume = volume.clone();
        let seen = Arc::clone(&seen);
        move || seen.lock().unwrap().push(volume.get())
    });

    set_volume.set(6);
    set_volume.update(|v| *v += 1);

    assert_eq!(*seen.lock().unwrap(), vec![5, 6, 7]);
}

#[test]
fn file_storage_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.json");

    {
        let storage = FileStorage::open(&path).unwrap();
        let (prefs, _) = use_persisted(storage, "prefs", preferences()).unwrap();
        prefs.update(|p| p.settings.muted = true);
    }

    let storage = FileStorage::open(&path).unwrap();
    let (prefs, _) = use_persisted(storage, "prefs", preferences()).unwrap();
    assert!(prefs.get().settings.muted);
    assert_eq!(prefs.get().settings.volume, 3);
}

#[test]
fn shared_storage_handle() {
    let storage = Arc::new(MemoryStorage::new());
    let options = PersistOptions::new().write_initial(true);

    let (_a, _) = use_persisted_with(Arc::clone(&storage), "a", 1, options).unwrap();
    let (_b, _) = use_persisted_with(Arc::clone(&storage), "b", 2, options).unwrap();

    assert_eq!(storage.len(), 2);
    assert_eq!(storage.get("b").unwrap().as_deref(), Some("2"));
}

#[test]
fn concurrent_writes_end_on_newest_value() {
    let storage = SlowStorage::default();
    let (count, set_count) = use_persisted(storage.clone(), "count", 0).unwrap();

    let slow_writer = thread::spawn({
        let set_count = set_count.clone();
        move || set_count.set(1)
    });

    thread::sleep(Duration::from_millis(100));
    set_count.set(2);
    slow_writer.join().unwrap();

    assert_eq!(count.get(), 2);
    assert_eq!(storage.get("count").unwrap().as_deref(), Some("2"));
}
