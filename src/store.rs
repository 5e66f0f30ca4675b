use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, Weak},
    thread,
    time::Duration,
};
use tracing::warn;

type SubscriberFn = Arc<dyn Fn(Value) + Send + Sync>;

struct Subscriber {
    id: u64,
    key: String,
    callback: SubscriberFn,
}

struct HubInner {
    values: BTreeMap<String, Value>,
    path: Option<PathBuf>,
    persist_ok: bool,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: u64,
}

/// Shared key/value store with change notification.
///
/// Every clone of a `StoreHub` is one execution context on the same logical
/// state (the analog of a browser tab on the same origin). Writes persist to
/// the backing JSON file and are broadcast to all subscribers on the hub,
/// including subscribers registered from the writing context. `refresh`
/// picks up changes made to the backing file by other processes.
#[derive(Clone)]
pub struct StoreHub {
    inner: Arc<Mutex<HubInner>>,
}

/// Unsubscribe handle. Delivery stops when this is dropped.
pub struct Subscription {
    hub: Weak<Mutex<HubInner>>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
            guard.subscribers.retain(|s| s.id != self.id);
        }
    }
}

impl StoreHub {
    /// Hub with no backing file. State lives for the process only.
    pub fn in_memory() -> StoreHub {
        StoreHub::from_parts(BTreeMap::new(), None)
    }

    /// Hub backed by a JSON file. A missing file starts empty; a malformed
    /// one is logged and treated as empty rather than refusing to start.
    pub fn open(path: impl Into<PathBuf>) -> StoreHub {
        let path = path.into();
        let values = load_values(&path);
        StoreHub::from_parts(values, Some(path))
    }

    fn from_parts(values: BTreeMap<String, Value>, path: Option<PathBuf>) -> StoreHub {
        StoreHub {
            inner: Arc::new(Mutex::new(HubInner {
                values,
                path,
                persist_ok: true,
                subscribers: Vec::new(),
                next_subscriber_id: 0,
            })),
        }
    }

    /// Parsed stored value, or `default` if the key is absent or the stored
    /// JSON does not fit `T`. Never fails.
    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match guard.values.get(key) {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or(default),
            None => default,
        }
    }

    /// Serialize `value` under `key`, persist, then notify every subscriber
    /// of `key` on this hub. Persistence failures degrade the hub to
    /// memory-only for the rest of the session instead of propagating.
    pub fn write<T: Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!("store write for {key:?} could not be serialized: {e}");
                return;
            }
        };
        {
            let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            guard.values.insert(key.to_string(), value.clone());
            persist_locked(&mut guard);
        }
        self.broadcast(key, &value);
    }

    /// Register `callback` for every change to `key`, from this context,
    /// another context on the hub, or an external process seen via
    /// `refresh`. A removed key is delivered as `Value::Null`.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> Subscription
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = guard.next_subscriber_id;
        guard.next_subscriber_id += 1;
        guard.subscribers.push(Subscriber {
            id,
            key: key.to_string(),
            callback: Arc::new(callback),
        });
        Subscription {
            hub: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Typed `subscribe`: the callback receives the deserialized new value,
    /// or `default` when the key was removed or no longer parses as `T`.
    pub fn subscribe_with_default<T, F>(&self, key: &str, default: T, callback: F) -> Subscription
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe(key, move |value| {
            let parsed = if value.is_null() {
                default.clone()
            } else {
                serde_json::from_value(value).unwrap_or_else(|_| default.clone())
            };
            callback(parsed);
        })
    }

    /// Re-read the backing file and notify subscribers of every key whose
    /// value changed externally. This is the cross-process counterpart of
    /// the in-hub broadcast that `write` performs.
    ///
    /// Each write persists the whole map, so two processes writing the
    /// same backing file are last-writer-wins at whole-map granularity:
    /// a write here between another process's write and our next refresh
    /// overwrites that process's update. Per-key guarantees hold only
    /// within one hub.
    pub fn refresh(&self) {
        let changes: Vec<(String, Value)> = {
            let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let path = match &guard.path {
                Some(path) => path.clone(),
                None => return,
            };
            // A memory-only hub has state the file does not; never clobber it.
            if !guard.persist_ok || !path.is_file() {
                return;
            }
            let fresh = load_values(&path);
            let mut changes = Vec::new();
            for (key, value) in &fresh {
                if guard.values.get(key) != Some(value) {
                    changes.push((key.clone(), value.clone()));
                }
            }
            for key in guard.values.keys() {
                if !fresh.contains_key(key) {
                    changes.push((key.clone(), Value::Null));
                }
            }
            guard.values = fresh;
            changes
        };
        for (key, value) in changes {
            self.broadcast(&key, &value);
        }
    }

    /// Full copy of the persisted map, for the state endpoint.
    pub fn snapshot(&self) -> Value {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        serde_json::to_value(&guard.values).unwrap_or_else(|_| Value::Object(Default::default()))
    }

    // Callbacks run after the hub lock is released, so a subscriber may
    // read or write the store without deadlocking.
    fn broadcast(&self, key: &str, value: &Value) {
        let callbacks: Vec<SubscriberFn> = {
            let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            guard
                .subscribers
                .iter()
                .filter(|s| s.key == key)
                .map(|s| s.callback.clone())
                .collect()
        };
        for callback in callbacks {
            callback(value.clone());
        }
    }
}

fn load_values(path: &Path) -> BTreeMap<String, Value> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(_) => return BTreeMap::new(),
    };
    match serde_json::from_str::<BTreeMap<String, Value>>(&data) {
        Ok(values) => values,
        Err(e) => {
            warn!("malformed store file {}: {e}; starting empty", path.display());
            BTreeMap::new()
        }
    }
}

// Rewrites the whole map; concurrent writers on separate hubs clobber
// each other's keys (see `refresh`).
fn persist_locked(guard: &mut HubInner) {
    let path = match &guard.path {
        Some(path) if guard.persist_ok => path.clone(),
        _ => return,
    };
    let payload = match serde_json::to_string_pretty(&guard.values) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("store state could not be serialized: {e}");
            return;
        }
    };
    if let Err(e) = fs::write(&path, payload) {
        warn!(
            "store write to {} failed ({e}); continuing memory-only for this session",
            path.display()
        );
        guard.persist_ok = false;
    }
}

/// Poll the backing file for external changes on a fixed interval.
pub fn spawn_store_watcher(hub: StoreHub, interval_ms: u64) {
    thread::spawn(move || loop {
        thread::sleep(Duration::from_millis(interval_ms));
        hub.refresh();
    });
}
