/// Key-value persistence: the store abstraction, an in-memory store and
/// typed collections kept under a single key

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::model::Entity;

/// Keys used in the flat key-value namespace
pub mod keys {
    pub const PROFILES: &str = "profiles";
    pub const ACTIVE_PROFILE: &str = "activeProfile";
    pub const CURRENT_STATE: &str = "currentState";
    pub const ACTIVE_TAB: &str = "activeTab";
    pub const INSTANCES: &str = "instances";
    pub const CURRENT_INSTANCE: &str = "currentInstance";
    pub const BLOCKED_DOMAINS: &str = "blockedDomains";
    pub const REDIRECT_RULES: &str = "redirectRules";
}

/// Async get/set/remove by string key, last write wins
#[allow(async_fn_in_trait)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store, used outside the extension host and in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, Value>>,
    read_only: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write, as a full or revoked storage area would
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.set(read_only);
    }

    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }

    fn check_writable(&self, key: &str) -> Result<()> {
        if self.read_only.get() {
            return Err(Error::Storage(format!("store is read-only, cannot write '{key}'")));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.snapshot(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.check_writable(key)?;
        self.entries.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_writable(key)?;
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Ordered collection of entities stored as one array under one key
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T> {
    pub items: Vec<T>,
}

impl<T: Entity> Collection<T> {
    pub fn new() -> Self {
        Collection { items: Vec::new() }
    }

    /// Rebuild from whatever is stored. A non-object entry becomes an
    /// all-defaults entity; a non-array value reads as empty.
    pub fn normalize(raw: Option<&Value>, now: OffsetDateTime) -> Self {
        let empty = Map::new();
        let items = match raw {
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| T::normalize(entry.as_object().unwrap_or(&empty), now))
                .collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                log::warn!("Ignoring malformed {} collection: {}", T::KIND, other);
                Vec::new()
            }
        };
        Collection { items }
    }

    /// Entries handed over by the popup script, normalized like stored ones.
    /// Anything other than an array or null is rejected.
    pub fn from_loose_json(raw: &Value, now: OffsetDateTime) -> Result<Self> {
        match raw {
            Value::Array(_) | Value::Null => Ok(Collection::normalize(Some(raw), now)),
            other => Err(Error::validation(format!(
                "Expected a list of {} entries, got {}",
                T::KIND,
                other
            ))),
        }
    }

    /// Replace the entry with the same id and stamp it, or append.
    /// Returns true when an existing entry was replaced.
    pub fn upsert(&mut self, mut item: T, now: OffsetDateTime) -> bool {
        match self.items.iter().position(|i| i.id() == item.id()) {
            Some(index) => {
                item.touch(now);
                self.items[index] = item;
                true
            }
            None => {
                self.items.push(item);
                false
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let original_len = self.items.len();
        self.items.retain(|i| i.id() != id);
        self.items.len() < original_len
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|i| i.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.items.iter_mut().find(|i| i.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Entity> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn load_collection<T, S>(store: &S, key: &str, now: OffsetDateTime) -> Result<Collection<T>>
where
    T: Entity,
    S: KeyValueStore,
{
    let raw = store.get(key).await?;
    Ok(Collection::normalize(raw.as_ref(), now))
}

/// Always rewrites the whole collection
pub async fn save_collection<T, S>(store: &S, key: &str, collection: &Collection<T>) -> Result<()>
where
    T: Entity,
    S: KeyValueStore,
{
    store.set(key, serde_json::to_value(&collection.items)?).await
}

pub async fn load_pointer<S: KeyValueStore>(store: &S, key: &str) -> Result<Option<String>> {
    Ok(match store.get(key).await? {
        Some(Value::String(id)) if !id.is_empty() => Some(id),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

pub async fn save_pointer<S: KeyValueStore>(store: &S, key: &str, id: Option<&str>) -> Result<()> {
    match id {
        Some(id) => store.set(key, Value::String(id.to_string())).await,
        None => store.set(key, Value::Null).await,
    }
}

pub async fn save_value<S, V>(store: &S, key: &str, value: &V) -> Result<()>
where
    S: KeyValueStore,
    V: Serialize,
{
    store.set(key, serde_json::to_value(value)?).await
}
