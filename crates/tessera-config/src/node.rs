//! Observable configuration containers.
//!
//! A loaded configuration is a tree of [`ConfigMap`] and [`ConfigList`]
//! nodes holding [`Value`]s. Every container has a single parent slot. A
//! mutation on any node notifies that node, which forwards the notification
//! to its parent, and so on up to the root. The root's parent slot may hold
//! a [`Propagate`] sink (such as the write-back sink installed by
//! [`sync`](crate::sync)), which terminates the chain.
//!
//! Children refer to their parent container weakly and a root owns its sink,
//! so the ownership graph stays a tree. Attaching a container beneath itself
//! is rejected with [`ConfigError::CyclicAttach`].
//!
//! # Example
//!
//! ```
//! use tessera_config::{ConfigMap, Value};
//!
//! # fn main() -> Result<(), tessera_config::ConfigError> {
//! let root = ConfigMap::from_plain(&serde_json::json!({
//!     "database": {"host": "127.0.0.1", "port": 3306}
//! }))?;
//!
//! assert_eq!(root.lookup("database.port"), Some(Value::Int(3306)));
//!
//! root.set_path("database.port", 3307)?;
//! assert_eq!(root.dump()["database"]["port"], 3307);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map as JsonMap, Number, Value as Json};

use crate::ConfigError;

/// Receiver of change notifications.
///
/// Containers implement this by forwarding to their own parent; a sink
/// installed at the root implements it by reacting to the change (for
/// example by persisting the tree).
pub trait Propagate: Send + Sync {
    /// Called after a mutation somewhere below this receiver.
    fn notify(&self) -> Result<(), ConfigError>;
}

#[derive(Clone, Default)]
enum Parent {
    #[default]
    Detached,
    Map(Weak<MapInner>),
    List(Weak<ListInner>),
    Sink(Arc<dyn Propagate>),
}

impl Parent {
    fn notify(&self) -> Result<(), ConfigError> {
        match self {
            Parent::Detached => Ok(()),
            Parent::Map(weak) => weak.upgrade().map_or(Ok(()), |map| map.notify()),
            Parent::List(weak) => weak.upgrade().map_or(Ok(()), |list| list.notify()),
            Parent::Sink(sink) => sink.notify(),
        }
    }

    fn container(&self) -> Option<Container> {
        match self {
            Parent::Map(weak) => weak.upgrade().map(Container::Map),
            Parent::List(weak) => weak.upgrade().map(Container::List),
            Parent::Detached | Parent::Sink(_) => None,
        }
    }
}

/// A live container in a parent chain.
enum Container {
    Map(Arc<MapInner>),
    List(Arc<ListInner>),
}

impl Container {
    fn parent(&self) -> Parent {
        match self {
            Container::Map(map) => map.parent.lock().clone(),
            Container::List(list) => list.parent.lock().clone(),
        }
    }

    fn is(&self, value: &Value) -> bool {
        match (self, value) {
            (Container::Map(a), Value::Map(b)) => Arc::ptr_eq(a, &b.inner),
            (Container::List(a), Value::List(b)) => Arc::ptr_eq(a, &b.inner),
            _ => false,
        }
    }

    /// Fails if `child` is this container or one of its ancestors.
    fn check_attach(self, child: &Value) -> Result<(), ConfigError> {
        if !child.is_container() {
            return Ok(());
        }
        let mut current = Some(self);
        while let Some(node) = current {
            if node.is(child) {
                return Err(ConfigError::CyclicAttach);
            }
            current = node.parent().container();
        }
        Ok(())
    }
}

struct MapInner {
    entries: RwLock<IndexMap<String, Value>>,
    parent: Mutex<Parent>,
}

impl Propagate for MapInner {
    fn notify(&self) -> Result<(), ConfigError> {
        let parent = self.parent.lock().clone();
        parent.notify()
    }
}

struct ListInner {
    items: RwLock<Vec<Value>>,
    parent: Mutex<Parent>,
}

impl Propagate for ListInner {
    fn notify(&self) -> Result<(), ConfigError> {
        let parent = self.parent.lock().clone();
        parent.notify()
    }
}

/// A configuration value: a scalar or a shared handle to a container.
///
/// Cloning a container variant clones the handle, not the contents.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent or explicit null.
    #[default]
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Integer above `i64::MAX`.
    UInt(u64),
    /// Floating point scalar.
    Float(f64),
    /// String scalar.
    Str(String),
    /// Observable sequence.
    List(ConfigList),
    /// Observable mapping.
    Map(ConfigMap),
}

impl Value {
    /// Materialize plain data into a detached value tree.
    pub fn from_plain(raw: &Json) -> Self {
        materialize(raw)
    }

    /// Recursively snapshot this value into plain data.
    pub fn to_plain(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::Number((*i).into()),
            Value::UInt(u) => Json::Number((*u).into()),
            Value::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::Str(s) => Json::String(s.clone()),
            Value::List(list) => list.dump(),
            Value::Map(map) => map.dump(),
        }
    }

    /// Short name of the runtime kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::UInt(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "sequence",
            Value::Map(_) => "mapping",
        }
    }

    /// Returns `true` for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns `true` for map and list values.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Map(_) | Value::List(_))
    }

    /// The string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The integer, if this is an integer that fits `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// The integer, if this is a non-negative integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(i) => u64::try_from(*i).ok(),
            Value::UInt(u) => Some(*u),
            _ => None,
        }
    }

    /// The number as a float; integers are widened.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The boolean, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The map handle, if this is a map.
    pub fn as_map(&self) -> Option<&ConfigMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The list handle, if this is a list.
    pub fn as_list(&self) -> Option<&ConfigList> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    fn set_parent(&self, parent: Parent) {
        match self {
            Value::Map(map) => *map.inner.parent.lock() = parent,
            Value::List(list) => *list.inner.parent.lock() = parent,
            _ => {}
        }
    }

    /// Clear the parent slot if it still points at `owner`.
    fn release_from(&self, owner: &Parent) {
        let slot = match self {
            Value::Map(map) => &map.inner.parent,
            Value::List(list) => &list.inner.parent,
            _ => return,
        };
        let mut parent = slot.lock();
        let same = match (&*parent, owner) {
            (Parent::Map(a), Parent::Map(b)) => a.ptr_eq(b),
            (Parent::List(a), Parent::List(b)) => a.ptr_eq(b),
            _ => false,
        };
        if same {
            *parent = Parent::Detached;
        }
    }
}

impl Value {
    /// Returns `true` if both values are the same container handle.
    fn same_handle(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::List(_) | Value::Map(_) => write!(f, "{}", self.to_plain()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        i64::try_from(u).map_or(Value::UInt(u), Value::Int)
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<ConfigMap> for Value {
    fn from(map: ConfigMap) -> Self {
        Value::Map(map)
    }
}

impl From<ConfigList> for Value {
    fn from(list: ConfigList) -> Self {
        Value::List(list)
    }
}

impl From<Json> for Value {
    fn from(raw: Json) -> Self {
        materialize(&raw)
    }
}

/// Untyped materialization of plain data.
///
/// Sequences become [`ConfigList`]s, mappings become [`ConfigMap`]s with
/// every child parented to its container, and scalars pass through. This
/// never fails.
pub fn materialize(raw: &Json) -> Value {
    match raw {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_u64().map(Value::UInt))
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        Json::String(s) => Value::Str(s.clone()),
        Json::Array(items) => {
            let list = ConfigList::new();
            for item in items {
                list.push_silent(materialize(item));
            }
            Value::List(list)
        }
        Json::Object(entries) => {
            let map = ConfigMap::new();
            for (key, value) in entries {
                map.insert_silent(key.clone(), materialize(value));
            }
            Value::Map(map)
        }
    }
}

/// An observable mapping from string keys to [`Value`]s.
///
/// Reads never notify. Every write mutates the mapping and then notifies
/// once, forwarding the notification up the parent chain. Keys keep their
/// insertion order so that re-serialization is stable.
#[derive(Clone)]
pub struct ConfigMap {
    inner: Arc<MapInner>,
}

impl Default for ConfigMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigMap {
    /// Create an empty, detached map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MapInner {
                entries: RwLock::new(IndexMap::new()),
                parent: Mutex::new(Parent::Detached),
            }),
        }
    }

    /// Materialize a plain mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDocument`] if `raw` is not a mapping.
    pub fn from_plain(raw: &Json) -> Result<Self, ConfigError> {
        match materialize(raw) {
            Value::Map(map) => Ok(map),
            other => Err(ConfigError::InvalidDocument { found: other.kind() }),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Returns `true` if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.entries.read().contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.read().keys().cloned().collect()
    }

    /// Snapshot of the entries in insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.inner
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.entries.read().get(key).cloned()
    }

    /// String stored under `key`.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.inner
            .entries
            .read()
            .get(key)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Integer stored under `key`.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.inner.entries.read().get(key).and_then(Value::as_i64)
    }

    /// Number stored under `key`, widened to a float.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.inner.entries.read().get(key).and_then(Value::as_f64)
    }

    /// Boolean stored under `key`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.inner.entries.read().get(key).and_then(Value::as_bool)
    }

    /// Nested map stored under `key`.
    pub fn get_map(&self, key: &str) -> Option<ConfigMap> {
        self.inner
            .entries
            .read()
            .get(key)
            .and_then(|v| v.as_map().cloned())
    }

    /// Nested list stored under `key`.
    pub fn get_list(&self, key: &str) -> Option<ConfigList> {
        self.inner
            .entries
            .read()
            .get(key)
            .and_then(|v| v.as_list().cloned())
    }

    /// Follow a dotted path such as `database.replicas.0.host`.
    ///
    /// Numeric segments index into lists.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut current = Value::Map(self.clone());
        for segment in path.split('.') {
            current = match &current {
                Value::Map(map) => map.get(segment)?,
                Value::List(list) => list.get(segment.parse().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Insert `value` under `key`, returning the previous value.
    ///
    /// A container value is re-parented to this map.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CyclicAttach`] if `value` is this map or one of
    /// its ancestors, or any error raised by the notification chain.
    pub fn insert(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, ConfigError> {
        let value = value.into();
        Container::Map(self.inner.clone()).check_attach(&value)?;
        let previous = {
            let mut entries = self.inner.entries.write();
            value.set_parent(self.as_parent());
            entries.insert(key.into(), value)
        };
        if let Some(old) = &previous {
            self.release(old);
        }
        self.notify()?;
        Ok(previous)
    }

    /// Assign the value at a dotted path.
    ///
    /// Every segment but the last must already lead to a container; the last
    /// segment is a key (maps) or an in-range index (lists).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PathNotFound`] if the containing node does not
    /// exist, plus the errors of [`ConfigMap::insert`] and [`ConfigList::set`].
    pub fn set_path(&self, path: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let (container, last) = match path.rsplit_once('.') {
            Some((prefix, last)) => (
                self.lookup(prefix)
                    .ok_or_else(|| ConfigError::PathNotFound {
                        path: prefix.to_string(),
                    })?,
                last,
            ),
            None => (Value::Map(self.clone()), path),
        };
        match container {
            Value::Map(map) => map.insert(last, value).map(|_| ()),
            Value::List(list) => {
                let index = last.parse().map_err(|_| ConfigError::PathNotFound {
                    path: path.to_string(),
                })?;
                list.set(index, value).map(|_| ())
            }
            _ => Err(ConfigError::PathNotFound {
                path: path.to_string(),
            }),
        }
    }

    /// Remove `key`, returning its value. Notifies only if the key existed.
    pub fn remove(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        let removed = self.inner.entries.write().shift_remove(key);
        match removed {
            Some(value) => {
                self.release(&value);
                self.notify()?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Insert many entries with a single notification.
    pub fn update<K, V, I>(&self, entries: I) -> Result<(), ConfigError>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries: Vec<(String, Value)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        for (_, value) in &entries {
            Container::Map(self.inner.clone()).check_attach(value)?;
        }
        let replaced: Vec<Value> = {
            let mut map = self.inner.entries.write();
            entries
                .into_iter()
                .filter_map(|(key, value)| {
                    value.set_parent(self.as_parent());
                    map.insert(key, value)
                })
                .collect()
        };
        for old in &replaced {
            self.release(old);
        }
        self.notify()
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<(), ConfigError> {
        let drained: Vec<Value> = self.inner.entries.write().drain(..).map(|(_, v)| v).collect();
        for value in &drained {
            self.release(value);
        }
        self.notify()
    }

    /// Return the value under `key`, inserting `default` first if absent.
    ///
    /// Notifies only when an insertion happens.
    pub fn get_or_insert(
        &self,
        key: &str,
        default: impl Into<Value>,
    ) -> Result<Value, ConfigError> {
        if let Some(existing) = self.get(key) {
            return Ok(existing);
        }
        let value = default.into();
        self.insert(key, value.clone())?;
        Ok(value)
    }

    /// Recursively snapshot this map into plain data.
    pub fn dump(&self) -> Json {
        let entries = self.inner.entries.read();
        let mut out = JsonMap::with_capacity(entries.len());
        for (key, value) in entries.iter() {
            out.insert(key.clone(), value.to_plain());
        }
        Json::Object(out)
    }

    /// Forward a change notification up the parent chain.
    pub fn notify(&self) -> Result<(), ConfigError> {
        self.inner.notify()
    }

    /// Install `sink` as this map's parent, replacing any previous parent.
    pub fn set_sink(&self, sink: Arc<dyn Propagate>) {
        *self.inner.parent.lock() = Parent::Sink(sink);
    }

    /// Clear this map's parent slot, stopping propagation above it.
    pub fn detach(&self) {
        *self.inner.parent.lock() = Parent::Detached;
    }

    /// Returns `true` if the parent slot is occupied.
    pub fn has_parent(&self) -> bool {
        !matches!(*self.inner.parent.lock(), Parent::Detached)
    }

    /// Returns `true` if both handles refer to the same map.
    pub fn ptr_eq(&self, other: &ConfigMap) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakConfigMap {
        WeakConfigMap(Arc::downgrade(&self.inner))
    }

    pub(crate) fn insert_silent(&self, key: String, value: Value) {
        value.set_parent(self.as_parent());
        self.inner.entries.write().insert(key, value);
    }

    fn as_parent(&self) -> Parent {
        Parent::Map(Arc::downgrade(&self.inner))
    }

    /// Detach `old` unless this map still holds the same handle elsewhere.
    fn release(&self, old: &Value) {
        if !old.is_container() {
            return;
        }
        let still_held = self
            .inner
            .entries
            .read()
            .values()
            .any(|value| value.same_handle(old));
        if !still_held {
            old.release_from(&self.as_parent());
        }
    }
}

impl PartialEq for ConfigMap {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.dump() == other.dump()
    }
}

impl fmt::Debug for ConfigMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConfigMap").field(&self.dump()).finish()
    }
}

/// Non-owning handle to a [`ConfigMap`], held by sinks.
#[derive(Clone)]
pub(crate) struct WeakConfigMap(Weak<MapInner>);

impl WeakConfigMap {
    pub(crate) fn upgrade(&self) -> Option<ConfigMap> {
        self.0.upgrade().map(|inner| ConfigMap { inner })
    }
}

/// An observable sequence of [`Value`]s.
///
/// Same propagation contract as [`ConfigMap`]: every mutating operation
/// notifies once after the change.
#[derive(Clone)]
pub struct ConfigList {
    inner: Arc<ListInner>,
}

impl Default for ConfigList {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigList {
    /// Create an empty, detached list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ListInner {
                items: RwLock::new(Vec::new()),
                parent: Mutex::new(Parent::Detached),
            }),
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    /// Returns `true` if the list has no items.
    pub fn is_empty(&self) -> bool {
        self.inner.items.read().is_empty()
    }

    /// Item at `index`.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.items.read().get(index).cloned()
    }

    /// Snapshot of the items.
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.read().clone()
    }

    /// Returns `true` if an equal value is present.
    pub fn contains(&self, value: &Value) -> bool {
        self.inner.items.read().iter().any(|item| item == value)
    }

    /// Replace the item at `index`, returning the previous item.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<Value, ConfigError> {
        let value = value.into();
        Container::List(self.inner.clone()).check_attach(&value)?;
        let previous = {
            let mut items = self.inner.items.write();
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(ConfigError::IndexOutOfBounds { index, len })?;
            value.set_parent(self.as_parent());
            std::mem::replace(slot, value)
        };
        self.release(&previous);
        self.notify()?;
        Ok(previous)
    }

    /// Append an item.
    pub fn push(&self, value: impl Into<Value>) -> Result<(), ConfigError> {
        let value = value.into();
        Container::List(self.inner.clone()).check_attach(&value)?;
        self.push_silent(value);
        self.notify()
    }

    /// Insert an item at `index`, shifting later items right.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<(), ConfigError> {
        let value = value.into();
        Container::List(self.inner.clone()).check_attach(&value)?;
        {
            let mut items = self.inner.items.write();
            if index > items.len() {
                return Err(ConfigError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            value.set_parent(self.as_parent());
            items.insert(index, value);
        }
        self.notify()
    }

    /// Remove the first item equal to `value`.
    pub fn remove(&self, value: &Value) -> Result<Value, ConfigError> {
        let removed = {
            let mut items = self.inner.items.write();
            let index = items
                .iter()
                .position(|item| item == value)
                .ok_or(ConfigError::ValueNotFound)?;
            items.remove(index)
        };
        self.release(&removed);
        self.notify()?;
        Ok(removed)
    }

    /// Remove and return the last item, if any. Notifies only on removal.
    pub fn pop(&self) -> Result<Option<Value>, ConfigError> {
        let popped = self.inner.items.write().pop();
        match popped {
            Some(value) => {
                self.release(&value);
                self.notify()?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Remove and return the item at `index`.
    pub fn pop_at(&self, index: usize) -> Result<Value, ConfigError> {
        let removed = {
            let mut items = self.inner.items.write();
            if index >= items.len() {
                return Err(ConfigError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            items.remove(index)
        };
        self.release(&removed);
        self.notify()?;
        Ok(removed)
    }

    /// Remove every item.
    pub fn clear(&self) -> Result<(), ConfigError> {
        let drained: Vec<Value> = self.inner.items.write().drain(..).collect();
        for value in &drained {
            self.release(value);
        }
        self.notify()
    }

    /// Append many items with a single notification.
    pub fn extend<V, I>(&self, values: I) -> Result<(), ConfigError>
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        for value in &values {
            Container::List(self.inner.clone()).check_attach(value)?;
        }
        {
            let mut items = self.inner.items.write();
            for value in values {
                value.set_parent(self.as_parent());
                items.push(value);
            }
        }
        self.notify()
    }

    /// Reverse the items in place.
    pub fn reverse(&self) -> Result<(), ConfigError> {
        self.inner.items.write().reverse();
        self.notify()
    }

    /// Recursively snapshot this list into plain data.
    pub fn dump(&self) -> Json {
        Json::Array(self.inner.items.read().iter().map(Value::to_plain).collect())
    }

    /// Forward a change notification up the parent chain.
    pub fn notify(&self) -> Result<(), ConfigError> {
        self.inner.notify()
    }

    /// Returns `true` if both handles refer to the same list.
    pub fn ptr_eq(&self, other: &ConfigList) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn push_silent(&self, value: Value) {
        value.set_parent(self.as_parent());
        self.inner.items.write().push(value);
    }

    fn as_parent(&self) -> Parent {
        Parent::List(Arc::downgrade(&self.inner))
    }

    /// Detach `old` unless this list still holds the same handle elsewhere.
    fn release(&self, old: &Value) {
        if !old.is_container() {
            return;
        }
        let still_held = self
            .inner
            .items
            .read()
            .iter()
            .any(|item| item.same_handle(old));
        if !still_held {
            old.release_from(&self.as_parent());
        }
    }
}

impl PartialEq for ConfigList {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.dump() == other.dump()
    }
}

impl fmt::Debug for ConfigList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConfigList").field(&self.dump()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        hits: AtomicUsize,
    }

    impl CountingSink {
        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    impl Propagate for CountingSink {
        fn notify(&self) -> Result<(), ConfigError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn watched(raw: Json) -> (ConfigMap, Arc<CountingSink>) {
        let root = ConfigMap::from_plain(&raw).unwrap();
        let sink = Arc::new(CountingSink::default());
        root.set_sink(sink.clone());
        (root, sink)
    }

    #[test]
    fn test_materialize_structure() {
        let value = materialize(&json!({"a": [1, {"b": "x"}], "c": 1.5, "d": null}));
        let map = value.as_map().unwrap();
        assert_eq!(map.get_list("a").unwrap().len(), 2);
        assert_eq!(map.lookup("a.1.b"), Some(Value::from("x")));
        assert_eq!(map.get_f64("c"), Some(1.5));
        assert_eq!(map.get("d"), Some(Value::Null));
    }

    #[test]
    fn test_reads_do_not_notify() {
        let (root, sink) = watched(json!({"section": {"field": 1}}));
        let _ = root.get("section");
        let _ = root.lookup("section.field");
        let _ = root.dump();
        assert_eq!(sink.hits(), 0);
    }

    #[test]
    fn test_nested_mutation_reaches_root() {
        let (root, sink) = watched(json!({"section": {"items": [1, 2]}}));
        let items = root.lookup("section.items").unwrap();
        items.as_list().unwrap().push(3).unwrap();
        assert_eq!(sink.hits(), 1);
        assert_eq!(root.dump()["section"]["items"], json!([1, 2, 3]));
    }

    #[test]
    fn test_update_notifies_once() {
        let (root, sink) = watched(json!({}));
        root.update([("a", 1), ("b", 2), ("c", 3)]).unwrap();
        assert_eq!(sink.hits(), 1);
        assert_eq!(root.keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_list_operations_each_notify() {
        let (root, sink) = watched(json!({"l": [3, 1, 2]}));
        let list = root.get_list("l").unwrap();

        list.set(0, 4).unwrap();
        list.insert(0, 0).unwrap();
        list.remove(&Value::Int(1)).unwrap();
        list.pop().unwrap();
        list.extend([7, 8]).unwrap();
        list.reverse().unwrap();
        list.pop_at(0).unwrap();
        list.clear().unwrap();

        assert_eq!(sink.hits(), 8);
        assert!(list.is_empty());
    }

    #[test]
    fn test_list_index_errors() {
        let list = ConfigList::new();
        assert!(matches!(
            list.set(0, 1),
            Err(ConfigError::IndexOutOfBounds { index: 0, len: 0 })
        ));
        assert!(matches!(list.remove(&Value::Int(9)), Err(ConfigError::ValueNotFound)));
        assert_eq!(list.pop().unwrap(), None);
    }

    #[test]
    fn test_restoring_same_subtree_keeps_it_attached() {
        let (root, sink) = watched(json!({"section": {"field": 1}}));
        let section = root.get("section").unwrap();

        root.insert("section", section.clone()).unwrap();
        section.as_map().unwrap().insert("field", 2).unwrap();

        assert_eq!(sink.hits(), 2);
        assert_eq!(root.dump(), json!({"section": {"field": 2}}));
    }

    #[test]
    fn test_moved_subtree_keeps_propagating() {
        let (root, sink) = watched(json!({"old": {"field": 1}}));
        let section = root.get("old").unwrap();

        root.insert("new", section.clone()).unwrap();
        root.remove("old").unwrap();
        section.as_map().unwrap().insert("field", 2).unwrap();

        assert_eq!(sink.hits(), 3);
        assert_eq!(root.dump(), json!({"new": {"field": 2}}));
    }

    #[test]
    fn test_list_keeps_aliased_item_attached() {
        let (root, sink) = watched(json!({"l": [{"v": 1}]}));
        let list = root.get_list("l").unwrap();
        let item = list.get(0).unwrap();

        list.push(item.clone()).unwrap();
        list.pop_at(0).unwrap();
        list.set(0, item.clone()).unwrap();
        item.as_map().unwrap().insert("v", 2).unwrap();

        assert_eq!(sink.hits(), 4);
        assert_eq!(root.dump(), json!({"l": [{"v": 2}]}));
    }

    #[test]
    fn test_large_unsigned_integers_survive_dump() {
        let root = ConfigMap::from_plain(&json!({"id": u64::MAX, "x": 1})).unwrap();
        assert_eq!(root.get("id"), Some(Value::UInt(u64::MAX)));
        assert_eq!(root.get("id").unwrap().kind(), "integer");
        assert_eq!(root.dump(), json!({"id": u64::MAX, "x": 1}));
        assert_eq!(Value::from(7_u64), Value::Int(7));
    }

    #[test]
    fn test_inserted_subtree_is_reparented() {
        let (root, sink) = watched(json!({}));
        let child = ConfigMap::new();
        root.insert("child", child.clone()).unwrap();
        assert_eq!(sink.hits(), 1);

        child.insert("x", true).unwrap();
        assert_eq!(sink.hits(), 2);
        assert_eq!(root.dump(), json!({"child": {"x": true}}));
    }

    #[test]
    fn test_removed_subtree_stops_propagating() {
        let (root, sink) = watched(json!({"child": {"x": 1}}));
        let child = root.remove("child").unwrap().unwrap();
        assert_eq!(sink.hits(), 1);

        child.as_map().unwrap().insert("x", 2).unwrap();
        assert_eq!(sink.hits(), 1);
    }

    #[test]
    fn test_cyclic_attach_rejected() {
        let root = ConfigMap::from_plain(&json!({"a": {"b": {}}})).unwrap();
        let inner = root.lookup("a.b").unwrap();
        let result = inner.as_map().unwrap().insert("loop", root.clone());
        assert!(matches!(result, Err(ConfigError::CyclicAttach)));

        let result = root.insert("self", root.clone());
        assert!(matches!(result, Err(ConfigError::CyclicAttach)));
    }

    #[test]
    fn test_set_path() {
        let root = ConfigMap::from_plain(&json!({"db": {"hosts": ["a", "b"]}})).unwrap();
        root.set_path("db.hosts.1", "c").unwrap();
        root.set_path("db.port", 5432).unwrap();
        assert_eq!(root.dump(), json!({"db": {"hosts": ["a", "c"], "port": 5432}}));

        assert!(matches!(
            root.set_path("missing.key", 1),
            Err(ConfigError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_get_or_insert() {
        let (root, sink) = watched(json!({"a": 1}));
        assert_eq!(root.get_or_insert("a", 5).unwrap(), Value::Int(1));
        assert_eq!(sink.hits(), 0);
        assert_eq!(root.get_or_insert("b", 5).unwrap(), Value::Int(5));
        assert_eq!(sink.hits(), 1);
    }

    #[test]
    fn test_remove_missing_key_is_silent() {
        let (root, sink) = watched(json!({"a": 1}));
        assert_eq!(root.remove("zzz").unwrap(), None);
        assert_eq!(sink.hits(), 0);
    }

    #[test]
    fn test_detach_stops_propagation() {
        let (root, sink) = watched(json!({"a": 1}));
        root.detach();
        root.insert("a", 2).unwrap();
        assert_eq!(sink.hits(), 0);
        assert!(!root.has_parent());
    }

    #[test]
    fn test_non_mapping_document_rejected() {
        let err = ConfigMap::from_plain(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDocument { found: "sequence" }));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::from(json!({"a": 1})).to_string(), r#"{"a":1}"#);
    }
}
