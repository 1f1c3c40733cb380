//! Flat, string-keyed network property bag.
//!
//! A [`PropertyStore`] maps dotted keys (see [`keys`]) to typed [`Value`]s.
//! Readers only ever consider interfaces listed under [`keys::INTERFACES`].
//!
//! # Example
//!
//! ```rust
//! use netadmin::properties::{PropertyStore, merge};
//!
//! let mut current = PropertyStore::new();
//! current.set_interface_names(["eth0", "wlan0"]);
//! current.insert("net.interface.wlan0.config.mtu", 1500);
//!
//! let mut update = PropertyStore::new();
//! update.set_interface_names(["eth0"]);
//! update.insert("net.interface.eth0.config.mtu", 1400);
//!
//! merge(&update, &mut current);
//! assert_eq!(current.interface_names(), vec!["eth0", "wlan0"]);
//! assert_eq!(current.get_int("net.interface.wlan0.config.mtu"), Some(1500));
//! ```

pub mod keys;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Borrow the value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::String(s) => f.write_str(s),
            Self::Bytes(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::Int(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// Flat mapping from dotted keys to values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyStore {
    map: BTreeMap<String, Value>,
}

impl PropertyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Get a value only if it is stored as a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(Value::as_str)
    }

    /// Get a value rendered as a string, whatever its stored type.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).map(ToString::to_string)
    }

    /// Get a boolean, accepting `"true"`/`"false"` strings.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.map.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get an integer, accepting decimal strings.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.map.get(key)? {
            Value::Int(i) => Some(*i),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.map.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.map.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.map.iter()
    }

    /// Iterate entries whose key starts with `prefix`.
    pub fn with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Value)> + 'a {
        self.map
            .range(prefix.to_string()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
    }

    /// Remove and return every entry whose key starts with `prefix`.
    pub fn remove_prefix(&mut self, prefix: &str) -> Vec<(String, Value)> {
        let keys: Vec<String> = self.with_prefix(prefix).map(|(k, _)| k.clone()).collect();
        keys.into_iter()
            .filter_map(|k| self.map.remove(&k).map(|v| (k, v)))
            .collect()
    }

    /// Interface names listed under `net.interfaces`, in listed order.
    pub fn interface_names(&self) -> Vec<String> {
        self.get_str(keys::INTERFACES)
            .map(split_list)
            .unwrap_or_default()
    }

    /// Replace the `net.interfaces` list.
    pub fn set_interface_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = names
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.insert(keys::INTERFACES, joined);
    }

    /// Copy of every `net.interface.<name>.*` entry.
    pub fn interface_properties(&self, name: &str) -> PropertyStore {
        let prefix = keys::interface_prefix(name);
        self.with_prefix(&prefix)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Split a comma-joined list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for PropertyStore {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for PropertyStore {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.map.insert(k.into(), v.into());
        }
    }
}

impl IntoIterator for PropertyStore {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.into_iter()
    }
}

/// Merge `source` into `dest`.
///
/// Every key of `source` overwrites `dest`; keys present only in `dest`
/// survive. `net.interfaces` becomes the union of both lists, `dest` order
/// first, so an interface absent from an update is never dropped.
pub fn merge(source: &PropertyStore, dest: &mut PropertyStore) {
    let mut names = dest.interface_names();
    for name in source.interface_names() {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    dest.extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
    dest.set_interface_names(&names);
}
