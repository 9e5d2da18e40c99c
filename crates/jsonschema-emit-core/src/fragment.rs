//! JSON-Schema fragments under construction.
//!
//! A [`Fragment`] is the JSON object produced for one schema node. Wherever a
//! child schema goes, the fragment holds a [`Slot::Node`] handle to the
//! child's visit record instead of a copy of its content. Handles are only
//! dereferenced when the final document is assembled, after hoisting has
//! rewritten some records into bare references, so a cyclic graph never needs
//! a cyclic value.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

/// Handle of a visit record in a generator session.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub(crate) u32);

impl RecordId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record#{}", self.0)
    }
}

/// A value position inside a fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Plain JSON data.
    Value(Value),
    /// The fragment of another visit record, resolved at assembly.
    Node(RecordId),
    List(Vec<Slot>),
    Map(BTreeMap<String, Slot>),
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Slot::Value(value)
    }
}

impl From<RecordId> for Slot {
    fn from(id: RecordId) -> Self {
        Slot::Node(id)
    }
}

impl From<&str> for Slot {
    fn from(s: &str) -> Self {
        Slot::Value(Value::String(s.to_string()))
    }
}

impl From<bool> for Slot {
    fn from(b: bool) -> Self {
        Slot::Value(Value::Bool(b))
    }
}

/// A JSON-Schema object whose child schemas may still be handles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    entries: BTreeMap<String, Slot>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fragment holding only `{"$ref": uri}`.
    pub fn reference(uri: impl Into<String>) -> Self {
        let mut fragment = Self::new();
        fragment.insert("$ref", Value::String(uri.into()));
        fragment
    }

    pub fn insert(&mut self, key: impl Into<String>, slot: impl Into<Slot>) -> Option<Slot> {
        self.entries.insert(key.into(), slot.into())
    }

    pub fn get(&self, key: &str) -> Option<&Slot> {
        self.entries.get(key)
    }

    /// The entry under `key` if it is plain data.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        match self.entries.get(key)? {
            Slot::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Slot> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when the fragment is a reference (`$ref` present).
    pub fn is_reference(&self) -> bool {
        self.entries.contains_key("$ref")
    }

    /// Shallow overlay: every entry of `other` replaces the entry of the same key.
    pub fn overlay(&mut self, other: &Fragment) {
        for (key, slot) in &other.entries {
            self.entries.insert(key.clone(), slot.clone());
        }
    }

    /// Shallow overlay of plain JSON annotations.
    pub fn overlay_map(&mut self, other: &Map<String, Value>) {
        for (key, value) in other {
            self.entries.insert(key.clone(), Slot::Value(value.clone()));
        }
    }
}

impl From<Map<String, Value>> for Fragment {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            entries: map.into_iter().map(|(k, v)| (k, Slot::Value(v))).collect(),
        }
    }
}
