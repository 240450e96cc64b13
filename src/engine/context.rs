// SPDX-License-Identifier: Apache-2.0

//! Per-request result store.
//!
//! Slots are keyed by the canonical name of a query node, never by object
//! identity, so a copied node finds the results of its original.

use std::collections::BTreeMap;

use requester_query::{Crud, Element, Expression, Function, Value};
use serde::{Deserialize, Serialize};

/// Anything that names a context slot.
pub trait ContextKey {
    fn ctx_key(&self) -> String;
}

impl ContextKey for str {
    fn ctx_key(&self) -> String {
        self.to_string()
    }
}

impl ContextKey for String {
    fn ctx_key(&self) -> String {
        self.clone()
    }
}

impl ContextKey for Element {
    fn ctx_key(&self) -> String {
        self.ctx_name()
    }
}

impl ContextKey for Crud {
    fn ctx_key(&self) -> String {
        self.ctx_name()
    }
}

impl ContextKey for Expression {
    fn ctx_key(&self) -> String {
        self.alias()
            .map(str::to_string)
            .unwrap_or_else(|| self.to_string())
    }
}

impl ContextKey for Function {
    fn ctx_key(&self) -> String {
        self.alias()
            .map(str::to_string)
            .unwrap_or_else(|| self.to_string())
    }
}

/// Mapping `canonical node name -> accumulated values`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    slots: BTreeMap<String, Vec<Value>>,
    /// Slot lengths inherited from the parent at fork time.
    #[serde(skip)]
    inherited: BTreeMap<String, usize>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has<K: ContextKey + ?Sized>(&self, key: &K) -> bool {
        self.slots.contains_key(&key.ctx_key())
    }

    pub fn get<K: ContextKey + ?Sized>(&self, key: &K) -> Option<&[Value]> {
        self.slots.get(&key.ctx_key()).map(Vec::as_slice)
    }

    /// Replaces a slot.
    pub fn set<K: ContextKey + ?Sized>(&mut self, key: &K, values: Vec<Value>) {
        let key = key.ctx_key();
        self.inherited.remove(&key);
        self.slots.insert(key, values);
    }

    /// Appends to a slot, creating it when absent.
    pub fn append<K: ContextKey + ?Sized>(&mut self, key: &K, values: impl IntoIterator<Item = Value>) {
        self.slots
            .entry(key.ctx_key())
            .or_default()
            .extend(values);
    }

    pub fn delete<K: ContextKey + ?Sized>(&mut self, key: &K) -> Option<Vec<Value>> {
        let key = key.ctx_key();
        self.inherited.remove(&key);
        self.slots.remove(&key)
    }

    /// Folds `other` into `self`.
    ///
    /// Keys absent here are copied; an identical key concatenates, ours
    /// first. Keys are compared exactly, so `"b"` never touches `"a.b"`.
    pub fn merge(&mut self, other: Context) {
        for (key, values) in other.slots {
            self.slots.entry(key).or_default().extend(values);
        }
    }

    /// Exact key when present, else every more specific `*.key` slot in key
    /// order.
    pub fn lookup<K: ContextKey + ?Sized>(&self, key: &K) -> Vec<Value> {
        let key = key.ctx_key();
        if let Some(values) = self.slots.get(&key) {
            return values.clone();
        }
        let suffix = format!(".{key}");
        self.slots
            .iter()
            .filter(|(name, _)| name.ends_with(&suffix))
            .flat_map(|(_, values)| values.iter().cloned())
            .collect()
    }

    /// Copy whose current slots count as inherited.
    pub fn fork(&self) -> Context {
        Context {
            slots: self.slots.clone(),
            inherited: self
                .slots
                .iter()
                .map(|(key, values)| (key.clone(), values.len()))
                .collect(),
        }
    }

    /// Keeps only what was produced since [`Context::fork`].
    pub fn detach(self) -> Context {
        let Context {
            slots,
            inherited,
        } = self;
        let slots = slots
            .into_iter()
            .filter_map(|(key, mut values)| match inherited.get(&key) {
                Some(&base) if base >= values.len() => None,
                Some(&base) => Some((key, values.split_off(base))),
                None => Some((key, values)),
            })
            .collect();
        Context {
            slots,
            inherited: BTreeMap::new(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<Value>)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, Vec<Value>)>>(iter: I) -> Self {
        Context {
            slots: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            inherited: BTreeMap::new(),
        }
    }
}
