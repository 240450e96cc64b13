// SPDX-License-Identifier: Apache-2.0

//! Types for the federation router.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered set of driver names, kept in registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverSet(Vec<String>);

impl DriverSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn single(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Inserts `name` keeping the order given by `rank` (lower first).
    pub fn insert_ranked(&mut self, name: &str, rank: impl Fn(&str) -> usize) {
        if self.contains(name) {
            return;
        }
        let position = self
            .0
            .iter()
            .position(|existing| rank(existing) > rank(name))
            .unwrap_or(self.0.len());
        self.0.insert(position, name.to_string());
    }

    pub fn union(&self, other: &DriverSet, rank: impl Fn(&str) -> usize) -> DriverSet {
        let mut merged = self.clone();
        for name in &other.0 {
            merged.insert_ranked(name, &rank);
        }
        merged
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|existing| existing == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DriverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.join(", "))
    }
}

/// Which drivers a subtree belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// Nothing routable below (literals, argument-less operators).
    Neutral,
    /// Every routable descendant shares this driver set.
    Owned(DriverSet),
    /// Descendants disagree; carries the union of all their drivers.
    Mixed(DriverSet),
}

impl Ownership {
    /// Bottom-up combination of two sibling ownerships.
    pub fn combine(self, other: Ownership, rank: impl Fn(&str) -> usize) -> Ownership {
        match (self, other) {
            (Ownership::Neutral, other) | (other, Ownership::Neutral) => other,
            (Ownership::Owned(a), Ownership::Owned(b)) if a == b => Ownership::Owned(a),
            (Ownership::Owned(a), Ownership::Owned(b))
            | (Ownership::Owned(a), Ownership::Mixed(b))
            | (Ownership::Mixed(a), Ownership::Owned(b))
            | (Ownership::Mixed(a), Ownership::Mixed(b)) => Ownership::Mixed(a.union(&b, rank)),
        }
    }

    /// Every driver involved, empty when neutral.
    pub fn drivers(&self) -> Option<&DriverSet> {
        match self {
            Ownership::Neutral => None,
            Ownership::Owned(set) | Ownership::Mixed(set) => Some(set),
        }
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, Ownership::Neutral)
    }
}

/// One partition: the drivers it runs on and the key of its top node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub drivers: DriverSet,
    pub top: String,
}

/// Partitions entered during a descent.
///
/// `active` holds partitions whose workers are still running; once joined
/// they move to `dispatched` in launch order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStack {
    active: Vec<PartitionEntry>,
    dispatched: Vec<PartitionEntry>,
}

impl PartitionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, drivers: DriverSet, top: impl Into<String>) {
        self.active.push(PartitionEntry {
            drivers,
            top: top.into(),
        });
    }

    /// Closes every active partition.
    pub fn leave_all(&mut self) {
        self.dispatched.append(&mut self.active);
    }

    pub fn active(&self) -> &[PartitionEntry] {
        &self.active
    }

    pub fn dispatched(&self) -> &[PartitionEntry] {
        &self.dispatched
    }

    pub fn depth(&self) -> usize {
        self.active.len()
    }
}
