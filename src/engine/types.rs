// SPDX-License-Identifier: Apache-2.0

//! Shared data types for drivers, transactions and routing.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction lifecycle.
///
/// `Open -> Committing -> Committed | Failed`. Both final states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Open,
    Committing,
    Committed,
    Failed,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionState::Open => "open",
            TransactionState::Committing => "committing",
            TransactionState::Committed => "committed",
            TransactionState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Default schema search depth used by discovery.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Options for processing and routing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteOptions {
    /// Search driver schemas for names that are not driver-prefixed.
    pub discovery: bool,
    /// Accept several matching drivers for one name.
    pub many: bool,
    /// When set, forces both `discovery` and `many` to this value.
    pub besteffort: Option<bool>,
    /// Depth budget of a schema search (default: 3)
    pub maxdepth: usize,
    /// Ask drivers for a plan instead of executing.
    pub explain: bool,
    /// Run backend calls on spawned tasks.
    pub asynchronous: bool,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            discovery: false,
            many: false,
            besteffort: None,
            maxdepth: DEFAULT_MAX_DEPTH,
            explain: false,
            asynchronous: true,
        }
    }
}

impl RouteOptions {
    pub fn discovery(&self) -> bool {
        self.besteffort.unwrap_or(self.discovery)
    }

    pub fn many(&self) -> bool {
        self.besteffort.unwrap_or(self.many)
    }

    pub fn with_discovery(mut self, discovery: bool) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_many(mut self, many: bool) -> Self {
        self.many = many;
        self
    }

    pub fn with_besteffort(mut self, besteffort: bool) -> Self {
        self.besteffort = Some(besteffort);
        self
    }

    pub fn with_maxdepth(mut self, maxdepth: usize) -> Self {
        self.maxdepth = maxdepth;
        self
    }

    pub fn with_explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }

    pub fn synchronous(mut self) -> Self {
        self.asynchronous = false;
        self
    }
}

/// What a driver can do, reported for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DriverCapabilities {
    pub create: bool,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
    /// Exposes a schema graph through `children`.
    pub discovery: bool,
    pub explain: bool,
}

impl DriverCapabilities {
    pub fn all() -> Self {
        Self {
            create: true,
            read: true,
            update: true,
            delete: true,
            discovery: true,
            explain: true,
        }
    }
}

/// Driver metadata exposed for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverInfo {
    pub name: String,
    pub capabilities: DriverCapabilities,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn besteffort_forces_discovery_and_many() {
        let options = RouteOptions::default().with_besteffort(true);
        assert!(options.discovery());
        assert!(options.many());

        let strict = RouteOptions::default()
            .with_discovery(true)
            .with_many(true)
            .with_besteffort(false);
        assert!(!strict.discovery());
        assert!(!strict.many());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: RouteOptions = serde_json::from_str(r#"{"discovery": true}"#).unwrap();
        assert!(options.discovery);
        assert_eq!(options.maxdepth, DEFAULT_MAX_DEPTH);
        assert!(options.asynchronous);
    }
}
