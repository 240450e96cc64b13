// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the routing engine
//!
//! Driver failures, routing failures and transaction state violations all
//! surface as [`EngineError`] so callers get one error shape whatever backend
//! raised it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all engine operations
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum EngineError {
    #[error("no driver found for `{name}`")]
    DriverNotFound { name: String },

    #[error("too many drivers found for `{name}`: {}", drivers.join(", "))]
    AmbiguousDrivers { name: String, drivers: Vec<String> },

    #[error("no driver found to process `{node}`")]
    NoDriverForNode { node: String },

    #[error("Feature not supported: {message}")]
    NotSupported { message: String },

    #[error("Transaction error: {message}")]
    TransactionError { message: String },

    #[error("Execution error: {message}")]
    ExecutionError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    pub fn driver_not_found(name: impl Into<String>) -> Self {
        Self::DriverNotFound { name: name.into() }
    }

    pub fn ambiguous(name: impl Into<String>, drivers: Vec<String>) -> Self {
        Self::AmbiguousDrivers {
            name: name.into(),
            drivers,
        }
    }

    pub fn no_driver_for(node: impl Into<String>) -> Self {
        Self::NoDriverForNode { node: node.into() }
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported { message: msg.into() }
    }

    pub fn transaction_error(msg: impl Into<String>) -> Self {
        Self::TransactionError { message: msg.into() }
    }

    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError { message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    /// Routing failures, as opposed to backend or state failures.
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            Self::DriverNotFound { .. } | Self::AmbiguousDrivers { .. } | Self::NoDriverForNode { .. }
        )
    }
}

impl From<requester_query::QueryError> for EngineError {
    fn from(err: requester_query::QueryError) -> Self {
        Self::validation(err.to_string())
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_subject() {
        assert_eq!(
            EngineError::driver_not_found("ledger.total").to_string(),
            "no driver found for `ledger.total`"
        );
        let err = EngineError::ambiguous("sku", vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "too many drivers found for `sku`: a, b");
        assert!(err.is_routing());
        assert!(!EngineError::internal("boom").is_routing());
    }

    #[test]
    fn serializes_with_variant_tag() {
        let json = serde_json::to_value(EngineError::no_driver_for("x")).unwrap();
        assert_eq!(json["NoDriverForNode"]["node"], "x");
    }
}
