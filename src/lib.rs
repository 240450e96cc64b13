// SPDX-License-Identifier: Apache-2.0

// requester - federated query routing over heterogeneous drivers
// Core library

pub mod engine;
pub mod federation;
pub mod metrics;
pub mod observability;
pub mod request;

pub use engine::{
    Context, ContextKey, Driver, DriverExt, DriverRegistry, EngineError, EngineResult,
    RouteOptions, RouterConfig, Transaction, TransactionState,
};
pub use federation::{CompositeDriver, DriverSet, PartitionStack};
pub use request::Request;

pub use requester_query as query;
