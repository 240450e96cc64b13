// SPDX-License-Identifier: Apache-2.0

//! Query federation
//!
//! Splits a query tree into per-driver partitions and runs them through a
//! [`CompositeDriver`], which is itself a driver and can be nested.

pub mod partition;
pub mod resolve;
pub mod rewrite;
pub mod router;
pub mod types;

pub use partition::{plan, PlanNode};
pub use resolve::Resolver;
pub use rewrite::{localize, to_crud};
pub use router::CompositeDriver;
pub use types::{DriverSet, Ownership, PartitionEntry, PartitionStack};
