// SPDX-License-Identifier: Apache-2.0

// Engine Module
// Driver contract, transactions and the per-request context

pub mod config;
pub mod context;
pub mod drivers;
pub mod error;
pub mod registry;
pub mod traits;
pub mod transaction;
pub mod types;

pub use config::RouterConfig;
pub use context::{Context, ContextKey};
pub use error::{EngineError, EngineResult};
pub use registry::DriverRegistry;
pub use traits::{Driver, DriverExt, ProcessCallback, ProcessHandle, Processed};
pub use transaction::Transaction;
pub use types::*;
