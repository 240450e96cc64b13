// SPDX-License-Identifier: Apache-2.0

// Reference drivers

pub mod eval;
pub mod function;
pub mod memory;

pub use function::{CrudHandler, FunctionDriver};
pub use memory::MemoryDriver;
