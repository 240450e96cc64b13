// SPDX-License-Identifier: Apache-2.0

//! Query trees for the requester federation engine.
//!
//! Trees are built with [`builder`], rendered canonically through `Display`
//! and routed by the root crate. Nothing in here is async.

pub mod builder;
pub mod crud;
pub mod element;
pub mod error;
pub mod value;

pub use builder::{call, field, func, try_field};
pub use crud::{Create, Crud, CrudKind, Delete, Join, Read, Update, Values};
pub use element::{Element, Expression, FuncName, Function, Param};
pub use error::{QueryError, QueryResult};
pub use value::Value;
