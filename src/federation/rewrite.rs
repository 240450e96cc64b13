// SPDX-License-Identifier: Apache-2.0

//! Per-driver rewriting of partition tops.

use requester_query::{Crud, Element};

/// The operation a partition top runs as: the CRUD itself, or a default read
/// filtered by the node.
pub fn to_crud(node: &Element) -> Crud {
    match node {
        Element::Crud(crud) => (**crud).clone(),
        other => Crud::read_of(other.clone()),
    }
}

/// Copy of `crud` whose field names are local to `driver`.
///
/// Only names carrying the `"<driver>."` prefix change. Running it twice for
/// the same driver gives the same result.
pub fn localize(crud: &Crud, driver: &str) -> Crud {
    let mut local = crud.clone();
    local.for_each_expression_mut(&mut |expr| expr.localize(driver));
    local
}
