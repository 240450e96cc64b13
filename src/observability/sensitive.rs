// SPDX-License-Identifier: Apache-2.0

use std::fmt::{self, Debug, Display, Formatter};

use requester_query::{Crud, Element, Expression, Param};
use serde::{Serialize, Serializer};

/// A wrapper for literal values that redacts them when formatted for logging.
/// To access the inner value, use the `.expose()` method.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Debug for Sensitive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T> Display for Sensitive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Serialize> Serialize for Sensitive<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("***")
    }
}

/// Renders a query node with every literal value redacted.
///
/// Field names and operators stay readable in logs, filter values do not.
pub struct Redacted<'a>(pub &'a Element);

impl Display for Redacted<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut masked = self.0.clone();
        mask_element(&mut masked);
        write!(f, "{}", masked)
    }
}

impl Debug for Redacted<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

fn mask_param(param: &mut Param) {
    match param {
        Param::Value(value) => {
            let redacted = Sensitive::new(value).to_string();
            *param = Param::Element(Expression::new(redacted).into());
        }
        Param::Element(element) => mask_element(element),
    }
}

fn mask_element(element: &mut Element) {
    match element {
        Element::Expression(_) => {}
        Element::Function(func) => func.params_mut().iter_mut().for_each(mask_param),
        Element::Crud(crud) => mask_crud(crud),
    }
}

fn mask_crud(crud: &mut Crud) {
    match crud {
        Crud::Create(create) => {
            create.values.iter_mut().for_each(|(_, p)| mask_param(p));
            create.query.iter_mut().for_each(mask_element);
        }
        Crud::Update(update) => {
            update.values.iter_mut().for_each(|(_, p)| mask_param(p));
            update.query.iter_mut().for_each(mask_element);
        }
        Crud::Read(read) => {
            for element in read
                .select
                .iter_mut()
                .chain(read.groupby.iter_mut())
                .chain(read.orderby.iter_mut())
                .chain(read.query.iter_mut())
            {
                mask_element(element);
            }
        }
        Crud::Delete(delete) => delete.query.iter_mut().for_each(mask_element),
    }
}
