// SPDX-License-Identifier: Apache-2.0

//! CRUD operation nodes.
//!
//! Every operation may carry a nested filter query. Routing derives the
//! owning drivers of an operation from that filter and from the fields the
//! operation references.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::element::{Element, Expression, Param};

/// Kind of a CRUD operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrudKind {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for CrudKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrudKind::Create => "create",
            CrudKind::Read => "read",
            CrudKind::Update => "update",
            CrudKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Join kinds a read may request from a backend.
///
/// Routers pass the kind through untouched; only the backend applies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Join {
    Inner,
    Left,
    LeftEx,
    Right,
    RightEx,
    #[default]
    Full,
    FullEx,
    Cross,
    SelfJoin,
    Natural,
    Union,
}

/// Ordered `field -> value` assignments of a create or update.
pub type Values = Vec<(String, Param)>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Create {
    pub name: Expression,
    pub values: Values,
    pub query: Option<Element>,
    pub alias: Option<String>,
}

impl Create {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Expression::new(name),
            values: Vec::new(),
            query: None,
            alias: None,
        }
    }

    pub fn value(mut self, field: impl Into<String>, value: impl Into<Param>) -> Self {
        self.values.push((field.into(), value.into()));
        self
    }

    pub fn query(mut self, query: impl Into<Element>) -> Self {
        self.query = Some(query.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Read {
    pub select: Vec<Element>,
    pub groupby: Vec<Element>,
    pub orderby: Vec<Element>,
    pub join: Option<Join>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub query: Option<Element>,
    pub alias: Option<String>,
}

impl Read {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, element: impl Into<Element>) -> Self {
        self.select.push(element.into());
        self
    }

    pub fn groupby(mut self, element: impl Into<Element>) -> Self {
        self.groupby.push(element.into());
        self
    }

    pub fn orderby(mut self, element: impl Into<Element>) -> Self {
        self.orderby.push(element.into());
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.join = Some(join);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Sets the nested filter.
    pub fn query(mut self, query: impl Into<Element>) -> Self {
        self.query = Some(query.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub name: Expression,
    pub values: Values,
    pub query: Option<Element>,
    pub alias: Option<String>,
}

impl Update {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Expression::new(name),
            values: Vec::new(),
            query: None,
            alias: None,
        }
    }

    pub fn value(mut self, field: impl Into<String>, value: impl Into<Param>) -> Self {
        self.values.push((field.into(), value.into()));
        self
    }

    pub fn query(mut self, query: impl Into<Element>) -> Self {
        self.query = Some(query.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Delete {
    pub names: Vec<Expression>,
    pub query: Option<Element>,
    pub alias: Option<String>,
}

impl Delete {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.names.push(Expression::new(name));
        self
    }

    pub fn query(mut self, query: impl Into<Element>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// One CRUD operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crud {
    Create(Create),
    Read(Read),
    Update(Update),
    Delete(Delete),
}

impl Crud {
    pub fn kind(&self) -> CrudKind {
        match self {
            Crud::Create(_) => CrudKind::Create,
            Crud::Read(_) => CrudKind::Read,
            Crud::Update(_) => CrudKind::Update,
            Crud::Delete(_) => CrudKind::Delete,
        }
    }

    /// Wraps a bare expression into the default read over it.
    pub fn read_of(query: impl Into<Element>) -> Crud {
        Crud::Read(Read {
            query: Some(query.into()),
            ..Read::default()
        })
    }

    pub fn query(&self) -> Option<&Element> {
        match self {
            Crud::Create(c) => c.query.as_ref(),
            Crud::Read(r) => r.query.as_ref(),
            Crud::Update(u) => u.query.as_ref(),
            Crud::Delete(d) => d.query.as_ref(),
        }
    }

    fn query_slot(&mut self) -> &mut Option<Element> {
        match self {
            Crud::Create(c) => &mut c.query,
            Crud::Read(r) => &mut r.query,
            Crud::Update(u) => &mut u.query,
            Crud::Delete(d) => &mut d.query,
        }
    }

    pub fn with_query(mut self, query: impl Into<Element>) -> Crud {
        *self.query_slot() = Some(query.into());
        self
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Crud::Create(c) => c.alias.as_deref(),
            Crud::Read(r) => r.alias.as_deref(),
            Crud::Update(u) => u.alias.as_deref(),
            Crud::Delete(d) => d.alias.as_deref(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Crud {
        let alias = Some(alias.into());
        match &mut self {
            Crud::Create(c) => c.alias = alias,
            Crud::Read(r) => r.alias = alias,
            Crud::Update(u) => u.alias = alias,
            Crud::Delete(d) => d.alias = alias,
        }
        self
    }

    pub fn ctx_name(&self) -> String {
        match self.alias() {
            Some(alias) => alias.to_string(),
            None => self.to_string(),
        }
    }

    /// Child nodes in routing order: the filter first, then the fields the
    /// operation touches.
    pub fn children(&self) -> Vec<&Element> {
        let mut children: Vec<&Element> = self.query().into_iter().collect();
        match self {
            Crud::Create(Create { values, .. }) | Crud::Update(Update { values, .. }) => {
                children.extend(values.iter().filter_map(|(_, value)| value.as_element()));
            }
            Crud::Read(r) => {
                children.extend(r.select.iter());
                children.extend(r.groupby.iter());
                children.extend(r.orderby.iter());
            }
            Crud::Delete(_) => {}
        }
        children
    }

    /// Field paths the operation targets directly (create/update name,
    /// delete names).
    pub fn targets(&self) -> Vec<&Expression> {
        match self {
            Crud::Create(c) => vec![&c.name],
            Crud::Update(u) => vec![&u.name],
            Crud::Delete(d) => d.names.iter().collect(),
            Crud::Read(_) => Vec::new(),
        }
    }

    pub fn for_each_expression_mut(&mut self, visit: &mut dyn FnMut(&mut Expression)) {
        if let Some(query) = self.query_slot() {
            query.for_each_expression_mut(visit);
        }
        match self {
            Crud::Create(Create { name, values, .. })
            | Crud::Update(Update { name, values, .. }) => {
                visit(name);
                for (_, value) in values.iter_mut() {
                    if let Param::Element(element) = value {
                        element.for_each_expression_mut(visit);
                    }
                }
            }
            Crud::Read(r) => {
                for element in r
                    .select
                    .iter_mut()
                    .chain(r.groupby.iter_mut())
                    .chain(r.orderby.iter_mut())
                {
                    element.for_each_expression_mut(visit);
                }
            }
            Crud::Delete(d) => d.names.iter_mut().for_each(|name| visit(name)),
        }
    }

    pub fn optimize(mut self) -> Crud {
        if let Some(query) = self.query_slot().take() {
            *self.query_slot() = Some(query.optimize());
        }
        self
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, label: &str, items: &[Element]) -> fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    write!(f, ", {label}=[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "]")
}

fn write_values(f: &mut fmt::Formatter<'_>, values: &Values) -> fmt::Result {
    write!(f, "{{")?;
    for (i, (field, value)) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{field}: {value}")?;
    }
    write!(f, "}}")
}

impl fmt::Display for Crud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind())?;
        match self {
            Crud::Create(Create { name, values, .. }) | Crud::Update(Update { name, values, .. }) => {
                write!(f, "{name}, ")?;
                write_values(f, values)?;
            }
            Crud::Read(r) => {
                write!(f, "*")?;
                write_list(f, "select", &r.select)?;
                write_list(f, "groupby", &r.groupby)?;
                write_list(f, "orderby", &r.orderby)?;
                if let Some(join) = r.join {
                    write!(f, ", join={join:?}")?;
                }
                if let Some(limit) = r.limit {
                    write!(f, ", limit={limit}")?;
                }
                if let Some(offset) = r.offset {
                    write!(f, ", offset={offset}")?;
                }
            }
            Crud::Delete(d) => {
                write!(f, "[")?;
                for (i, name) in d.names.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}")?;
                }
                write!(f, "]")?;
            }
        }
        if let Some(query) = self.query() {
            write!(f, ", where {query}")?;
        }
        write!(f, ")")
    }
}

impl From<Create> for Crud {
    fn from(value: Create) -> Self {
        Crud::Create(value)
    }
}

impl From<Read> for Crud {
    fn from(value: Read) -> Self {
        Crud::Read(value)
    }
}

impl From<Update> for Crud {
    fn from(value: Update) -> Self {
        Crud::Update(value)
    }
}

impl From<Delete> for Crud {
    fn from(value: Delete) -> Self {
        Crud::Delete(value)
    }
}
