// SPDX-License-Identifier: Apache-2.0

//! Expression tree nodes.
//!
//! Trees are plain values: built once through the builder API and never
//! mutated afterwards. Routing copies a tree before rewriting it for a
//! specific driver.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crud::Crud;
use crate::value::Value;

/// Operator set understood by drivers, plus driver-provided calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuncName {
    And,
    Or,
    Not,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Like,
    Neg,
    Abs,
    In,
    Between,
    IsNull,
    Exists,
    Avg,
    Count,
    Max,
    Min,
    Sum,
    Concat,
    Length,
    Upper,
    Lower,
    Trim,
    Substring,
    Replace,
    Round,
    Now,
    Year,
    Month,
    Cast,
    /// A backend function addressed by dotted path (e.g. `inventory.reindex`).
    Call(String),
}

impl FuncName {
    pub fn symbol(&self) -> &str {
        match self {
            FuncName::And => "&",
            FuncName::Or => "|",
            FuncName::Not => "~",
            FuncName::Eq => "==",
            FuncName::Ne => "!=",
            FuncName::Gt => ">",
            FuncName::Ge => ">=",
            FuncName::Lt => "<",
            FuncName::Le => "<=",
            FuncName::Add => "+",
            FuncName::Sub => "-",
            FuncName::Mul => "*",
            FuncName::Div => "/",
            FuncName::Pow => "**",
            FuncName::Like => "%",
            FuncName::Neg => "neg",
            FuncName::Abs => "abs",
            FuncName::In => "in",
            FuncName::Between => "between",
            FuncName::IsNull => "isnull",
            FuncName::Exists => "exists",
            FuncName::Avg => "avg",
            FuncName::Count => "count",
            FuncName::Max => "max",
            FuncName::Min => "min",
            FuncName::Sum => "sum",
            FuncName::Concat => "concat",
            FuncName::Length => "length",
            FuncName::Upper => "upper",
            FuncName::Lower => "lower",
            FuncName::Trim => "trim",
            FuncName::Substring => "substring",
            FuncName::Replace => "replace",
            FuncName::Round => "round",
            FuncName::Now => "now",
            FuncName::Year => "year",
            FuncName::Month => "month",
            FuncName::Cast => "cast",
            FuncName::Call(path) => path,
        }
    }

    /// Built-in operators never identify a backend by themselves.
    pub fn is_operator(&self) -> bool {
        !matches!(self, FuncName::Call(_))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, FuncName::And | FuncName::Or)
    }

    fn is_infix(&self) -> bool {
        matches!(
            self,
            FuncName::And
                | FuncName::Or
                | FuncName::Eq
                | FuncName::Ne
                | FuncName::Gt
                | FuncName::Ge
                | FuncName::Lt
                | FuncName::Le
                | FuncName::Add
                | FuncName::Sub
                | FuncName::Mul
                | FuncName::Div
                | FuncName::Pow
                | FuncName::Like
        )
    }
}

/// Leaf referencing a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expression {
    name: String,
    alias: Option<String>,
    /// Driver the name was localized for; `None` until rewritten.
    scope: Option<String>,
}

impl Expression {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            scope: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// `field("car").child("wheel")` is `field("car.wheel")`.
    pub fn child(&self, segment: &str) -> Expression {
        if self.name.is_empty() {
            Expression::new(segment)
        } else {
            Expression::new(format!("{}.{}", self.name, segment))
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.name.split('.').filter(|s| !s.is_empty())
    }

    /// Strips the `"<driver>."` prefix so the backend sees a local name.
    ///
    /// A name equal to the driver name becomes the empty (root) path.
    /// Rewriting twice for the same driver is a no-op.
    pub fn localize(&mut self, driver: &str) {
        if self.scope.as_deref() == Some(driver) {
            return;
        }
        if self.name == driver {
            self.name.clear();
        } else if let Some(rest) = self
            .name
            .strip_prefix(driver)
            .and_then(|rest| rest.strip_prefix('.'))
        {
            self.name = rest.to_string();
        } else {
            return;
        }
        self.scope = Some(driver.to_string());
    }

    /// Forgets which driver last rewrote this name, so the next router
    /// strips its own prefix.
    pub fn clear_scope(&mut self) {
        self.scope = None;
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Operator application over ordered parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    name: FuncName,
    params: Vec<Param>,
    alias: Option<String>,
}

impl Function {
    pub fn new(name: FuncName, params: Vec<Param>) -> Self {
        Self {
            name,
            params,
            alias: None,
        }
    }

    pub fn name(&self) -> &FuncName {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Vec<Param> {
        &mut self.params
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Flattens nested AND/OR applications of the same operator.
    ///
    /// `AND(AND(a, b), c)` becomes `AND(a, b, c)`. Other operators only have
    /// their parameters optimized.
    pub fn optimize(self) -> Function {
        let Function {
            name,
            params,
            alias,
        } = self;
        let mut flattened = Vec::with_capacity(params.len());
        for param in params {
            match param {
                Param::Element(Element::Function(inner)) => {
                    let inner = inner.optimize();
                    if name.is_boolean() && inner.name == name && inner.alias.is_none() {
                        flattened.extend(inner.params);
                    } else {
                        flattened.push(Param::Element(Element::Function(inner)));
                    }
                }
                Param::Element(Element::Crud(crud)) => {
                    flattened.push(Param::Element(Element::Crud(Box::new((*crud).optimize()))));
                }
                other => flattened.push(other),
            }
        }
        Function {
            name,
            params: flattened,
            alias,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_infix() && self.params.len() >= 2 {
            write!(f, "(")?;
            for (i, param) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", self.name.symbol())?;
                }
                write!(f, "{param}")?;
            }
            return write!(f, ")");
        }
        write!(f, "{}(", self.name.symbol())?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}

/// Function parameter or CRUD value: a sub-tree or a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Param {
    Element(Element),
    Value(Value),
}

impl Param {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Param::Element(element) => Some(element),
            Param::Value(_) => None,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Element(element) => write!(f, "{element}"),
            Param::Value(value) => write!(f, "{value}"),
        }
    }
}

/// A node of the query tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Expression(Expression),
    Function(Function),
    Crud(Box<Crud>),
}

impl Element {
    pub fn alias(&self) -> Option<&str> {
        match self {
            Element::Expression(e) => e.alias(),
            Element::Function(f) => f.alias(),
            Element::Crud(c) => c.alias(),
        }
    }

    /// Canonical context key: the alias when set, else the rendered node.
    pub fn ctx_name(&self) -> String {
        match self.alias() {
            Some(alias) => alias.to_string(),
            None => self.to_string(),
        }
    }

    /// Child nodes in routing order; literals are skipped.
    pub fn children(&self) -> Vec<&Element> {
        match self {
            Element::Expression(_) => Vec::new(),
            Element::Function(f) => f.params.iter().filter_map(Param::as_element).collect(),
            Element::Crud(c) => c.children(),
        }
    }

    pub fn as_crud(&self) -> Option<&Crud> {
        match self {
            Element::Crud(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_or(&self) -> bool {
        matches!(self, Element::Function(f) if f.name == FuncName::Or)
    }

    /// Visits every expression of the tree, nested CRUDs included.
    pub fn for_each_expression_mut(&mut self, visit: &mut dyn FnMut(&mut Expression)) {
        match self {
            Element::Expression(e) => visit(e),
            Element::Function(f) => {
                for param in &mut f.params {
                    if let Param::Element(element) = param {
                        element.for_each_expression_mut(visit);
                    }
                }
            }
            Element::Crud(c) => c.for_each_expression_mut(visit),
        }
    }

    pub fn optimize(self) -> Element {
        match self {
            Element::Function(f) => Element::Function(f.optimize()),
            Element::Crud(c) => Element::Crud(Box::new((*c).optimize())),
            other => other,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Expression(e) => write!(f, "{e}"),
            Element::Function(func) => write!(f, "{func}"),
            Element::Crud(c) => write!(f, "{c}"),
        }
    }
}

impl From<Expression> for Element {
    fn from(value: Expression) -> Self {
        Element::Expression(value)
    }
}

impl From<Function> for Element {
    fn from(value: Function) -> Self {
        Element::Function(value)
    }
}

impl From<Crud> for Element {
    fn from(value: Crud) -> Self {
        Element::Crud(Box::new(value))
    }
}

impl From<Element> for Param {
    fn from(value: Element) -> Self {
        Param::Element(value)
    }
}

impl From<Expression> for Param {
    fn from(value: Expression) -> Self {
        Param::Element(value.into())
    }
}

impl From<Function> for Param {
    fn from(value: Function) -> Self {
        Param::Element(value.into())
    }
}

impl From<Crud> for Param {
    fn from(value: Crud) -> Self {
        Param::Element(value.into())
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        Param::Value(value)
    }
}

macro_rules! literal_param {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Param {
                fn from(value: $ty) -> Self {
                    Param::Value(Value::from(value))
                }
            }
        )*
    };
}

literal_param!(bool, i32, i64, u32, f64, &str, String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::field;

    #[test]
    fn ctx_name_prefers_alias() {
        let plain: Element = field("car.wheel").into();
        assert_eq!(plain.ctx_name(), "car.wheel");

        let aliased: Element = field("car.wheel").with_alias("wh").into();
        assert_eq!(aliased.ctx_name(), "wh");
    }

    #[test]
    fn structurally_equal_trees_share_a_key() {
        let a: Element = field("a").eq(1).and(field("b").gt(2)).into();
        let b: Element = field("a").eq(1).and(field("b").gt(2)).into();
        assert_eq!(a.ctx_name(), b.ctx_name());
        assert_eq!(a.ctx_name(), "((a == 1) & (b > 2))");
    }

    #[test]
    fn localize_strips_own_prefix_once() {
        let mut expr = field("inventory.inventory.sku");
        expr.localize("inventory");
        assert_eq!(expr.name(), "inventory.sku");
        expr.localize("inventory");
        assert_eq!(expr.name(), "inventory.sku");
        assert_eq!(expr.scope(), Some("inventory"));
    }

    #[test]
    fn cleared_scope_allows_the_next_strip() {
        let mut expr = field("inventory.inventory.sku");
        expr.localize("inventory");
        expr.clear_scope();
        assert_eq!(expr.scope(), None);
        expr.localize("inventory");
        assert_eq!(expr.name(), "sku");
        assert_eq!(expr.scope(), Some("inventory"));
    }

    #[test]
    fn localize_leaves_foreign_names() {
        let mut expr = field("billing.amount");
        expr.localize("inventory");
        assert_eq!(expr.name(), "billing.amount");
        assert_eq!(expr.scope(), None);

        let mut lookalike = field("inventoryx.sku");
        lookalike.localize("inventory");
        assert_eq!(lookalike.name(), "inventoryx.sku");
    }

    #[test]
    fn localize_driver_root() {
        let mut expr = field("inventory");
        expr.localize("inventory");
        assert_eq!(expr.name(), "");
    }

    #[test]
    fn optimize_flattens_same_boolean_operator() {
        let nested = field("a")
            .eq(1)
            .and(field("b").eq(2))
            .and(field("c").eq(3))
            .optimize();
        assert_eq!(nested.params().len(), 3);
        assert_eq!(nested.to_string(), "((a == 1) & (b == 2) & (c == 3))");
    }

    #[test]
    fn optimize_keeps_mixed_operators_nested() {
        let tree = field("a")
            .eq(1)
            .or(field("b").eq(2))
            .and(field("c").eq(3))
            .optimize();
        assert_eq!(tree.params().len(), 2);
        assert!(matches!(
            tree.params()[0],
            Param::Element(Element::Function(ref f)) if f.name() == &FuncName::Or
        ));
    }

    #[test]
    fn children_skip_literals() {
        let tree: Element = field("a").between(1, 5).into();
        let children = tree.children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].ctx_name(), "a");
    }
}
