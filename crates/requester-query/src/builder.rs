// SPDX-License-Identifier: Apache-2.0

//! Explicit builder API for query trees.
//!
//! ```
//! use requester_query::builder::field;
//!
//! let filter = field("inventory.sku").eq(1).and(field("billing.amount").gt(10));
//! assert_eq!(filter.to_string(), "((inventory.sku == 1) & (billing.amount > 10))");
//! ```

use crate::element::{Expression, FuncName, Function, Param};
use crate::error::{QueryError, QueryResult};
use crate::value::Value;

/// Path factory. Dots separate schema levels.
pub fn field(path: impl Into<String>) -> Expression {
    Expression::new(path)
}

/// Same as [`field`] but rejects empty path segments (`"a..b"`, `".a"`).
pub fn try_field(path: impl Into<String>) -> QueryResult<Expression> {
    let path = path.into();
    if !path.is_empty() && path.split('.').any(str::is_empty) {
        return Err(QueryError::EmptySegment { path });
    }
    Ok(Expression::new(path))
}

/// Backend function addressed by dotted path.
pub fn call(path: impl Into<String>, params: Vec<Param>) -> Function {
    Function::new(FuncName::Call(path.into()), params)
}

/// Operator application with an arbitrary parameter list.
pub fn func(name: FuncName, params: Vec<Param>) -> Function {
    Function::new(name, params)
}

macro_rules! operator_builders {
    ($ty:ty) => {
        impl $ty {
            pub fn eq(self, other: impl Into<Param>) -> Function {
                binary(FuncName::Eq, self, other)
            }

            pub fn ne(self, other: impl Into<Param>) -> Function {
                binary(FuncName::Ne, self, other)
            }

            pub fn gt(self, other: impl Into<Param>) -> Function {
                binary(FuncName::Gt, self, other)
            }

            pub fn ge(self, other: impl Into<Param>) -> Function {
                binary(FuncName::Ge, self, other)
            }

            pub fn lt(self, other: impl Into<Param>) -> Function {
                binary(FuncName::Lt, self, other)
            }

            pub fn le(self, other: impl Into<Param>) -> Function {
                binary(FuncName::Le, self, other)
            }

            /// SQL-style pattern (`%` and `_` wildcards).
            pub fn like(self, pattern: impl Into<Param>) -> Function {
                binary(FuncName::Like, self, pattern)
            }

            pub fn add(self, other: impl Into<Param>) -> Function {
                binary(FuncName::Add, self, other)
            }

            pub fn sub(self, other: impl Into<Param>) -> Function {
                binary(FuncName::Sub, self, other)
            }

            pub fn mul(self, other: impl Into<Param>) -> Function {
                binary(FuncName::Mul, self, other)
            }

            pub fn div(self, other: impl Into<Param>) -> Function {
                binary(FuncName::Div, self, other)
            }

            pub fn pow(self, other: impl Into<Param>) -> Function {
                binary(FuncName::Pow, self, other)
            }

            pub fn neg(self) -> Function {
                Function::new(FuncName::Neg, vec![self.into()])
            }

            pub fn abs(self) -> Function {
                Function::new(FuncName::Abs, vec![self.into()])
            }

            pub fn not(self) -> Function {
                Function::new(FuncName::Not, vec![self.into()])
            }

            pub fn and(self, other: impl Into<Param>) -> Function {
                binary(FuncName::And, self, other)
            }

            pub fn or(self, other: impl Into<Param>) -> Function {
                binary(FuncName::Or, self, other)
            }

            pub fn is_in(self, values: impl Into<Value>) -> Function {
                Function::new(FuncName::In, vec![self.into(), Param::Value(values.into())])
            }

            pub fn between(self, low: impl Into<Param>, high: impl Into<Param>) -> Function {
                Function::new(FuncName::Between, vec![self.into(), low.into(), high.into()])
            }

            pub fn is_null(self) -> Function {
                Function::new(FuncName::IsNull, vec![self.into()])
            }

            pub fn exists(self) -> Function {
                Function::new(FuncName::Exists, vec![self.into()])
            }
        }
    };
}

fn binary(name: FuncName, left: impl Into<Param>, right: impl Into<Param>) -> Function {
    Function::new(name, vec![left.into(), right.into()])
}

operator_builders!(Expression);
operator_builders!(Function);
