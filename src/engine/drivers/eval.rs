// SPDX-License-Identifier: Apache-2.0

//! Record-level evaluation of query trees.
//!
//! Used by the reference drivers to filter, project and sort plain records.
//! Field names are expected to be local to the driver (prefix already
//! stripped by the router).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use regex::Regex;
use requester_query::{Element, FuncName, Function, Join, Param, Read, Value};

use crate::engine::error::{EngineError, EngineResult};

/// Evaluates `element` against one record.
pub fn eval(element: &Element, record: &Value) -> EngineResult<Value> {
    match element {
        Element::Expression(expr) => Ok(record.get_path(expr.name()).cloned().unwrap_or(Value::Null)),
        Element::Function(func) => eval_function(func, record),
        Element::Crud(crud) => Err(EngineError::not_supported(format!(
            "nested operation `{}` cannot be evaluated per record",
            crud.kind()
        ))),
    }
}

/// True when the record satisfies the filter. No filter keeps everything.
pub fn matches(filter: Option<&Element>, record: &Value) -> EngineResult<bool> {
    match filter {
        Some(filter) => Ok(eval(filter, record)?.is_truthy()),
        None => Ok(true),
    }
}

fn eval_param(param: &Param, record: &Value) -> EngineResult<Value> {
    match param {
        Param::Element(element) => eval(element, record),
        Param::Value(value) => Ok(value.clone()),
    }
}

fn arity(func: &Function, expected: usize) -> EngineResult<()> {
    if func.params().len() != expected {
        return Err(EngineError::validation(format!(
            "`{}` expects {} parameter(s), got {}",
            func.name().symbol(),
            expected,
            func.params().len()
        )));
    }
    Ok(())
}

fn eval_function(func: &Function, record: &Value) -> EngineResult<Value> {
    let params = func.params();
    match func.name() {
        FuncName::And => {
            for param in params {
                if !eval_param(param, record)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        FuncName::Or => {
            for param in params {
                if eval_param(param, record)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        FuncName::Not => {
            arity(func, 1)?;
            Ok(Value::Bool(!eval_param(&params[0], record)?.is_truthy()))
        }
        FuncName::Eq | FuncName::Ne | FuncName::Gt | FuncName::Ge | FuncName::Lt | FuncName::Le => {
            arity(func, 2)?;
            let left = eval_param(&params[0], record)?;
            let right = eval_param(&params[1], record)?;
            Ok(Value::Bool(compare_with(func.name(), &left, &right)))
        }
        FuncName::Add | FuncName::Sub | FuncName::Mul | FuncName::Div | FuncName::Pow => {
            arity(func, 2)?;
            let left = eval_param(&params[0], record)?;
            let right = eval_param(&params[1], record)?;
            arithmetic(func.name(), &left, &right)
        }
        FuncName::Like => {
            arity(func, 2)?;
            let value = eval_param(&params[0], record)?;
            let pattern = eval_param(&params[1], record)?;
            match (value.as_str(), pattern.as_str()) {
                (Some(value), Some(pattern)) => Ok(Value::Bool(like(pattern)?.is_match(value))),
                _ => Ok(Value::Bool(false)),
            }
        }
        FuncName::Neg => {
            arity(func, 1)?;
            match eval_param(&params[0], record)? {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| EngineError::execution_error("integer overflow")),
                Value::Float(f) => Ok(Value::Float(-f)),
                Value::Null => Ok(Value::Null),
                other => Err(type_error("neg", &other)),
            }
        }
        FuncName::Abs => {
            arity(func, 1)?;
            match eval_param(&params[0], record)? {
                Value::Int(i) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| EngineError::execution_error("integer overflow")),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                Value::Null => Ok(Value::Null),
                other => Err(type_error("abs", &other)),
            }
        }
        FuncName::Round => {
            let value = eval_param(params.first().ok_or_else(|| missing(func))?, record)?;
            match value {
                Value::Float(f) => Ok(Value::Float(f.round())),
                other => Ok(other),
            }
        }
        FuncName::In => {
            arity(func, 2)?;
            let value = eval_param(&params[0], record)?;
            match eval_param(&params[1], record)? {
                Value::Array(items) => Ok(Value::Bool(items.iter().any(|item| equal(&value, item)))),
                other => Ok(Value::Bool(equal(&value, &other))),
            }
        }
        FuncName::Between => {
            arity(func, 3)?;
            let value = eval_param(&params[0], record)?;
            let low = eval_param(&params[1], record)?;
            let high = eval_param(&params[2], record)?;
            Ok(Value::Bool(
                compare_with(&FuncName::Ge, &value, &low) && compare_with(&FuncName::Le, &value, &high),
            ))
        }
        FuncName::IsNull => {
            arity(func, 1)?;
            Ok(Value::Bool(eval_param(&params[0], record)?.is_null()))
        }
        FuncName::Exists => {
            arity(func, 1)?;
            match &params[0] {
                Param::Element(Element::Expression(expr)) => {
                    Ok(Value::Bool(record.get_path(expr.name()).is_some()))
                }
                other => Ok(Value::Bool(!eval_param(other, record)?.is_null())),
            }
        }
        FuncName::Concat => {
            let mut out = String::new();
            for param in params {
                match eval_param(param, record)? {
                    Value::Text(s) => out.push_str(&s),
                    Value::Null => {}
                    other => out.push_str(&other.to_string()),
                }
            }
            Ok(Value::Text(out))
        }
        FuncName::Length => {
            arity(func, 1)?;
            match eval_param(&params[0], record)? {
                Value::Text(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::Array(items) => Ok(Value::Int(items.len() as i64)),
                Value::Null => Ok(Value::Null),
                other => Err(type_error("length", &other)),
            }
        }
        FuncName::Upper | FuncName::Lower | FuncName::Trim => {
            arity(func, 1)?;
            match eval_param(&params[0], record)? {
                Value::Text(s) => Ok(Value::Text(match func.name() {
                    FuncName::Upper => s.to_uppercase(),
                    FuncName::Lower => s.to_lowercase(),
                    _ => s.trim().to_string(),
                })),
                Value::Null => Ok(Value::Null),
                other => Err(type_error(func.name().symbol(), &other)),
            }
        }
        FuncName::Replace => {
            arity(func, 3)?;
            let value = eval_param(&params[0], record)?;
            let from = eval_param(&params[1], record)?;
            let to = eval_param(&params[2], record)?;
            match (value.as_str(), from.as_str(), to.as_str()) {
                (Some(value), Some(from), Some(to)) => Ok(Value::Text(value.replace(from, to))),
                _ => Ok(Value::Null),
            }
        }
        other => Err(EngineError::not_supported(format!(
            "operator `{}` is not supported by record evaluation",
            other.symbol()
        ))),
    }
}

fn missing(func: &Function) -> EngineError {
    EngineError::validation(format!("`{}` expects a parameter", func.name().symbol()))
}

fn type_error(op: &str, value: &Value) -> EngineError {
    EngineError::execution_error(format!("`{}` cannot apply to {}", op, value))
}

/// Numeric-aware equality: `1 == 1.0`.
pub fn equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

/// Orders comparable values; mixed or null operands are unordered.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Text(l), Value::Text(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

fn compare_with(op: &FuncName, left: &Value, right: &Value) -> bool {
    match op {
        FuncName::Eq => equal(left, right),
        FuncName::Ne => !equal(left, right),
        FuncName::Gt => compare(left, right) == Some(Ordering::Greater),
        FuncName::Ge => matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal)),
        FuncName::Lt => compare(left, right) == Some(Ordering::Less),
        FuncName::Le => matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)),
        _ => false,
    }
}

fn arithmetic(op: &FuncName, left: &Value, right: &Value) -> EngineResult<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    if let (FuncName::Add, Value::Text(l), Value::Text(r)) = (op, left, right) {
        return Ok(Value::Text(format!("{l}{r}")));
    }
    let overflow = || EngineError::execution_error("integer overflow");
    if let (Value::Int(l), Value::Int(r)) = (left, right) {
        match op {
            FuncName::Add => return l.checked_add(*r).map(Value::Int).ok_or_else(overflow),
            FuncName::Sub => return l.checked_sub(*r).map(Value::Int).ok_or_else(overflow),
            FuncName::Mul => return l.checked_mul(*r).map(Value::Int).ok_or_else(overflow),
            FuncName::Pow if (0..=u32::MAX as i64).contains(r) => {
                return l.checked_pow(*r as u32).map(Value::Int).ok_or_else(overflow)
            }
            _ => {}
        }
    }
    let (l, r) = match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            return Err(EngineError::execution_error(format!(
                "`{}` cannot apply to {} and {}",
                op.symbol(),
                left,
                right
            )))
        }
    };
    let result = match op {
        FuncName::Add => l + r,
        FuncName::Sub => l - r,
        FuncName::Mul => l * r,
        FuncName::Div => {
            if r == 0.0 {
                return Err(EngineError::execution_error("division by zero"));
            }
            l / r
        }
        _ => l.powf(r),
    };
    Ok(Value::Float(result))
}

/// SQL `LIKE` pattern to an anchored regex.
fn like(pattern: &str) -> EngineResult<Regex> {
    let mut expr = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| EngineError::validation(format!("invalid pattern: {}", e)))
}

/// Applies the shaping clauses of a read to already filtered records:
/// ordering, offset, limit and projection.
pub fn shape_read(read: &Read, mut records: Vec<Value>) -> EngineResult<Vec<Value>> {
    if !matches!(read.join, None | Some(Join::Full)) {
        return Err(EngineError::not_supported(format!(
            "join {:?} is not supported",
            read.join
        )));
    }
    if !read.groupby.is_empty() {
        return Err(EngineError::not_supported("groupby is not supported"));
    }

    if !read.orderby.is_empty() {
        let mut keyed = Vec::with_capacity(records.len());
        for record in records {
            let keys = read
                .orderby
                .iter()
                .map(|order| eval(order, &record))
                .collect::<EngineResult<Vec<_>>>()?;
            keyed.push((keys, record));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            a.iter()
                .zip(b.iter())
                .map(|(l, r)| compare(l, r).unwrap_or(Ordering::Equal))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        records = keyed.into_iter().map(|(_, record)| record).collect();
    }

    let offset = read.offset.unwrap_or(0) as usize;
    let records = records.into_iter().skip(offset);
    let records: Vec<Value> = match read.limit {
        Some(limit) => records.take(limit as usize).collect(),
        None => records.collect(),
    };

    if read.select.is_empty() {
        return Ok(records);
    }
    records
        .iter()
        .map(|record| -> EngineResult<Value> {
            let mut projected = BTreeMap::new();
            for element in &read.select {
                projected.insert(element.ctx_name(), eval(element, record)?);
            }
            Ok(Value::Map(projected))
        })
        .collect()
}
