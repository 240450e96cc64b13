// SPDX-License-Identifier: Apache-2.0

//! In-memory driver
//!
//! Holds one record set and answers every CRUD operation against it. Mostly
//! useful as a federation endpoint in tests and for small lookup tables.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use requester_query::{Create, Crud, Delete, Element, Param, Update, Value};
use tracing::{debug, instrument};

use super::eval::{eval, matches, shape_read};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::Driver;
use crate::engine::transaction::Transaction;
use crate::engine::types::{DriverCapabilities, DriverInfo, RouteOptions};

pub struct MemoryDriver {
    name: String,
    records: RwLock<Vec<Value>>,
}

impl MemoryDriver {
    pub fn new(name: impl Into<String>, records: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            records: RwLock::new(records),
        }
    }

    /// Snapshot of the stored records.
    pub fn records(&self) -> Vec<Value> {
        self.records.read().clone()
    }

    fn apply(&self, crud: &Crud) -> EngineResult<Vec<Value>> {
        match crud {
            Crud::Create(create) => self.create(create),
            Crud::Read(read) => {
                let records = self.records.read();
                let mut selected = Vec::new();
                for record in records.iter() {
                    if matches(read.query.as_ref(), record)? {
                        selected.push(record.clone());
                    }
                }
                drop(records);
                shape_read(read, selected)
            }
            Crud::Update(update) => self.update(update),
            Crud::Delete(delete) => self.delete(delete),
        }
    }

    fn create(&self, create: &Create) -> EngineResult<Vec<Value>> {
        let mut fields = BTreeMap::new();
        for (field, param) in &create.values {
            fields.insert(field.clone(), eval_param(param, &Value::Null)?);
        }
        let record = create
            .name
            .segments()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .fold(Value::Map(fields), |inner, segment| {
                Value::record([(segment, inner)])
            });
        self.records.write().push(record.clone());
        Ok(vec![record])
    }

    fn update(&self, update: &Update) -> EngineResult<Vec<Value>> {
        let prefix: Vec<&str> = update.name.segments().collect();
        let mut records = self.records.write();
        let mut updated = Vec::new();
        for record in records.iter_mut() {
            if !matches(update.query.as_ref(), record)? {
                continue;
            }
            let mut assignments = Vec::with_capacity(update.values.len());
            for (field, param) in &update.values {
                assignments.push((field, eval_param(param, record)?));
            }
            for (field, value) in assignments {
                let path: Vec<&str> = prefix
                    .iter()
                    .copied()
                    .chain(field.split('.').filter(|s| !s.is_empty()))
                    .collect();
                set_path(record, &path, value);
            }
            updated.push(record.clone());
        }
        Ok(updated)
    }

    fn delete(&self, delete: &Delete) -> EngineResult<Vec<Value>> {
        let whole = delete.names.is_empty() || delete.names.iter().any(|n| n.name().is_empty());
        let mut records = self.records.write();
        let mut affected = Vec::new();
        if whole {
            let mut hits = Vec::with_capacity(records.len());
            for record in records.iter() {
                hits.push(matches(delete.query.as_ref(), record)?);
            }
            let mut hits = hits.into_iter();
            let (removed, kept): (Vec<Value>, Vec<Value>) = records
                .drain(..)
                .partition(|_| hits.next().unwrap_or(false));
            *records = kept;
            return Ok(removed);
        }
        for record in records.iter_mut() {
            if !matches(delete.query.as_ref(), record)? {
                continue;
            }
            let mut touched = false;
            for name in &delete.names {
                let path: Vec<&str> = name.segments().collect();
                touched |= remove_path(record, &path);
            }
            if touched {
                affected.push(record.clone());
            }
        }
        Ok(affected)
    }

    fn explain(&self, crud: &Crud) -> EngineResult<Vec<Value>> {
        let records = self.records.read();
        let mut matched = 0i64;
        for record in records.iter() {
            if matches(crud.query(), record)? {
                matched += 1;
            }
        }
        Ok(vec![Value::record([
            ("driver", Value::from(self.name.as_str())),
            ("operation", Value::from(crud.to_string())),
            ("matched", Value::Int(matched)),
        ])])
    }
}

fn eval_param(param: &Param, record: &Value) -> EngineResult<Value> {
    match param {
        Param::Value(value) => Ok(value.clone()),
        Param::Element(element @ Element::Crud(_)) => Err(EngineError::not_supported(format!(
            "nested operation `{}` as a value",
            element
        ))),
        Param::Element(element) => eval(element, record),
    }
}

fn set_path(record: &mut Value, path: &[&str], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *record = value;
        return;
    };
    if !matches!(record, Value::Map(_)) {
        *record = Value::Map(BTreeMap::new());
    }
    if let Value::Map(fields) = record {
        let slot = fields.entry((*first).to_string()).or_insert(Value::Null);
        set_path(slot, rest, value);
    }
}

fn remove_path(record: &mut Value, path: &[&str]) -> bool {
    let Value::Map(fields) = record else {
        return false;
    };
    match path {
        [] => false,
        [last] => fields.remove(*last).is_some(),
        [first, rest @ ..] => fields
            .get_mut(*first)
            .is_some_and(|next| remove_path(next, rest)),
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(driver = %self.name, transaction = %transaction.id()))]
    async fn execute_backend(
        &self,
        transaction: &mut Transaction,
        options: &RouteOptions,
    ) -> EngineResult<()> {
        let cruds = transaction.cruds().to_vec();
        for crud in &cruds {
            let result = if options.explain {
                self.explain(crud)?
            } else {
                self.apply(crud)?
            };
            debug!(operation = %crud.kind(), rows = result.len(), "Processed operation");
            transaction.ctx_mut().set(crud, result);
        }
        Ok(())
    }

    fn children(&self, path: &[String]) -> Vec<String> {
        let path = path.join(".");
        let records = self.records.read();
        let mut names: Vec<String> = Vec::new();
        for record in records.iter() {
            if let Some(fields) = record.get_path(&path).and_then(Value::as_map) {
                for key in fields.keys() {
                    if !names.contains(key) {
                        names.push(key.clone());
                    }
                }
            }
        }
        names
    }

    fn info(&self) -> DriverInfo {
        DriverInfo {
            name: self.name.clone(),
            capabilities: DriverCapabilities::all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::Context;
    use crate::engine::traits::DriverExt;
    use requester_query::{field, Read};
    use std::sync::Arc;

    fn stock() -> Arc<MemoryDriver> {
        Arc::new(MemoryDriver::new(
            "inventory",
            vec![
                Value::record([("sku", Value::Int(1)), ("qty", Value::Int(5))]),
                Value::record([("sku", Value::Int(2)), ("qty", Value::Int(0))]),
            ],
        ))
    }

    async fn run(driver: Arc<MemoryDriver>, crud: Crud, options: RouteOptions) -> Vec<Value> {
        let driver: Arc<dyn Driver> = driver;
        let tx = driver.open(Context::new(), true, vec![crud.clone()]);
        let tx = driver.process(tx, &options, None).await.wait().await.unwrap();
        tx.ctx().get(&crud).unwrap().to_vec()
    }

    #[tokio::test]
    async fn read_filters_records() {
        let rows = run(
            stock(),
            Crud::read_of(field("qty").gt(0)),
            RouteOptions::default(),
        )
        .await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_path("sku"), Some(&Value::Int(1)));
    }

    #[tokio::test]
    async fn create_nests_under_name() {
        let driver = stock();
        let rows = run(
            driver.clone(),
            Create::new("meta.tags").value("color", "red").into(),
            RouteOptions::default(),
        )
        .await;
        assert_eq!(rows[0].get_path("meta.tags.color"), Some(&Value::from("red")));
        assert_eq!(driver.records().len(), 3);

        let root = run(
            driver.clone(),
            Create::new("").value("sku", 9).into(),
            RouteOptions::default(),
        )
        .await;
        assert_eq!(root[0], Value::record([("sku", Value::Int(9))]));
    }

    #[tokio::test]
    async fn update_evaluates_against_record() {
        let driver = stock();
        let crud = Crud::from(Update::new("").value("qty", field("qty").add(10)))
            .with_query(field("sku").eq(2));
        let rows = run(driver.clone(), crud, RouteOptions::default()).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_path("qty"), Some(&Value::Int(10)));
        assert_eq!(driver.records()[1].get_path("qty"), Some(&Value::Int(10)));
    }

    #[tokio::test]
    async fn delete_whole_records_or_fields() {
        let driver = stock();
        let crud = Crud::from(Delete::new().name("qty")).with_query(field("sku").eq(1));
        let rows = run(driver.clone(), crud, RouteOptions::default()).await;
        assert_eq!(rows, vec![Value::record([("sku", Value::Int(1))])]);

        let crud = Crud::from(Delete::new()).with_query(field("sku").eq(2));
        run(driver.clone(), crud, RouteOptions::default()).await;
        assert_eq!(driver.records().len(), 1);
    }

    #[tokio::test]
    async fn explain_does_not_mutate() {
        let driver = stock();
        let crud = Crud::from(Delete::new()).with_query(field("qty").ge(0));
        let plan = run(
            driver.clone(),
            crud,
            RouteOptions::default().with_explain(true),
        )
        .await;
        assert_eq!(plan[0].get_path("matched"), Some(&Value::Int(2)));
        assert_eq!(driver.records().len(), 2);
    }

    #[test]
    fn children_list_field_names() {
        let driver = MemoryDriver::new(
            "crm",
            vec![
                Value::record([("customer", Value::record([("id", Value::Int(1))]))]),
                Value::record([("customer", Value::record([("email", Value::from("x"))]))]),
            ],
        );
        assert_eq!(driver.children(&[]), vec!["customer"]);
        assert_eq!(driver.children(&["customer".to_string()]), vec!["id", "email"]);
        assert!(driver.children(&["missing".to_string()]).is_empty());
    }

    #[tokio::test]
    async fn select_projects_named_columns() {
        let crud: Crud = Read::new().select(field("sku")).orderby(field("qty")).into();
        let rows = run(stock(), crud, RouteOptions::default().synchronous()).await;
        assert_eq!(
            rows,
            vec![
                Value::record([("sku", Value::Int(2))]),
                Value::record([("sku", Value::Int(1))]),
            ]
        );
    }
}
