// SPDX-License-Identifier: Apache-2.0

//! Request builder
//!
//! Collects a query and CRUD operations, then commits them on a bound driver
//! (usually a [`crate::federation::CompositeDriver`]).

use std::fmt;
use std::sync::Arc;

use requester_query::{func, Create, Crud, Delete, Element, FuncName, Read, Update, Value};
use tracing::{debug, instrument};

use crate::engine::context::{Context, ContextKey};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::{Driver, DriverExt};
use crate::engine::types::RouteOptions;

#[derive(Default)]
pub struct Request {
    driver: Option<Arc<dyn Driver>>,
    ctx: Context,
    query: Option<Element>,
    cruds: Vec<Crud>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver: Some(driver),
            ..Self::default()
        }
    }

    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Starts from existing results; nodes already in `ctx` are not routed again.
    pub fn with_ctx(mut self, ctx: Context) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn driver(&self) -> Option<&Arc<dyn Driver>> {
        self.driver.as_ref()
    }

    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    pub fn query(&self) -> Option<&Element> {
        self.query.as_ref()
    }

    pub fn cruds(&self) -> &[Crud] {
        &self.cruds
    }

    /// Conjunction with the current query, or the query itself when unset.
    pub fn and(self, query: impl Into<Element>) -> Self {
        self.combine(FuncName::And, query.into())
    }

    /// Disjunction with the current query, or the query itself when unset.
    pub fn or(self, query: impl Into<Element>) -> Self {
        self.combine(FuncName::Or, query.into())
    }

    fn combine(mut self, op: FuncName, query: Element) -> Self {
        self.query = Some(match self.query.take() {
            None => query,
            Some(current) => func(op, vec![current.into(), query.into()]).optimize().into(),
        });
        self
    }

    pub fn create(self, create: Create) -> Self {
        self.push(create)
    }

    pub fn read(self, read: Read) -> Self {
        self.push(read)
    }

    pub fn update(self, update: Update) -> Self {
        self.push(update)
    }

    pub fn delete(self, delete: Delete) -> Self {
        self.push(delete)
    }

    pub fn push(mut self, crud: impl Into<Crud>) -> Self {
        self.cruds.push(crud.into());
        self
    }

    /// Operations as sent to the driver: the request query filters every
    /// operation without its own filter. A query alone is read.
    pub fn operations(&self) -> Vec<Crud> {
        if self.cruds.is_empty() {
            return self.query.iter().cloned().map(Crud::read_of).collect();
        }
        self.cruds
            .iter()
            .map(|crud| match (&self.query, crud.query()) {
                (Some(query), None) => crud.clone().with_query(query.clone()),
                _ => crud.clone(),
            })
            .collect()
    }

    /// Runs the operations in one autocommit transaction on the bound
    /// driver and keeps the resulting context.
    #[instrument(skip_all, fields(operations = self.cruds.len()))]
    pub async fn commit(&mut self, options: &RouteOptions) -> EngineResult<&Context> {
        let driver = self
            .driver
            .clone()
            .ok_or_else(|| EngineError::validation("request has no driver to commit on"))?;
        let operations = self.operations();
        if operations.is_empty() {
            debug!("Nothing to commit");
            return Ok(&self.ctx);
        }

        let transaction = driver.open(self.ctx.clone(), true, operations);
        let transaction = driver.process(transaction, options, None).await.wait().await?;
        self.ctx = transaction.into_ctx();
        Ok(&self.ctx)
    }

    /// Values stored for `key`, falling back to more specific `*.key` slots.
    pub fn get<K: ContextKey + ?Sized>(&self, key: &K) -> Vec<Value> {
        self.ctx.lookup(key)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("driver", &self.driver.as_ref().map(|d| d.name().to_string()))
            .field("query", &self.query.as_ref().map(ToString::to_string))
            .field("cruds", &self.cruds.len())
            .field("ctx_slots", &self.ctx.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::drivers::MemoryDriver;
    use requester_query::field;

    fn users() -> Arc<dyn Driver> {
        Arc::new(MemoryDriver::new(
            "users",
            vec![
                Value::record([("id", Value::Int(1)), ("name", Value::from("ada"))]),
                Value::record([("id", Value::Int(2)), ("name", Value::from("bob"))]),
            ],
        ))
    }

    #[test]
    fn and_or_combine_queries() {
        let request = Request::new()
            .and(field("a").eq(1))
            .and(field("b").eq(2))
            .and(field("c").eq(3));
        assert_eq!(
            request.query().unwrap().to_string(),
            "((a == 1) & (b == 2) & (c == 3))"
        );

        let request = Request::new().or(field("a").eq(1)).and(field("b").eq(2));
        assert_eq!(request.query().unwrap().to_string(), "((a == 1) & (b == 2))");
    }

    #[test]
    fn query_filters_unfiltered_operations() {
        let explicit = Crud::from(Delete::new()).with_query(field("id").eq(9));
        let request = Request::new()
            .and(field("id").eq(1))
            .read(Read::new())
            .push(explicit.clone());
        let operations = request.operations();
        assert_eq!(operations[0].query().unwrap().to_string(), "(id == 1)");
        assert_eq!(operations[1], explicit);
    }

    #[tokio::test]
    async fn commit_without_driver_is_rejected() {
        let mut request = Request::new().read(Read::new());
        let err = request.commit(&RouteOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn commit_runs_on_bound_driver() {
        let mut request = Request::on(users()).and(field("id").eq(2));
        let read = Crud::read_of(field("id").eq(2));
        request.commit(&RouteOptions::default()).await.unwrap();
        let rows = request.get(&read);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_path("name"), Some(&Value::from("bob")));
    }
}
