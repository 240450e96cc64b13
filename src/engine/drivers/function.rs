// SPDX-License-Identifier: Apache-2.0

//! Function-table driver
//!
//! Each CRUD kind maps to a list of handlers. Handlers run in registration
//! order and their rows are appended to the operation's slot. Reads are then
//! shaped (order, offset, limit, projection) like any other backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use requester_query::{Crud, CrudKind, Value};
use tracing::{debug, instrument};

use super::eval::shape_read;
use crate::engine::context::Context;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::Driver;
use crate::engine::transaction::Transaction;
use crate::engine::types::{DriverCapabilities, DriverInfo, RouteOptions};

/// Handler invoked with the operation and the transaction context.
pub type CrudHandler = Arc<dyn Fn(&Crud, &Context) -> EngineResult<Vec<Value>> + Send + Sync>;

pub struct FunctionDriver {
    name: String,
    handlers: BTreeMap<CrudKind, Vec<CrudHandler>>,
    schema: BTreeMap<String, Vec<String>>,
}

impl FunctionDriver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: BTreeMap::new(),
            schema: BTreeMap::new(),
        }
    }

    pub fn on<F>(mut self, kind: CrudKind, handler: F) -> Self
    where
        F: Fn(&Crud, &Context) -> EngineResult<Vec<Value>> + Send + Sync + 'static,
    {
        self.handlers.entry(kind).or_default().push(Arc::new(handler));
        self
    }

    pub fn on_create<F>(self, handler: F) -> Self
    where
        F: Fn(&Crud, &Context) -> EngineResult<Vec<Value>> + Send + Sync + 'static,
    {
        self.on(CrudKind::Create, handler)
    }

    pub fn on_read<F>(self, handler: F) -> Self
    where
        F: Fn(&Crud, &Context) -> EngineResult<Vec<Value>> + Send + Sync + 'static,
    {
        self.on(CrudKind::Read, handler)
    }

    pub fn on_update<F>(self, handler: F) -> Self
    where
        F: Fn(&Crud, &Context) -> EngineResult<Vec<Value>> + Send + Sync + 'static,
    {
        self.on(CrudKind::Update, handler)
    }

    pub fn on_delete<F>(self, handler: F) -> Self
    where
        F: Fn(&Crud, &Context) -> EngineResult<Vec<Value>> + Send + Sync + 'static,
    {
        self.on(CrudKind::Delete, handler)
    }

    /// Declares the children of a schema node (dotted path, `""` for root).
    pub fn with_children<I, S>(mut self, path: &str, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schema
            .insert(path.to_string(), children.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl Driver for FunctionDriver {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(driver = %self.name, transaction = %transaction.id()))]
    async fn execute_backend(
        &self,
        transaction: &mut Transaction,
        _options: &RouteOptions,
    ) -> EngineResult<()> {
        let cruds = transaction.cruds().to_vec();
        for crud in &cruds {
            let handlers = self
                .handlers
                .get(&crud.kind())
                .filter(|handlers| !handlers.is_empty())
                .ok_or_else(|| {
                    EngineError::not_supported(format!(
                        "No implementation found for {}",
                        crud.kind()
                    ))
                })?;
            let mut rows = Vec::new();
            for handler in handlers {
                rows.extend(handler(crud, transaction.ctx())?);
            }
            if let Crud::Read(read) = crud {
                rows = shape_read(read, rows)?;
            }
            debug!(operation = %crud.kind(), rows = rows.len(), "Processed operation");
            transaction.ctx_mut().set(crud, rows);
        }
        Ok(())
    }

    fn children(&self, path: &[String]) -> Vec<String> {
        self.schema.get(&path.join(".")).cloned().unwrap_or_default()
    }

    fn info(&self) -> DriverInfo {
        DriverInfo {
            name: self.name.clone(),
            capabilities: DriverCapabilities {
                create: self.handlers.contains_key(&CrudKind::Create),
                read: self.handlers.contains_key(&CrudKind::Read),
                update: self.handlers.contains_key(&CrudKind::Update),
                delete: self.handlers.contains_key(&CrudKind::Delete),
                discovery: !self.schema.is_empty(),
                explain: false,
            },
        }
    }
}
