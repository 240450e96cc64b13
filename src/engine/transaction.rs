// SPDX-License-Identifier: Apache-2.0

//! Transaction state machine.
//!
//! A transaction collects CRUD operations for one driver and commits them in
//! a single backend call. `commit` is idempotent once the transaction has
//! committed; a failed transaction keeps returning its error.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use requester_query::{Create, Crud, Delete, Read, Update};
use tracing::{debug, instrument, warn};

use crate::engine::context::Context;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::Driver;
use crate::engine::types::{RouteOptions, TransactionId, TransactionState};

pub struct Transaction {
    id: TransactionId,
    driver: Arc<dyn Driver>,
    ctx: Context,
    cruds: Vec<Crud>,
    autocommit: bool,
    state: TransactionState,
    failure: Option<EngineError>,
    opened_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(driver: Arc<dyn Driver>, ctx: Context, autocommit: bool, cruds: Vec<Crud>) -> Self {
        let state = if autocommit {
            TransactionState::Committing
        } else {
            TransactionState::Open
        };
        Self {
            id: TransactionId::new(),
            driver,
            ctx,
            cruds,
            autocommit,
            state,
            failure: None,
            opened_at: Utc::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn into_ctx(self) -> Context {
        self.ctx
    }

    pub fn cruds(&self) -> &[Crud] {
        &self.cruds
    }

    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn failure(&self) -> Option<&EngineError> {
        self.failure.as_ref()
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Appends a CRUD operation. Only open transactions accept new work.
    pub fn add(&mut self, crud: impl Into<Crud>) -> EngineResult<&mut Self> {
        if self.state != TransactionState::Open {
            return Err(EngineError::transaction_error(format!(
                "cannot add an operation to a {} transaction",
                self.state
            )));
        }
        self.cruds.push(crud.into());
        Ok(self)
    }

    pub fn create(&mut self, create: Create) -> EngineResult<&mut Self> {
        self.add(create)
    }

    pub fn read(&mut self, read: Read) -> EngineResult<&mut Self> {
        self.add(read)
    }

    pub fn update(&mut self, update: Update) -> EngineResult<&mut Self> {
        self.add(update)
    }

    pub fn delete(&mut self, delete: Delete) -> EngineResult<&mut Self> {
        self.add(delete)
    }

    /// Sub-transaction on the same driver over a fork of this context.
    pub fn open_child(&self, autocommit: bool, cruds: Vec<Crud>) -> Transaction {
        Transaction::new(Arc::clone(&self.driver), self.ctx.fork(), autocommit, cruds)
    }

    /// Commits through the driver and returns the resulting context.
    #[instrument(skip_all, fields(driver = %self.driver.name(), transaction = %self.id))]
    pub async fn commit(&mut self, options: &RouteOptions) -> EngineResult<&Context> {
        match self.state {
            TransactionState::Committed => return Ok(&self.ctx),
            TransactionState::Failed => {
                return Err(self.failure.clone().unwrap_or_else(|| {
                    EngineError::transaction_error("transaction failed")
                }))
            }
            TransactionState::Open => self.state = TransactionState::Committing,
            TransactionState::Committing => {}
        }
        self.execute(options).await?;
        Ok(&self.ctx)
    }

    /// Runs the backend hook of a committing transaction.
    pub(crate) async fn execute(&mut self, options: &RouteOptions) -> EngineResult<()> {
        if self.state != TransactionState::Committing {
            return Err(EngineError::transaction_error(format!(
                "cannot execute a {} transaction",
                self.state
            )));
        }
        let driver = Arc::clone(&self.driver);
        debug!(operations = self.cruds.len(), "Executing transaction");
        match driver.execute_backend(self, options).await {
            Ok(()) => {
                self.state = TransactionState::Committed;
                Ok(())
            }
            Err(e) => {
                warn!(driver = %driver.name(), error = %e, "Transaction failed");
                self.state = TransactionState::Failed;
                self.failure = Some(e.clone());
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("driver", &self.driver.name())
            .field("state", &self.state)
            .field("autocommit", &self.autocommit)
            .field("cruds", &self.cruds.len())
            .field("slots", &self.ctx.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use requester_query::{field, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Driver for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn execute_backend(
            &self,
            transaction: &mut Transaction,
            _options: &RouteOptions,
        ) -> EngineResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EngineError::execution_error("backend down"));
            }
            let cruds = transaction.cruds().to_vec();
            for crud in &cruds {
                transaction.ctx_mut().append(crud, [Value::from("ok")]);
            }
            Ok(())
        }
    }

    fn flaky(fail: bool) -> Arc<Flaky> {
        Arc::new(Flaky {
            fail,
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn autocommit_starts_committing() {
        let driver = flaky(false);
        let tx = Transaction::new(driver.clone(), Context::new(), true, vec![]);
        assert_eq!(tx.state(), TransactionState::Committing);
        let tx = Transaction::new(driver, Context::new(), false, vec![]);
        assert_eq!(tx.state(), TransactionState::Open);
    }

    #[tokio::test]
    async fn commit_is_idempotent_once_committed() {
        let driver = flaky(false);
        let mut tx = Transaction::new(driver.clone(), Context::new(), false, vec![]);
        tx.read(Read::new().select(field("a"))).unwrap();

        let first = tx.commit(&RouteOptions::default()).await.unwrap().clone();
        let second = tx.commit(&RouteOptions::default()).await.unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(tx.state(), TransactionState::Committed);
        assert_eq!(driver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_is_terminal() {
        let driver = flaky(true);
        let mut tx = Transaction::new(driver.clone(), Context::new(), true, vec![]);
        let err = tx.commit(&RouteOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::ExecutionError { .. }));
        assert_eq!(tx.state(), TransactionState::Failed);

        let again = tx.commit(&RouteOptions::default()).await.unwrap_err();
        assert_eq!(again, err);
        assert_eq!(driver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn adding_to_closed_transaction_is_rejected() {
        let mut tx = Transaction::new(flaky(false), Context::new(), true, vec![]);
        let err = tx.delete(Delete::new().name("a")).unwrap_err();
        assert!(matches!(err, EngineError::TransactionError { .. }));

        tx.commit(&RouteOptions::default()).await.unwrap();
        assert!(tx.create(Create::new("a")).is_err());
    }

    #[test]
    fn child_shares_driver_and_forks_context() {
        let mut ctx = Context::new();
        ctx.set("seed", vec![Value::Int(1)]);
        let parent = Transaction::new(flaky(false), ctx, false, vec![]);
        let child = parent.open_child(true, vec![]);
        assert_eq!(child.driver().name(), "flaky");
        assert!(child.ctx().has("seed"));
        assert!(child.into_ctx().detach().is_empty());
    }
}
