// SPDX-License-Identifier: Apache-2.0

//! Driver trait definition
//!
//! This is the core abstraction every backend implements. A driver only
//! knows how to run CRUD operations against its own store; routing across
//! drivers is layered on top by the federation module.

use std::sync::Arc;

use async_trait::async_trait;
use requester_query::Crud;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::engine::context::Context;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::transaction::Transaction;
use crate::engine::types::{DriverCapabilities, DriverInfo, RouteOptions, TransactionState};

/// Core trait that all drivers must implement
#[async_trait]
pub trait Driver: Send + Sync {
    /// Unique name, also the routing key of the driver's field paths.
    fn name(&self) -> &str;

    /// Runs the CRUD operations of a committing transaction.
    ///
    /// Implementations store each operation's results under the operation's
    /// canonical name in `transaction.ctx_mut()`.
    async fn execute_backend(
        &self,
        transaction: &mut Transaction,
        options: &RouteOptions,
    ) -> EngineResult<()> {
        let _ = (transaction, options);
        Err(EngineError::not_supported(format!(
            "driver `{}` has no backend execution hook",
            self.name()
        )))
    }

    /// Ordered child names of a schema node. The empty path is the root.
    ///
    /// Drivers that return nothing are never matched by discovery.
    fn children(&self, path: &[String]) -> Vec<String> {
        let _ = path;
        Vec::new()
    }

    fn info(&self) -> DriverInfo {
        DriverInfo {
            name: self.name().to_string(),
            capabilities: DriverCapabilities::default(),
        }
    }
}

/// Invoked with the outcome once a processed transaction completes.
pub type ProcessCallback = Box<dyn FnOnce(&EngineResult<Transaction>) + Send + 'static>;

/// Outcome of [`DriverExt::process`].
pub enum Processed {
    Ready(EngineResult<Transaction>),
    Spawned(ProcessHandle),
}

impl Processed {
    pub async fn wait(self) -> EngineResult<Transaction> {
        match self {
            Processed::Ready(result) => result,
            Processed::Spawned(handle) => handle.wait().await,
        }
    }
}

/// Handle on a transaction committing in the background.
pub struct ProcessHandle {
    handle: JoinHandle<EngineResult<Transaction>>,
}

impl ProcessHandle {
    /// Resolves to the committed transaction or to the backend error.
    pub async fn wait(self) -> EngineResult<Transaction> {
        self.handle
            .await
            .map_err(|e| EngineError::internal(format!("Driver task panicked: {}", e)))?
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Transaction entry points shared by every driver.
#[async_trait]
pub trait DriverExt {
    /// Opens a transaction on this driver. Autocommit transactions start
    /// in the committing state.
    fn open(&self, ctx: Context, autocommit: bool, cruds: Vec<Crud>) -> Transaction;

    /// Commits a transaction that is in the committing state.
    ///
    /// Any other state is left untouched. With `options.asynchronous` the
    /// backend call runs on its own task and a handle is returned at once.
    async fn process(
        &self,
        transaction: Transaction,
        options: &RouteOptions,
        callback: Option<ProcessCallback>,
    ) -> Processed;
}

#[async_trait]
impl DriverExt for Arc<dyn Driver> {
    fn open(&self, ctx: Context, autocommit: bool, cruds: Vec<Crud>) -> Transaction {
        Transaction::new(Arc::clone(self), ctx, autocommit, cruds)
    }

    #[instrument(skip_all, fields(driver = %self.name(), transaction = %transaction.id()))]
    async fn process(
        &self,
        transaction: Transaction,
        options: &RouteOptions,
        callback: Option<ProcessCallback>,
    ) -> Processed {
        if transaction.state() != TransactionState::Committing {
            debug!(state = %transaction.state(), "Transaction not committing, nothing to process");
            return Processed::Ready(Ok(transaction));
        }

        let run = run_transaction(transaction, options.clone(), callback);
        if options.asynchronous {
            Processed::Spawned(ProcessHandle {
                handle: tokio::spawn(run),
            })
        } else {
            Processed::Ready(run.await)
        }
    }
}

async fn run_transaction(
    mut transaction: Transaction,
    options: RouteOptions,
    callback: Option<ProcessCallback>,
) -> EngineResult<Transaction> {
    let result = match transaction.execute(&options).await {
        Ok(()) => Ok(transaction),
        Err(e) => Err(e),
    };
    if let Some(callback) = callback {
        callback(&result);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use requester_query::{field, Value};

    struct Hookless;

    #[async_trait]
    impl Driver for Hookless {
        fn name(&self) -> &str {
            "hookless"
        }
    }

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Driver for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn execute_backend(
            &self,
            transaction: &mut Transaction,
            _options: &RouteOptions,
        ) -> EngineResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let cruds = transaction.cruds().to_vec();
            for crud in &cruds {
                transaction.ctx_mut().append(crud, [Value::Int(1)]);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn default_hook_is_not_supported() {
        let driver: Arc<dyn Driver> = Arc::new(Hookless);
        let tx = driver.open(Context::new(), true, vec![Crud::read_of(field("a"))]);
        let err = driver
            .process(tx, &RouteOptions::default(), None)
            .await
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotSupported { .. }));
    }

    #[tokio::test]
    async fn process_is_noop_unless_committing() {
        let counting = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let driver: Arc<dyn Driver> = counting.clone();
        let tx = driver.open(Context::new(), false, vec![Crud::read_of(field("a"))]);
        let processed = driver.process(tx, &RouteOptions::default(), None).await;
        assert!(matches!(processed, Processed::Ready(_)));
        let tx = processed.wait().await.unwrap();
        assert_eq!(tx.state(), TransactionState::Open);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn spawned_process_runs_callback() {
        let driver: Arc<dyn Driver> = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_callback = Arc::clone(&seen);
        let crud = Crud::read_of(field("a"));
        let tx = driver.open(Context::new(), true, vec![crud.clone()]);
        let processed = driver
            .process(
                tx,
                &RouteOptions::default(),
                Some(Box::new(move |result| {
                    if result.is_ok() {
                        seen_in_callback.fetch_add(1, Ordering::SeqCst);
                    }
                })),
            )
            .await;
        assert!(matches!(processed, Processed::Spawned(_)));
        let tx = processed.wait().await.unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);
        assert_eq!(tx.ctx().get(&crud), Some([Value::Int(1)].as_slice()));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn synchronous_process_is_ready() {
        let driver: Arc<dyn Driver> = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let tx = driver.open(Context::new(), true, vec![Crud::read_of(field("a"))]);
        let processed = driver
            .process(tx, &RouteOptions::default().synchronous(), None)
            .await;
        assert!(matches!(processed, Processed::Ready(Ok(_))));
    }
}
