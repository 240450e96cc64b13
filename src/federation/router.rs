// SPDX-License-Identifier: Apache-2.0

//! Composite router
//!
//! Routes a query tree across several drivers. The tree is planned first so
//! every name is resolved before any backend is touched; the walk then
//! dispatches each partition top to its owning drivers, one autocommit
//! sub-transaction per driver, and folds the contributions back into the
//! request context.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use requester_query::{Crud, Element, FuncName, Value};
use tracing::{debug, instrument, warn};

use super::partition::{plan, PlanNode};
use super::resolve::Resolver;
use super::rewrite::{localize, to_crud};
use super::types::{DriverSet, Ownership, PartitionStack};
use crate::engine::config::RouterConfig;
use crate::engine::context::Context;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::registry::DriverRegistry;
use crate::engine::traits::{Driver, DriverExt, Processed};
use crate::engine::transaction::Transaction;
use crate::engine::types::{DriverCapabilities, DriverInfo, RouteOptions};
use crate::metrics;
use crate::observability::Redacted;

/// A driver made of other drivers.
///
/// Field paths are routed by their leading segment (or by schema discovery)
/// to the registered drivers. Names nothing answers fall to the optional
/// default driver.
pub struct CompositeDriver {
    name: String,
    registry: DriverRegistry,
    default: Option<Arc<dyn Driver>>,
}

/// One sub-transaction launched for a partition top.
struct Worker {
    top: usize,
    driver: String,
    local: Crud,
    processed: Processed,
}

impl CompositeDriver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: DriverRegistry::new(),
            default: None,
        }
    }

    /// Builds a router from ordered `(name, driver)` pairs. A repeated name
    /// replaces the earlier driver in place.
    pub fn from_drivers<N, I>(
        name: impl Into<String>,
        drivers: I,
        default: Option<Arc<dyn Driver>>,
    ) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Arc<dyn Driver>)>,
    {
        Self {
            name: name.into(),
            registry: drivers.into_iter().collect(),
            default,
        }
    }

    pub fn from_config<N, I>(
        config: &RouterConfig,
        drivers: I,
        default: Option<Arc<dyn Driver>>,
    ) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Arc<dyn Driver>)>,
    {
        Self::from_drivers(config.name.clone(), drivers, default)
    }

    pub fn with_driver(mut self, name: impl Into<String>, driver: Arc<dyn Driver>) -> Self {
        self.registry.insert(name, driver);
        self
    }

    pub fn with_default(mut self, driver: Arc<dyn Driver>) -> Self {
        self.default = Some(driver);
        self
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn default_driver(&self) -> Option<&Arc<dyn Driver>> {
        self.default.as_ref()
    }

    /// Resolves `name` to the drivers able to answer it.
    pub fn resolve(&self, name: &str, options: &RouteOptions) -> EngineResult<DriverSet> {
        Resolver::new(&self.registry, self.default.as_ref(), options).resolve(name)
    }

    /// Routes `node` and returns the values stored under it in `ctx`.
    ///
    /// Partitions are recorded on `partitions` in launch order. A node
    /// already present in `ctx` is returned as is.
    #[instrument(skip_all, fields(router = %self.name, node = %Redacted(node)))]
    pub async fn route(
        &self,
        node: &Element,
        ctx: &mut Context,
        partitions: &mut PartitionStack,
        options: &RouteOptions,
    ) -> EngineResult<Vec<Value>> {
        if let Some(cached) = ctx.get(node) {
            metrics::record_memo_hit();
            return Ok(cached.to_vec());
        }

        let planned = {
            let mut resolver = Resolver::new(&self.registry, self.default.as_ref(), options);
            plan(node, &mut resolver)
        };
        let planned = match planned {
            Ok(planned) => planned,
            Err(e) => {
                metrics::record_routing_failure();
                return Err(e);
            }
        };
        debug!(partitions = planned.partition_count(), "Planned request");

        let result = self.walk(node, &planned, ctx, partitions, options).await;
        if let Err(e) = &result {
            if e.is_routing() {
                metrics::record_routing_failure();
            }
        }
        result
    }

    fn driver(&self, name: &str) -> EngineResult<Arc<dyn Driver>> {
        self.registry
            .get(name)
            .or_else(|| {
                self.default
                    .as_ref()
                    .filter(|driver| driver.name() == name)
                    .map(Arc::clone)
            })
            .ok_or_else(|| EngineError::driver_not_found(name))
    }

    fn default_set(&self, node: &Element) -> EngineResult<DriverSet> {
        self.default
            .as_ref()
            .map(|driver| DriverSet::single(driver.name()))
            .ok_or_else(|| EngineError::no_driver_for(node.ctx_name()))
    }

    fn walk<'a>(
        &'a self,
        node: &'a Element,
        planned: &'a PlanNode,
        ctx: &'a mut Context,
        partitions: &'a mut PartitionStack,
        options: &'a RouteOptions,
    ) -> BoxFuture<'a, EngineResult<Vec<Value>>> {
        async move {
            if let Some(cached) = ctx.get(node) {
                metrics::record_memo_hit();
                debug!(node = %Redacted(node), "Node already routed");
                return Ok(cached.to_vec());
            }

            match &planned.ownership {
                Ownership::Owned(drivers) => {
                    self.dispatch(vec![(node, drivers.clone())], ctx, partitions, options)
                        .await?;
                }
                Ownership::Neutral => {
                    let drivers = self.default_set(node)?;
                    self.dispatch(vec![(node, drivers)], ctx, partitions, options)
                        .await?;
                }
                Ownership::Mixed(drivers) => {
                    debug!(node = %Redacted(node), drivers = %drivers, "Splitting mixed node");
                    self.walk_mixed(node, planned, ctx, partitions, options)
                        .await?;
                }
            }
            Ok(ctx.get(node).map(<[Value]>::to_vec).unwrap_or_default())
        }
        .boxed()
    }

    async fn walk_mixed(
        &self,
        node: &Element,
        planned: &PlanNode,
        ctx: &mut Context,
        partitions: &mut PartitionStack,
        options: &RouteOptions,
    ) -> EngineResult<()> {
        match node {
            Element::Crud(crud) => {
                if let (Some(query), Some(filter)) = (crud.query(), planned.children.first()) {
                    self.walk(query, filter, ctx, partitions, options).await?;
                }
                let drivers = match (&planned.anchor, planned.ownership.drivers()) {
                    (Some(anchor), _) => anchor.clone(),
                    (None, Some(all)) => all.clone(),
                    (None, None) => self.default_set(node)?,
                };
                self.dispatch(vec![(node, drivers)], ctx, partitions, options)
                    .await
            }
            Element::Function(func) => {
                let children = node.children();
                if node.is_or() {
                    for (child, child_plan) in children.iter().zip(&planned.children) {
                        let mut fork = ctx.fork();
                        self.walk(child, child_plan, &mut fork, partitions, options)
                            .await?;
                        ctx.merge(fork.detach());
                    }
                } else {
                    self.walk_siblings(&children, &planned.children, ctx, partitions, options)
                        .await?;
                }

                match (func.name(), &planned.anchor) {
                    (FuncName::Call(_), Some(anchor)) => {
                        self.dispatch(vec![(node, anchor.clone())], ctx, partitions, options)
                            .await
                    }
                    _ => {
                        let combined: Vec<Value> = children
                            .iter()
                            .flat_map(|child| ctx.get(*child).unwrap_or_default().to_vec())
                            .collect();
                        ctx.set(node, combined);
                        Ok(())
                    }
                }
            }
            Element::Expression(expr) => Err(EngineError::internal(format!(
                "field `{}` cannot span several drivers",
                expr.name()
            ))),
        }
    }

    /// Launches every owned sibling together, then walks the mixed and
    /// neutral ones in declared order.
    async fn walk_siblings(
        &self,
        children: &[&Element],
        plans: &[PlanNode],
        ctx: &mut Context,
        partitions: &mut PartitionStack,
        options: &RouteOptions,
    ) -> EngineResult<()> {
        let mut seen = HashSet::new();
        let mut tops = Vec::new();
        for (child, child_plan) in children.iter().zip(plans) {
            let Ownership::Owned(drivers) = &child_plan.ownership else {
                continue;
            };
            if ctx.has(*child) {
                metrics::record_memo_hit();
                continue;
            }
            if seen.insert(child.ctx_name()) {
                tops.push((*child, drivers.clone()));
            }
        }
        if !tops.is_empty() {
            self.dispatch(tops, ctx, partitions, options).await?;
        }

        for (child, child_plan) in children.iter().zip(plans) {
            if !matches!(child_plan.ownership, Ownership::Owned(_)) {
                self.walk(child, child_plan, ctx, partitions, options)
                    .await?;
            }
        }
        Ok(())
    }

    /// Runs partition tops on their drivers and joins them at one barrier.
    ///
    /// Every worker is awaited before the first failure, in launch order, is
    /// returned. Nothing is written to `ctx` unless all succeeded.
    #[instrument(skip_all, fields(router = %self.name, tops = tops.len()))]
    async fn dispatch(
        &self,
        tops: Vec<(&Element, DriverSet)>,
        ctx: &mut Context,
        partitions: &mut PartitionStack,
        options: &RouteOptions,
    ) -> EngineResult<()> {
        let started = Instant::now();
        let mut workers = Vec::new();
        for (index, (node, drivers)) in tops.iter().enumerate() {
            let crud = to_crud(node);
            partitions.enter(drivers.clone(), node.ctx_name());
            debug!(node = %Redacted(node), drivers = %drivers, "Dispatching partition");
            for name in drivers.iter() {
                let driver = self.driver(name)?;
                let local = localize(&crud, name);
                let transaction = driver.open(ctx.fork(), true, vec![local.clone()]);
                let processed = driver.process(transaction, options, None).await;
                workers.push(Worker {
                    top: index,
                    driver: name.to_string(),
                    local,
                    processed,
                });
            }
        }

        let launched = workers.len();
        let mut outcomes: Vec<(usize, String, Crud, EngineResult<Transaction>)> =
            Vec::with_capacity(launched);
        for worker in workers {
            let outcome = worker.processed.wait().await;
            outcomes.push((worker.top, worker.driver, worker.local, outcome));
        }
        partitions.leave_all();

        let failures = outcomes
            .iter()
            .filter(|(_, _, _, outcome)| outcome.is_err())
            .count();
        metrics::record_dispatch(
            tops.len(),
            launched,
            failures,
            started.elapsed().as_secs_f64() * 1000.0,
        );

        let mut contributions: Vec<Vec<Value>> = vec![Vec::new(); tops.len()];
        let mut first_error = None;
        for (top, driver, local, outcome) in outcomes {
            match outcome {
                Ok(transaction) => {
                    if let Some(values) = transaction.ctx().get(&local) {
                        contributions[top].extend(values.iter().cloned());
                    }
                }
                Err(e) => {
                    warn!(driver = %driver, error = %e, "Partition worker failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        for ((node, _), values) in tops.iter().zip(contributions) {
            debug!(node = %Redacted(node), rows = values.len(), "Partition joined");
            ctx.append(*node, values);
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for CompositeDriver {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(router = %self.name, transaction = %transaction.id()))]
    async fn execute_backend(
        &self,
        transaction: &mut Transaction,
        options: &RouteOptions,
    ) -> EngineResult<()> {
        let cruds = transaction.cruds().to_vec();
        let mut partitions = PartitionStack::new();
        for mut crud in cruds {
            // Scopes set by an outer router would stop this one stripping
            // its own prefix.
            crud.for_each_expression_mut(&mut |expr| expr.clear_scope());
            let node = Element::from(crud);
            self.route(&node, transaction.ctx_mut(), &mut partitions, options)
                .await?;
        }
        debug!(partitions = partitions.dispatched().len(), "Transaction routed");
        Ok(())
    }

    fn children(&self, path: &[String]) -> Vec<String> {
        match path.split_first() {
            None => {
                let mut names: Vec<String> =
                    self.registry.list().into_iter().map(str::to_string).collect();
                if let Some(default) = &self.default {
                    if !names.iter().any(|name| name == default.name()) {
                        names.push(default.name().to_string());
                    }
                }
                names
            }
            Some((root, rest)) => self
                .driver(root)
                .map(|driver| driver.children(rest))
                .unwrap_or_default(),
        }
    }

    fn info(&self) -> DriverInfo {
        let capabilities = self
            .registry
            .iter()
            .map(|(_, driver)| driver.info().capabilities)
            .chain(self.default.iter().map(|driver| driver.info().capabilities))
            .fold(
                DriverCapabilities {
                    discovery: true,
                    ..DriverCapabilities::default()
                },
                |acc, caps| DriverCapabilities {
                    create: acc.create || caps.create,
                    read: acc.read || caps.read,
                    update: acc.update || caps.update,
                    delete: acc.delete || caps.delete,
                    discovery: true,
                    explain: acc.explain || caps.explain,
                },
            );
        DriverInfo {
            name: self.name.clone(),
            capabilities,
        }
    }
}
