// SPDX-License-Identifier: Apache-2.0

//! Driver resolution.
//!
//! Maps a dotted field path to the drivers that can answer it, either by its
//! leading segment or, with discovery enabled, by a bounded breadth-first
//! search of each driver's schema graph.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, instrument};

use super::types::DriverSet;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::registry::DriverRegistry;
use crate::engine::traits::Driver;
use crate::engine::types::RouteOptions;

/// Resolves names against one registry for the duration of a request.
pub struct Resolver<'a> {
    registry: &'a DriverRegistry,
    default: Option<&'a Arc<dyn Driver>>,
    options: &'a RouteOptions,
    cache: HashMap<String, DriverSet>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        registry: &'a DriverRegistry,
        default: Option<&'a Arc<dyn Driver>>,
        options: &'a RouteOptions,
    ) -> Self {
        Self {
            registry,
            default,
            options,
            cache: HashMap::new(),
        }
    }

    /// Registry position; the default driver sorts after every registered one.
    pub fn rank(&self, name: &str) -> usize {
        self.registry.position(name).unwrap_or(self.registry.len())
    }

    pub fn driver(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.registry.get(name).or_else(|| {
            self.default
                .filter(|driver| driver.name() == name)
                .map(Arc::clone)
        })
    }

    #[instrument(skip(self), fields(discovery = self.options.discovery(), many = self.options.many()))]
    pub fn resolve(&mut self, name: &str) -> EngineResult<DriverSet> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(cached.clone());
        }
        let set = self.resolve_uncached(name)?;
        self.cache.insert(name.to_string(), set.clone());
        Ok(set)
    }

    fn resolve_uncached(&self, name: &str) -> EngineResult<DriverSet> {
        let segments: Vec<&str> = name.split('.').collect();
        let Some((root, rest)) = segments.split_first() else {
            return Err(EngineError::driver_not_found(name));
        };
        if root.is_empty() {
            return Err(EngineError::driver_not_found(name));
        }

        if self.driver(root).is_some() {
            return Ok(DriverSet::single(*root));
        }
        if !self.options.discovery() {
            return Err(EngineError::driver_not_found(name));
        }

        let mut found = DriverSet::new();
        for (driver_name, driver) in self.candidates() {
            if schema_contains(driver.as_ref(), root, rest, self.options.maxdepth) {
                found.insert_ranked(&driver_name, |n| self.rank(n));
            }
        }
        debug!(name, drivers = %found, "Discovery finished");

        match found.len() {
            0 => Err(EngineError::driver_not_found(name)),
            1 => Ok(found),
            _ if self.options.many() => Ok(found),
            _ => Err(EngineError::ambiguous(name, found.names().to_vec())),
        }
    }

    fn candidates(&self) -> Vec<(String, Arc<dyn Driver>)> {
        let mut candidates: Vec<(String, Arc<dyn Driver>)> = self
            .registry
            .iter()
            .map(|(name, driver)| (name.to_string(), Arc::clone(driver)))
            .collect();
        if let Some(default) = self.default {
            if !self.registry.contains(default.name()) {
                candidates.push((default.name().to_string(), Arc::clone(default)));
            }
        }
        candidates
    }
}

/// Searches up to `maxdepth` levels for a node named `root`, then requires
/// the `rest` path to exist below it.
fn schema_contains(driver: &dyn Driver, root: &str, rest: &[&str], maxdepth: usize) -> bool {
    if rest.len() > maxdepth {
        return false;
    }
    let mut queue: VecDeque<Vec<String>> = VecDeque::from([Vec::new()]);
    let mut visited: HashSet<Vec<String>> = HashSet::new();

    while let Some(path) = queue.pop_front() {
        if path.len() >= maxdepth || !visited.insert(path.clone()) {
            continue;
        }
        for child in driver.children(&path) {
            let mut next = path.clone();
            next.push(child.clone());
            if child == root && remainder_exists(driver, next.clone(), rest) {
                return true;
            }
            queue.push_back(next);
        }
    }
    false
}

fn remainder_exists(driver: &dyn Driver, mut path: Vec<String>, rest: &[&str]) -> bool {
    for segment in rest {
        if !driver.children(&path).iter().any(|child| child == segment) {
            return false;
        }
        path.push((*segment).to_string());
    }
    true
}
