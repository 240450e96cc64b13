// SPDX-License-Identifier: Apache-2.0

//! Driver Registry
//!
//! Ordered `name -> driver` table used by the composite router. Order is
//! registration order and decides the order in which broadcast results are
//! merged.

use std::sync::Arc;

use crate::engine::traits::Driver;
use crate::engine::types::DriverInfo;

/// Registry that holds the drivers a router dispatches to
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: Vec<(String, Arc<dyn Driver>)>,
}

impl DriverRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: Vec::new(),
        }
    }

    /// Registers a driver under its own name.
    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        let name = driver.name().to_string();
        self.insert(name, driver);
    }

    /// Registers a driver under an explicit name.
    ///
    /// A name already present is overwritten in place and keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, driver: Arc<dyn Driver>) {
        let name = name.into();
        match self.drivers.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = driver,
            None => self.drivers.push((name, driver)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Driver>> {
        let index = self.drivers.iter().position(|(existing, _)| existing == name)?;
        Some(self.drivers.remove(index).1)
    }

    /// Gets a driver by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, driver)| Arc::clone(driver))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.iter().any(|(existing, _)| existing == name)
    }

    /// Registered names in registration order
    pub fn list(&self) -> Vec<&str> {
        self.drivers.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Driver>)> {
        self.drivers.iter().map(|(name, driver)| (name.as_str(), driver))
    }

    /// Position of a driver, used to order broadcast results.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.drivers.iter().position(|(existing, _)| existing == name)
    }

    /// Lists all registered drivers with their metadata.
    pub fn list_infos(&self) -> Vec<DriverInfo> {
        self.drivers
            .iter()
            .map(|(name, driver)| DriverInfo {
                name: name.clone(),
                capabilities: driver.info().capabilities,
            })
            .collect()
    }

    /// Returns the number of registered drivers
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Returns true if no drivers are registered
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, Arc<dyn Driver>)> for DriverRegistry {
    fn from_iter<I: IntoIterator<Item = (N, Arc<dyn Driver>)>>(iter: I) -> Self {
        let mut registry = DriverRegistry::new();
        for (name, driver) in iter {
            registry.insert(name, driver);
        }
        registry
    }
}
