//! Store registry for resolving a local store by name and configuration.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::FragmentStore;
use fragments_common::{Error, Result};

/// Factory function type for creating stores.
pub type StoreFactory = Box<dyn Fn(Value) -> Result<Arc<dyn FragmentStore>> + Send + Sync>;

/// Registry for fragment store factories.
///
/// Allows the backend to be picked from configuration at startup.
pub struct StoreRegistry {
    factories: HashMap<String, StoreFactory>,
}

impl StoreRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a store factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: StoreFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::InvalidInput(format!(
                "Store '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a store by name and configuration.
    ///
    /// # Errors
    /// - Store not registered
    /// - Configuration invalid
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn FragmentStore>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Store '{}' is not registered", name)))?;
        factory(config)
    }

    /// Get list of registered store names.
    pub fn stores(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Check if a store is registered.
    pub fn has_store(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn sqlite_factory(config: Value) -> Result<Arc<dyn FragmentStore>> {
    let path = config
        .get("path")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::InvalidInput("sqlite store requires 'path'".to_string()))?;
    Ok(Arc::new(crate::sqlite::SqliteStore::new(path)))
}

/// Create a registry with the built-in stores.
pub fn create_default_registry() -> StoreRegistry {
    let mut factories: HashMap<String, StoreFactory> = HashMap::new();
    factories.insert(
        "memory".to_string(),
        Box::new(|_config| Ok(Arc::new(crate::memory::MemoryStore::new()))),
    );
    factories.insert("sqlite".to_string(), Box::new(sqlite_factory));
    StoreRegistry { factories }
}
