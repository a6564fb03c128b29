//! Plugin-based collaborator registry
//!
//! The registry allows reachability probes and publishers to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nim_core::registry::CollaboratorRegistry;
//!
//! let registry = CollaboratorRegistry::with_builtin_publishers();
//! nim_probe_http::register(&registry);
//!
//! let probe = registry.create_probe(&config.probe)?;
//! let publisher = registry.create_publisher(&config.publisher).await?;
//! ```
//!
//! ## Registration
//!
//! Implementations register themselves during initialization:
//!
//! ```rust,ignore
//! // In nim-probe-http crate
//! pub fn register(registry: &CollaboratorRegistry) {
//!     registry.register_probe("http", Box::new(HttpProbeFactory));
//! }
//! ```

use crate::config::{ProbeConfig, PublisherConfig};
use crate::error::{Error, Result};
use crate::state::{FilePublisherFactory, MemoryPublisherFactory};
use crate::traits::{ConnectivityProbe, ProbeFactory, PublisherFactory, StatePublisher};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Registry of probe and publisher factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct CollaboratorRegistry {
    /// Registered probe factories
    probes: RwLock<HashMap<String, Box<dyn ProbeFactory>>>,

    /// Registered publisher factories
    publishers: RwLock<HashMap<String, Arc<dyn PublisherFactory>>>,
}

// A poisoned lock only means a registering thread panicked; the map itself
// is still consistent.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl CollaboratorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the "memory" and "file" publishers already registered
    pub fn with_builtin_publishers() -> Self {
        let registry = Self::new();
        registry.register_publisher("memory", Box::new(MemoryPublisherFactory));
        registry.register_publisher("file", Box::new(FilePublisherFactory));
        registry
    }

    /// Register a probe factory
    ///
    /// # Parameters
    ///
    /// - `name`: Probe type name (e.g., "http")
    /// - `factory`: Factory object for creating probe instances
    pub fn register_probe(&self, name: impl Into<String>, factory: Box<dyn ProbeFactory>) {
        write(&self.probes).insert(name.into(), factory);
    }

    /// Register a publisher factory
    pub fn register_publisher(&self, name: impl Into<String>, factory: Box<dyn PublisherFactory>) {
        write(&self.publishers).insert(name.into(), Arc::from(factory));
    }

    /// Create a probe from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn ConnectivityProbe>)`: Created probe instance
    /// - `Err(Error)`: If the probe type is not registered or creation fails
    pub fn create_probe(&self, config: &ProbeConfig) -> Result<Box<dyn ConnectivityProbe>> {
        let probe_type = config.type_name();
        let probes = read(&self.probes);

        let factory = probes
            .get(probe_type)
            .ok_or_else(|| Error::config(format!("Unknown probe type: {}", probe_type)))?;

        factory.create(config)
    }

    /// Create a publisher from configuration
    ///
    /// Factories receive the serialized configuration; custom publishers
    /// receive their own `config` value.
    pub async fn create_publisher(&self, config: &PublisherConfig) -> Result<Box<dyn StatePublisher>> {
        let factory = {
            let publishers = read(&self.publishers);
            publishers
                .get(config.type_name())
                .ok_or_else(|| {
                    Error::config(format!("Unknown publisher type: {}", config.type_name()))
                })?
                .clone()
        };

        let config_json = match config {
            PublisherConfig::Custom { config, .. } => config.clone(),
            other => serde_json::to_value(other)?,
        };

        factory.create(&config_json).await
    }

    /// List all registered probe types
    pub fn list_probes(&self) -> Vec<String> {
        read(&self.probes).keys().cloned().collect()
    }

    /// List all registered publisher types
    pub fn list_publishers(&self) -> Vec<String> {
        read(&self.publishers).keys().cloned().collect()
    }

    /// Check if a probe type is registered
    pub fn has_probe(&self, name: &str) -> bool {
        read(&self.probes).contains_key(name)
    }

    /// Check if a publisher type is registered
    pub fn has_publisher(&self, name: &str) -> bool {
        read(&self.publishers).contains_key(name)
    }
}
