// # State Publisher Trait
//
// Defines the interface to the pub/sub collaborator that carries the
// manager's published state to other agents.
//
// ## Published objects
//
// - `DevicePortConfigList` under key "global" (compressed)
// - `DeviceNetworkStatus` under key "global"
// - `DevicePortConfig` under key "lastresort" (the derived fallback)
//
// The published list is also what the manager ingests on startup, so a
// publisher doubles as the persistence of the list across restarts.
//
// ## Usage
//
// ```rust,ignore
// use nim_core::StatePublisher;
//
// publisher.publish_network_status(&status).await?;
// let stored = publisher.load_port_config_list().await?;
// ```

use async_trait::async_trait;

use crate::types::{DeviceNetworkStatus, DevicePortConfig, DevicePortConfigList};

/// Key under which the list and the status are published
pub const GLOBAL_KEY: &str = "global";

/// Trait for publisher implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe; the manager calls them from a
/// single task but embedders may share a publisher with readers.
///
/// # Implementation Guidelines
///
/// - Publishing replaces the previous object under the same key
/// - `flush()` must persist anything buffered
/// - Errors are reported, never retried internally; the manager logs them
///   and publishes again at the next settle point
#[async_trait]
pub trait StatePublisher: Send + Sync {
    /// Publish the candidate list under [`GLOBAL_KEY`]
    async fn publish_port_config_list(&self, list: &DevicePortConfigList) -> Result<(), crate::Error>;

    /// Last list published under [`GLOBAL_KEY`], if any
    async fn load_port_config_list(&self) -> Result<Option<DevicePortConfigList>, crate::Error>;

    /// Publish the network status under [`GLOBAL_KEY`]
    async fn publish_network_status(&self, status: &DeviceNetworkStatus) -> Result<(), crate::Error>;

    /// Last published network status, if any
    async fn network_status(&self) -> Result<Option<DeviceNetworkStatus>, crate::Error>;

    /// Publish a single candidate under `key`
    async fn publish_port_config(&self, key: &str, dpc: &DevicePortConfig) -> Result<(), crate::Error>;

    /// Retract the candidate published under `key`
    async fn unpublish_port_config(&self, key: &str) -> Result<(), crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing publishers from configuration
#[async_trait]
pub trait PublisherFactory: Send + Sync {
    async fn create(&self, config: &serde_json::Value) -> Result<Box<dyn StatePublisher>, crate::Error>;
}
