// # Memory Publisher
//
// In-memory implementation of StatePublisher.
//
// ## Purpose
//
// Holds the published objects for in-process consumers. Nothing survives
// a restart: on startup the manager finds no persisted list and begins
// from the derived fallback alone.
//
// ## When to Use
//
// - Testing environments
// - Embedding the manager in a process that reads the status directly

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::{PublisherFactory, StatePublisher};
use crate::types::{DeviceNetworkStatus, DevicePortConfig, DevicePortConfigList};

#[derive(Debug, Default)]
struct Published {
    list: Option<DevicePortConfigList>,
    status: Option<DeviceNetworkStatus>,
    port_configs: HashMap<String, DevicePortConfig>,
}

/// In-memory publisher
///
/// Clones share the same storage, so a clone handed to a reader observes
/// everything the manager publishes.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    inner: Arc<RwLock<Published>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidate published under `key`, if any
    pub async fn port_config(&self, key: &str) -> Option<DevicePortConfig> {
        self.inner.read().await.port_configs.get(key).cloned()
    }

    /// Keys of the individually published candidates
    pub async fn port_config_keys(&self) -> Vec<String> {
        let guard = self.inner.read().await;
        let mut keys: Vec<String> = guard.port_configs.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl StatePublisher for MemoryPublisher {
    async fn publish_port_config_list(&self, list: &DevicePortConfigList) -> Result<(), Error> {
        self.inner.write().await.list = Some(list.clone());
        Ok(())
    }

    async fn load_port_config_list(&self) -> Result<Option<DevicePortConfigList>, Error> {
        Ok(self.inner.read().await.list.clone())
    }

    async fn publish_network_status(&self, status: &DeviceNetworkStatus) -> Result<(), Error> {
        self.inner.write().await.status = Some(status.clone());
        Ok(())
    }

    async fn network_status(&self) -> Result<Option<DeviceNetworkStatus>, Error> {
        Ok(self.inner.read().await.status.clone())
    }

    async fn publish_port_config(&self, key: &str, dpc: &DevicePortConfig) -> Result<(), Error> {
        self.inner
            .write()
            .await
            .port_configs
            .insert(key.to_string(), dpc.clone());
        Ok(())
    }

    async fn unpublish_port_config(&self, key: &str) -> Result<(), Error> {
        self.inner.write().await.port_configs.remove(key);
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}

/// Factory registered under "memory"
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryPublisherFactory;

#[async_trait]
impl PublisherFactory for MemoryPublisherFactory {
    async fn create(&self, _config: &serde_json::Value) -> Result<Box<dyn StatePublisher>, Error> {
        Ok(Box::new(MemoryPublisher::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CONTROLLER_KEY, LAST_RESORT_KEY, NetworkPortConfig, last_resort_port_config};
    use chrono::DateTime;

    #[tokio::test]
    async fn test_memory_publisher_roundtrip() {
        let publisher = MemoryPublisher::new();
        assert!(publisher.load_port_config_list().await.unwrap().is_none());

        let dpc = DevicePortConfig::new(
            CONTROLLER_KEY,
            DateTime::from_timestamp(100, 0).unwrap(),
            vec![NetworkPortConfig::dhcp_mgmt("eth0")],
        );
        let list = DevicePortConfigList::new(vec![dpc]);
        publisher.publish_port_config_list(&list).await.unwrap();

        let reader = publisher.clone();
        assert_eq!(reader.load_port_config_list().await.unwrap(), Some(list));
    }

    #[tokio::test]
    async fn test_memory_publisher_unpublish() {
        let publisher = MemoryPublisher::new();
        let fallback = last_resort_port_config(&["eth0".to_string()]);

        publisher.publish_port_config(LAST_RESORT_KEY, &fallback).await.unwrap();
        assert_eq!(publisher.port_config_keys().await, vec![LAST_RESORT_KEY.to_string()]);

        publisher.unpublish_port_config(LAST_RESORT_KEY).await.unwrap();
        assert!(publisher.port_config(LAST_RESORT_KEY).await.is_none());
    }
}
