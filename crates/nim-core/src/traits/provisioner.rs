// # Port Provisioner Trait
//
// Low-level interface management: wireless credentials, the address
// acquisition client, and the live view of interface addresses.
//
// The verification loop only calls into the provisioner when the candidate
// under test differs from the one applied before, so implementations see
// one `update_dhcp_client` per configuration change.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{DevicePortConfig, InterfaceTable, NetworkPortConfig};

/// Failure to bind or configure an interface
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("interface {if_name}: {message}")]
pub struct ProvisionError {
    pub if_name: String,
    pub message: String,
}

impl ProvisionError {
    pub fn new(if_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            if_name: if_name.into(),
            message: message.into(),
        }
    }
}

/// Trait for interface provisioning implementations
#[async_trait]
pub trait PortProvisioner: Send + Sync {
    /// Install wifi or cellular settings for `port`
    async fn apply_wireless(&self, port: &NetworkPortConfig) -> Result<(), crate::Error>;

    /// Reconfigure the address acquisition client for ports that differ
    /// between `old` and `new`.
    ///
    /// An error means an interface could not be bound yet; the caller
    /// retries a bounded number of times.
    async fn update_dhcp_client(
        &self,
        new: &DevicePortConfig,
        old: &DevicePortConfig,
    ) -> Result<(), ProvisionError>;

    /// Current addresses, leased DNS servers and gateways per interface
    async fn interfaces(&self) -> InterfaceTable;
}
