//! Policy-based routing collaborator
//!
//! Reprograms per-interface routing tables whenever the applied network
//! status settles.

use async_trait::async_trait;

use crate::types::DeviceNetworkStatus;

#[async_trait]
pub trait PolicyRouter: Send + Sync {
    /// Bring routing rules in line with `status`
    async fn update(&self, status: &DeviceNetworkStatus) -> Result<(), crate::Error>;
}

/// Router for hosts where routing is managed elsewhere
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPolicyRouter;

#[async_trait]
impl PolicyRouter for NoopPolicyRouter {
    async fn update(&self, status: &DeviceNetworkStatus) -> Result<(), crate::Error> {
        tracing::trace!("NoopPolicyRouter: {} ports", status.ports.len());
        Ok(())
    }
}
