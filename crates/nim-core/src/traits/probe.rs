// # Connectivity Probe Trait
//
// Defines the interface for the reachability test against the controller.
//
// ## Implementations
//
// - HTTP(S): `nim-probe-http` crate
//
// ## Usage
//
// ```rust,ignore
// use nim_core::ConnectivityProbe;
//
// let report = probe.verify(&status, 1, Duration::from_secs(15)).await;
// match report.result {
//     Ok(()) => println!("controller reachable"),
//     Err(e) if e.is_remote_temporary() => println!("server side: {e}"),
//     Err(e) => println!("failed: {e}"),
// }
// ```

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::types::DeviceNetworkStatus;

/// Why a reachability test failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The controller answered with a condition expected to be resolved
    /// on the server side (certificate, lockout, overload)
    #[error("remote temporary failure: {0}")]
    RemoteTemporary(String),

    /// No route, connection refused or timed out
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// No management interface has an address to test from
    #[error("no management interface with a usable address")]
    NoUsableInterfaces,

    #[error("{0}")]
    Other(String),
}

impl ProbeError {
    pub fn is_remote_temporary(&self) -> bool {
        matches!(self, ProbeError::RemoteTemporary(_))
    }
}

/// Outcome of the test on a single interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceProbeResult {
    pub if_name: String,
    /// `None` when the interface reached the controller
    pub error: Option<String>,
}

impl InterfaceProbeResult {
    pub fn ok(if_name: impl Into<String>) -> Self {
        Self {
            if_name: if_name.into(),
            error: None,
        }
    }

    pub fn failed(if_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            if_name: if_name.into(),
            error: Some(error.into()),
        }
    }
}

/// Result of one reachability test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub result: Result<(), ProbeError>,
    pub interfaces: Vec<InterfaceProbeResult>,
}

impl ProbeReport {
    pub fn success(interfaces: Vec<InterfaceProbeResult>) -> Self {
        Self {
            result: Ok(()),
            interfaces,
        }
    }

    pub fn failure(error: ProbeError, interfaces: Vec<InterfaceProbeResult>) -> Self {
        Self {
            result: Err(error),
            interfaces,
        }
    }
}

/// Trait for reachability probe implementations
///
/// # Contract
///
/// - Must return within `timeout` per attempted interface
/// - Must only use management ports of `status`
/// - Succeeds when at least `min_working` interfaces reach the controller
/// - Must not retry; retry policy belongs to the verification loop
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Test reachability through the interfaces described by `status`
    async fn verify(
        &self,
        status: &DeviceNetworkStatus,
        min_working: usize,
        timeout: Duration,
    ) -> ProbeReport;

    /// Short name used in logs
    fn probe_name(&self) -> &'static str;
}

/// Helper trait for constructing probes from configuration
pub trait ProbeFactory: Send + Sync {
    fn create(
        &self,
        config: &crate::config::ProbeConfig,
    ) -> Result<Box<dyn ConnectivityProbe>, crate::Error>;
}
