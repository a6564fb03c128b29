// # HTTP Reachability Probe
//
// This crate provides the HTTP(S) reachability probe for the NIM
// verification engine.
//
// ## Behavior
//
// For each management port of the status under test that has a usable
// address, a GET is sent to the controller URL with the request bound to
// that address, so the test exercises the port and not whatever the
// default route happens to be. Interfaces are tried in order until
// `min_working` of them succeed.
//
// ## Classification
//
// - 2xx: the interface works
// - 403, 429, 503: server-side condition (`RemoteTemporary`); the
//   verification loop keeps waiting without counting a retry
// - connect errors and timeouts: `Unreachable`
// - anything else: `Other`

use nim_core::CollaboratorRegistry;
use nim_core::config::ProbeConfig;
use nim_core::traits::{
    ConnectivityProbe, InterfaceProbeResult, ProbeError, ProbeFactory, ProbeReport,
};
use nim_core::types::DeviceNetworkStatus;
use nim_core::{Error, Result};

use reqwest::StatusCode;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// User agent sent when none is configured
const DEFAULT_USER_AGENT: &str = concat!("nim/", env!("CARGO_PKG_VERSION"));

/// Reachability probe over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpConnectivityProbe {
    /// Controller URL to GET
    url: String,

    user_agent: String,
}

impl HttpConnectivityProbe {
    /// Create a new probe
    ///
    /// # Parameters
    ///
    /// - `url`: Controller URL (e.g., "https://controller.example/api/v2/edgedevice/ping")
    /// - `user_agent`: User agent header, defaults to "nim/<version>"
    pub fn new(url: impl Into<String>, user_agent: Option<String>) -> Self {
        Self {
            url: url.into(),
            user_agent: user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One GET through `local`
    async fn check(&self, local: IpAddr, timeout: Duration) -> std::result::Result<(), ProbeError> {
        let client = reqwest::Client::builder()
            .local_address(local)
            .timeout(timeout)
            .user_agent(self.user_agent.as_str())
            .no_proxy()
            .build()
            .map_err(|e| ProbeError::Other(format!("Failed to build HTTP client: {}", e)))?;

        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| classify_error(&e))?;

        match classify_status(response.status()) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

/// Map a response status to a probe error; `None` means success
pub fn classify_status(status: StatusCode) -> Option<ProbeError> {
    if status.is_success() {
        return None;
    }
    match status {
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN => {
            Some(ProbeError::RemoteTemporary(format!("HTTP {}", status)))
        }
        _ => Some(ProbeError::Other(format!("HTTP {}", status))),
    }
}

fn classify_error(err: &reqwest::Error) -> ProbeError {
    if err.is_connect() || err.is_timeout() {
        ProbeError::Unreachable(err.to_string())
    } else {
        ProbeError::Other(err.to_string())
    }
}

#[async_trait::async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn verify(
        &self,
        status: &DeviceNetworkStatus,
        min_working: usize,
        timeout: Duration,
    ) -> ProbeReport {
        let mut interfaces = Vec::new();
        let mut working = 0;
        let mut last_error = None;

        for port in status.mgmt_ports() {
            let Some(local) = port.usable_addrs().next().copied() else {
                debug!("http probe: {} has no usable address", port.if_name);
                continue;
            };

            match self.check(local, timeout).await {
                Ok(()) => {
                    info!("http probe: {} reached {}", port.if_name, self.url);
                    interfaces.push(InterfaceProbeResult::ok(&port.if_name));
                    working += 1;
                    if working >= min_working {
                        return ProbeReport::success(interfaces);
                    }
                }
                Err(e) => {
                    warn!("http probe: {} via {}: {}", port.if_name, local, e);
                    interfaces.push(InterfaceProbeResult::failed(&port.if_name, e.to_string()));
                    last_error = Some(e);
                }
            }
        }

        // A server-side condition on any interface wins over local failures
        let error = match last_error {
            None if interfaces.is_empty() => ProbeError::NoUsableInterfaces,
            None => ProbeError::Other(format!(
                "only {} of {} required interfaces working",
                working, min_working
            )),
            Some(e) => interfaces
                .iter()
                .filter_map(|r| r.error.as_deref())
                .find(|msg| msg.starts_with("remote temporary failure"))
                .map(|msg| ProbeError::RemoteTemporary(msg.to_string()))
                .unwrap_or(e),
        };
        ProbeReport::failure(error, interfaces)
    }

    fn probe_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP probes
pub struct HttpProbeFactory;

impl ProbeFactory for HttpProbeFactory {
    fn create(&self, config: &ProbeConfig) -> Result<Box<dyn ConnectivityProbe>> {
        match config {
            ProbeConfig::Http { url, user_agent } => {
                config.validate()?;
                Ok(Box::new(HttpConnectivityProbe::new(url.clone(), user_agent.clone())))
            }
            _ => Err(Error::config("Invalid config for HTTP probe")),
        }
    }
}

/// Register the HTTP probe with a registry
///
/// # Example
///
/// ```rust
/// use nim_core::CollaboratorRegistry;
///
/// let registry = CollaboratorRegistry::new();
/// nim_probe_http::register(&registry);
/// assert!(registry.has_probe("http"));
/// ```
pub fn register(registry: &CollaboratorRegistry) {
    registry.register_probe("http", Box::new(HttpProbeFactory));
}
