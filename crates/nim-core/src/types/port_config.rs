// # Device Port Configuration
//
// One candidate network setup (DPC) and its per-port settings.
//
// ## Sources
//
// Candidates arrive from three competing sources, distinguished by `key`:
//
// - `zedagent`: dynamic configuration supplied by the controller
// - `override`: static override from the build or a USB stick file
// - `lastresort`: derived fallback, one DHCP management port per interface
//
// Priority is carried by `time_priority`: newer is better.
//
// ## Test history
//
// The verification loop records `last_succeeded`, `last_failed`,
// `last_ip_and_dns` and `last_error` on the candidate. These fields drive
// the working/untested/testable predicates below and survive content
// edits made by the list editor.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::adapters::AssignableAdapters;

/// Key used by the controller-supplied dynamic configuration
pub const CONTROLLER_KEY: &str = "zedagent";

/// Key used by the static override configuration
pub const OVERRIDE_KEY: &str = "override";

/// Key used by the derived fallback configuration
pub const LAST_RESORT_KEY: &str = "lastresort";

/// Current DPC format version
pub const DPC_VERSION: u32 = 1;

fn default_dpc_version() -> u32 {
    DPC_VERSION
}

/// How address acquisition is configured for a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DhcpType {
    /// Port is not configured for IP
    #[default]
    None,
    /// Statically configured address, gateway and DNS
    Static,
    /// Address acquired by a DHCP client
    Client,
}

/// Address acquisition settings of a port
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DhcpConfig {
    pub dhcp_type: DhcpType,
    /// CIDR address for static configuration (e.g. "192.168.1.10/24")
    #[serde(default)]
    pub addr_subnet: Option<String>,
    #[serde(default)]
    pub gateway: Option<IpAddr>,
    #[serde(default)]
    pub dns_servers: Vec<IpAddr>,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub ntp_server: Option<IpAddr>,
}

/// Kind of wireless uplink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WirelessType {
    #[default]
    None,
    Wifi,
    Cellular,
}

/// One wifi network the port may join
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: String,
    #[serde(default)]
    pub key_scheme: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

/// Cellular modem settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CellularConfig {
    pub apn: String,
}

/// Wireless settings of a port
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WirelessConfig {
    pub kind: WirelessType,
    #[serde(default)]
    pub wifi: Vec<WifiConfig>,
    #[serde(default)]
    pub cellular: Vec<CellularConfig>,
}

impl WirelessConfig {
    /// True when the port is a wifi or cellular uplink
    pub fn is_wireless(&self) -> bool {
        self.kind != WirelessType::None
    }
}

/// Last known test outcome for a single port
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortTestResults {
    #[serde(default)]
    pub last_succeeded: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_failed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: String,
}

impl PortTestResults {
    /// Record a failure for this port
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.last_failed = Some(now);
        self.last_error = error.into();
    }

    /// Record a success for this port
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_succeeded = Some(now);
        self.last_error.clear();
    }
}

/// Per-interface settings within a candidate
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkPortConfig {
    pub if_name: String,
    #[serde(default)]
    pub phy_label: String,
    /// Port may be used to reach the controller
    pub is_mgmt: bool,
    #[serde(default)]
    pub dhcp: DhcpConfig,
    #[serde(default)]
    pub wireless: WirelessConfig,
    /// Not part of content equality
    #[serde(default)]
    pub test_results: PortTestResults,
}

impl NetworkPortConfig {
    /// Management port acquiring its address through DHCP
    pub fn dhcp_mgmt(if_name: impl Into<String>) -> Self {
        let if_name = if_name.into();
        Self {
            phy_label: if_name.clone(),
            if_name,
            is_mgmt: true,
            dhcp: DhcpConfig {
                dhcp_type: DhcpType::Client,
                ..DhcpConfig::default()
            },
            ..Self::default()
        }
    }

    /// Compare everything except recorded test results
    pub fn same_settings(&self, other: &Self) -> bool {
        self.if_name == other.if_name
            && self.phy_label == other.phy_label
            && self.is_mgmt == other.is_mgmt
            && self.dhcp == other.dhcp
            && self.wireless == other.wireless
    }
}

/// A port of a candidate that is currently held by PCI passthrough
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PciBackPort {
    pub if_name: String,
    /// Workload the adapter is assigned to, if any
    pub used_by: Option<uuid::Uuid>,
}

/// A single candidate network configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DevicePortConfig {
    /// Documents without a version are taken as the current format
    #[serde(default = "default_dpc_version")]
    pub version: u32,
    #[serde(default)]
    pub key: String,
    /// Newer is higher priority; the epoch means unset
    #[serde(default)]
    pub time_priority: DateTime<Utc>,
    #[serde(default)]
    pub ports: Vec<NetworkPortConfig>,

    #[serde(default)]
    pub last_failed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_succeeded: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: String,
    /// Last time every management port had both an address and a DNS server
    #[serde(default)]
    pub last_ip_and_dns: Option<DateTime<Utc>>,
}

impl DevicePortConfig {
    /// Create an untested candidate
    pub fn new(
        key: impl Into<String>,
        time_priority: DateTime<Utc>,
        ports: Vec<NetworkPortConfig>,
    ) -> Self {
        Self {
            version: DPC_VERSION,
            key: key.into(),
            time_priority,
            ports,
            ..Self::default()
        }
    }

    /// Fill in fields the publisher may have left empty.
    ///
    /// An empty key is taken from the pub/sub key. When `now` is given an
    /// unset time priority becomes `now`; deletes pass `None` so the
    /// identity of the retracted entry is kept as announced.
    pub fn sanitize(&mut self, key: &str, now: Option<DateTime<Utc>>) {
        if self.key.is_empty() {
            tracing::debug!("DevicePortConfig without key, using {}", key);
            self.key = key.to_string();
        }
        if let Some(now) = now {
            if self.time_priority == DateTime::<Utc>::UNIX_EPOCH {
                tracing::debug!("DevicePortConfig {} without time priority, using {}", self.key, now);
                self.time_priority = now;
            }
        }
    }

    /// Number of ports flagged management-eligible
    pub fn count_mgmt_ports(&self) -> usize {
        self.ports.iter().filter(|p| p.is_mgmt).count()
    }

    /// A candidate without management ports can never be selected
    pub fn is_usable(&self) -> bool {
        self.count_mgmt_ports() > 0
    }

    /// Last success is more recent than any failure
    pub fn was_working(&self) -> bool {
        match (self.last_succeeded, self.last_failed) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(succeeded), Some(failed)) => succeeded > failed,
        }
    }

    /// Never tested
    pub fn is_untested(&self) -> bool {
        self.last_succeeded.is_none() && self.last_failed.is_none()
    }

    /// Eligible for the verification loop.
    ///
    /// Recently failed candidates are skipped until `cooldown` has passed
    /// since the failure.
    pub fn is_testable(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        if !self.is_usable() {
            return false;
        }
        match self.last_failed {
            None => true,
            Some(_) if self.was_working() => true,
            Some(failed) => now.signed_duration_since(failed) > cooldown,
        }
    }

    /// Compare port settings, ignoring time priority and test history
    pub fn same_content(&self, other: &Self) -> bool {
        self.ports.len() == other.ports.len()
            && self
                .ports
                .iter()
                .zip(other.ports.iter())
                .all(|(a, b)| a.same_settings(b))
    }

    /// Exact identity within a list
    pub fn same_identity(&self, other: &Self) -> bool {
        self.version == other.version
            && self.key == other.key
            && self.time_priority == other.time_priority
    }

    /// Carry the test history of `old` over to this candidate
    pub fn inherit_history(&mut self, old: &Self) {
        self.last_failed = old.last_failed;
        self.last_succeeded = old.last_succeeded;
        self.last_error = old.last_error.clone();
        self.last_ip_and_dns = old.last_ip_and_dns;
    }

    /// Record a candidate-level failure
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.last_failed = Some(now);
        self.last_error = error.into();
    }

    /// Record a candidate-level success
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_succeeded = Some(now);
        self.last_error.clear();
    }

    /// Look up a port by interface name
    pub fn port(&self, if_name: &str) -> Option<&NetworkPortConfig> {
        self.ports.iter().find(|p| p.if_name == if_name)
    }

    /// Record an error on the port with the given interface name
    pub fn set_port_error(&mut self, if_name: &str, error: impl Into<String>, now: DateTime<Utc>) {
        if let Some(port) = self.ports.iter_mut().find(|p| p.if_name == if_name) {
            port.test_results.record_failure(error, now);
        }
    }

    /// First port whose adapter is still held by PCI passthrough
    pub fn port_in_pci_back(&self, adapters: &AssignableAdapters) -> Option<PciBackPort> {
        self.ports.iter().find_map(|port| {
            let bundle = adapters.lookup_by_if_name(&port.if_name)?;
            if !bundle.kind.is_net() || !bundle.is_pci_back {
                return None;
            }
            Some(PciBackPort {
                if_name: port.if_name.clone(),
                used_by: bundle.used_by,
            })
        })
    }
}

/// Time priority of the derived fallback: lower than anything announced
pub fn last_resort_time_priority() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Build the fallback candidate: one DHCP management port per interface
pub fn last_resort_port_config(if_names: &[String]) -> DevicePortConfig {
    let ports = if_names
        .iter()
        .map(|name| NetworkPortConfig::dhcp_mgmt(name.clone()))
        .collect();
    DevicePortConfig::new(LAST_RESORT_KEY, last_resort_time_priority(), ports)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    fn dpc() -> DevicePortConfig {
        DevicePortConfig::new(CONTROLLER_KEY, at(10), vec![NetworkPortConfig::dhcp_mgmt("eth0")])
    }

    #[test]
    fn test_working_requires_success_after_failure() {
        let mut c = dpc();
        assert!(!c.was_working());
        assert!(c.is_untested());

        c.last_failed = Some(at(100));
        assert!(!c.was_working());
        assert!(!c.is_untested());

        c.last_succeeded = Some(at(100));
        assert!(!c.was_working(), "equal timestamps are not working");

        c.last_succeeded = Some(at(101));
        assert!(c.was_working());
    }

    #[test]
    fn test_testable_cooldown() {
        let cooldown = Duration::seconds(60);
        let mut c = dpc();
        assert!(c.is_testable(at(0), cooldown));

        c.last_failed = Some(at(100));
        assert!(!c.is_testable(at(130), cooldown));
        assert!(!c.is_testable(at(160), cooldown));
        assert!(c.is_testable(at(161), cooldown));
    }

    #[test]
    fn test_unusable_never_testable() {
        let mut c = dpc();
        c.ports[0].is_mgmt = false;
        assert!(!c.is_usable());
        assert!(!c.is_testable(at(0), Duration::seconds(60)));
    }

    #[test]
    fn test_same_content_ignores_history_and_priority() {
        let a = dpc();
        let mut b = dpc();
        b.time_priority = at(99);
        b.last_failed = Some(at(5));
        b.ports[0].test_results.last_error = "down".to_string();
        assert!(a.same_content(&b));

        b.ports[0].dhcp.dhcp_type = DhcpType::Static;
        assert!(!a.same_content(&b));
    }

    #[test]
    fn test_sanitize_fills_key_and_priority() {
        let mut c = DevicePortConfig::default();
        c.sanitize("override", Some(at(42)));
        assert_eq!(c.key, "override");
        assert_eq!(c.time_priority, at(42));

        let mut d = DevicePortConfig::default();
        d.sanitize("override", None);
        assert_eq!(d.time_priority, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_missing_version_is_current() {
        let parsed: DevicePortConfig =
            serde_json::from_str(r#"{"key":"override","ports":[]}"#).unwrap();
        assert_eq!(parsed.version, DPC_VERSION);

        let old: DevicePortConfig = serde_json::from_str(r#"{"version":0,"key":"override"}"#).unwrap();
        assert_eq!(old.version, 0);
    }

    #[test]
    fn test_last_resort_is_lowest_priority() {
        let lr = last_resort_port_config(&["eth0".to_string(), "eth1".to_string()]);
        assert_eq!(lr.key, LAST_RESORT_KEY);
        assert_eq!(lr.count_mgmt_ports(), 2);
        // Anything announced after 2000 outranks the fallback
        assert!(lr.time_priority < at(1_704_067_200));
        assert!(lr.time_priority > DateTime::<Utc>::UNIX_EPOCH);
    }
}
