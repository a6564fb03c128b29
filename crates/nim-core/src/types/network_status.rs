// # Device Network Status
//
// Derived projection of a candidate: per-interface addresses, DNS servers
// and management eligibility, plus a flag telling consumers whether the
// status is settled or a reachability test is still running.
//
// Derivation is pure: the live interface state is passed in as an
// `InterfaceTable` gathered from the provisioner.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

use super::port_config::{DevicePortConfig, DhcpType};

/// Live state of one interface as seen by the host
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterfaceState {
    pub addrs: Vec<IpAddr>,
    /// DNS servers learned from the DHCP lease
    #[serde(default)]
    pub dns_servers: Vec<IpAddr>,
    #[serde(default)]
    pub gateway: Option<IpAddr>,
}

/// Live interface states keyed by interface name
pub type InterfaceTable = BTreeMap<String, InterfaceState>;

/// Status of a single port
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkPortStatus {
    pub if_name: String,
    #[serde(default)]
    pub phy_label: String,
    pub is_mgmt: bool,
    pub dhcp_type: DhcpType,
    #[serde(default)]
    pub addrs: Vec<IpAddr>,
    #[serde(default)]
    pub dns_servers: Vec<IpAddr>,
    #[serde(default)]
    pub gateway: Option<IpAddr>,
    #[serde(default)]
    pub last_error: String,
}

impl NetworkPortStatus {
    /// Addresses usable for reaching the controller
    pub fn usable_addrs(&self) -> impl Iterator<Item = &IpAddr> {
        self.addrs.iter().filter(|a| !is_link_local(a))
    }
}

/// Network status published under key "global"
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceNetworkStatus {
    #[serde(default)]
    pub version: u32,
    /// A reachability test is in progress; consumers must treat the
    /// status as transient
    #[serde(default)]
    pub testing: bool,
    #[serde(default)]
    pub ports: Vec<NetworkPortStatus>,
}

impl DeviceNetworkStatus {
    /// Derive the status a candidate produces given the live interfaces
    pub fn derive(dpc: &DevicePortConfig, interfaces: &InterfaceTable) -> Self {
        let ports = dpc
            .ports
            .iter()
            .map(|port| {
                let live = interfaces.get(&port.if_name).cloned().unwrap_or_default();
                let (dns_servers, gateway) = match port.dhcp.dhcp_type {
                    DhcpType::Static => (port.dhcp.dns_servers.clone(), port.dhcp.gateway),
                    DhcpType::Client => (live.dns_servers.clone(), live.gateway),
                    DhcpType::None => (Vec::new(), None),
                };
                NetworkPortStatus {
                    if_name: port.if_name.clone(),
                    phy_label: port.phy_label.clone(),
                    is_mgmt: port.is_mgmt,
                    dhcp_type: port.dhcp.dhcp_type,
                    addrs: live.addrs,
                    dns_servers,
                    gateway,
                    last_error: port.test_results.last_error.clone(),
                }
            })
            .collect();

        Self {
            version: dpc.version,
            testing: false,
            ports,
        }
    }

    /// Management ports in interface order
    pub fn mgmt_ports(&self) -> impl Iterator<Item = &NetworkPortStatus> {
        self.ports.iter().filter(|p| p.is_mgmt)
    }

    /// Count of non-link-local addresses on all ports
    pub fn count_usable_addrs(&self) -> usize {
        self.ports.iter().map(|p| p.usable_addrs().count()).sum()
    }

    /// Count of DNS servers on all ports
    pub fn count_dns_servers(&self) -> usize {
        self.ports.iter().map(|p| p.dns_servers.len()).sum()
    }

    /// DNS servers of the management ports, in interface order, duplicates kept
    pub fn mgmt_dns_servers(&self) -> Vec<IpAddr> {
        self.mgmt_ports()
            .flat_map(|p| p.dns_servers.iter().copied())
            .collect()
    }

    /// Every management port has at least one usable address and one DNS server
    pub fn mgmt_ports_have_ip_and_dns(&self) -> bool {
        let mut mgmt = self.mgmt_ports().peekable();
        if mgmt.peek().is_none() {
            return false;
        }
        mgmt.all(|p| p.usable_addrs().next().is_some() && !p.dns_servers.is_empty())
    }
}

fn is_link_local(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}
