// # Host Provisioner
//
// Drives the host networking tools on behalf of the manager:
//
// - `ip -j addr show` for the live address view
// - `dhcpcd` for DHCP client ports (`-U` dumps the lease for DNS/gateway)
// - `ip addr replace` for static ports
// - wpa_supplicant and APN files for wireless ports
//
// Command output parsing is kept in pure functions so it can be tested
// without touching the host.

use async_trait::async_trait;
use nim_core::traits::{PortProvisioner, ProvisionError};
use nim_core::types::{
    DevicePortConfig, DhcpType, InterfaceState, InterfaceTable, NetworkPortConfig, WirelessConfig,
    WirelessType,
};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Where wireless configuration files are written by default
pub const DEFAULT_RUN_DIR: &str = "/run/nim";

/// Kernel view of network devices
pub const SYS_CLASS_NET: &str = "/sys/class/net";

/// Provisioner backed by `ip`, `dhcpcd` and wpa_supplicant files
#[derive(Debug, Clone)]
pub struct HostProvisioner {
    run_dir: PathBuf,
}

impl HostProvisioner {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    pub fn wpa_conf_path(&self, if_name: &str) -> PathBuf {
        self.run_dir.join(format!("wpa_supplicant.{}.conf", if_name))
    }

    pub fn apn_path(&self, if_name: &str) -> PathBuf {
        self.run_dir.join(format!("{}.apn", if_name))
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<(), nim_core::Error> {
        tokio::fs::create_dir_all(&self.run_dir).await?;
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    async fn start_address(&self, port: &NetworkPortConfig) -> Result<(), ProvisionError> {
        for args in start_commands(port)? {
            run(&port.if_name, &args).await?;
        }
        info!("Started {:?} addressing on {}", port.dhcp.dhcp_type, port.if_name);
        Ok(())
    }

    async fn stop_address(&self, port: &NetworkPortConfig) {
        for args in stop_commands(port) {
            if let Err(e) = run(&port.if_name, &args).await {
                warn!("Failed to stop addressing on {}: {}", port.if_name, e.message);
            }
        }
    }

    async fn lease(&self, if_name: &str) -> (Vec<IpAddr>, Option<IpAddr>) {
        match output(if_name, &["dhcpcd", "-U", if_name]).await {
            Ok(text) => parse_dhcpcd_lease(&text),
            Err(e) => {
                debug!("No lease for {}: {}", if_name, e.message);
                (Vec::new(), None)
            }
        }
    }
}

impl Default for HostProvisioner {
    fn default() -> Self {
        Self::new(DEFAULT_RUN_DIR)
    }
}

#[async_trait]
impl PortProvisioner for HostProvisioner {
    async fn apply_wireless(&self, port: &NetworkPortConfig) -> Result<(), nim_core::Error> {
        match port.wireless.kind {
            WirelessType::Cellular => {
                let apn = port
                    .wireless
                    .cellular
                    .first()
                    .map(|c| c.apn.as_str())
                    .unwrap_or_default();
                self.write_file(&self.apn_path(&port.if_name), apn).await?;
                info!("Installed APN '{}' for {}", apn, port.if_name);
            }
            // Rewritten even for non-wifi ports so a stale file stops being used
            WirelessType::Wifi | WirelessType::None => {
                let conf = render_wpa_supplicant_conf(&port.wireless);
                self.write_file(&self.wpa_conf_path(&port.if_name), &conf).await?;
                info!(
                    "Installed wpa_supplicant config for {} ({} networks)",
                    port.if_name,
                    port.wireless.wifi.len()
                );
            }
        }
        Ok(())
    }

    async fn update_dhcp_client(
        &self,
        new: &DevicePortConfig,
        old: &DevicePortConfig,
    ) -> Result<(), ProvisionError> {
        let (start, stop) = dhcp_changes(new, old);

        for port in stop {
            self.stop_address(port).await;
        }
        for port in start {
            // The device may not have been bound to its driver yet
            run(&port.if_name, &["ip", "link", "show", "dev", &port.if_name])
                .await
                .map_err(|_| ProvisionError::new(&port.if_name, "interface not present"))?;
            if let Some(previous) = old.port(&port.if_name) {
                self.stop_address(previous).await;
            }
            self.start_address(port).await?;
        }
        Ok(())
    }

    async fn interfaces(&self) -> InterfaceTable {
        let text = match output("ip", &["ip", "-j", "addr", "show"]).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to list interface addresses: {}", e.message);
                return InterfaceTable::new();
            }
        };

        let mut table = match parse_ip_addr_json(&text) {
            Ok(table) => table,
            Err(e) => {
                warn!("Failed to parse interface addresses: {}", e);
                return InterfaceTable::new();
            }
        };

        for (if_name, state) in table.iter_mut() {
            let (dns_servers, gateway) = self.lease(if_name).await;
            state.dns_servers = dns_servers;
            state.gateway = gateway;
        }
        table
    }
}

/// Ports whose addressing must be (re)started and ports that went away
pub fn dhcp_changes<'a>(
    new: &'a DevicePortConfig,
    old: &'a DevicePortConfig,
) -> (Vec<&'a NetworkPortConfig>, Vec<&'a NetworkPortConfig>) {
    let start = new
        .ports
        .iter()
        .filter(|port| old.port(&port.if_name).is_none_or(|prev| prev.dhcp != port.dhcp))
        .collect();
    let stop = old
        .ports
        .iter()
        .filter(|port| new.port(&port.if_name).is_none())
        .collect();
    (start, stop)
}

/// Commands that bring up addressing for `port`
pub fn start_commands(port: &NetworkPortConfig) -> Result<Vec<Vec<String>>, ProvisionError> {
    let if_name = port.if_name.as_str();
    let cmd = |args: &[&str]| args.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    match port.dhcp.dhcp_type {
        DhcpType::None => Ok(Vec::new()),
        DhcpType::Client => Ok(vec![
            cmd(&["ip", "link", "set", "dev", if_name, "up"]),
            cmd(&["dhcpcd", "-b", if_name]),
        ]),
        DhcpType::Static => {
            let addr = port
                .dhcp
                .addr_subnet
                .as_deref()
                .filter(|a| !a.is_empty())
                .ok_or_else(|| ProvisionError::new(if_name, "static port without address"))?;
            Ok(vec![
                cmd(&["ip", "link", "set", "dev", if_name, "up"]),
                cmd(&["ip", "addr", "replace", addr, "dev", if_name]),
            ])
        }
    }
}

/// Commands that tear down addressing for `port`
pub fn stop_commands(port: &NetworkPortConfig) -> Vec<Vec<String>> {
    let if_name = port.if_name.clone();
    match port.dhcp.dhcp_type {
        DhcpType::None => Vec::new(),
        DhcpType::Client => vec![vec!["dhcpcd".into(), "-x".into(), if_name]],
        DhcpType::Static => vec![vec![
            "ip".into(),
            "addr".into(),
            "flush".into(),
            "dev".into(),
            if_name,
        ]],
    }
}

#[derive(Debug, Deserialize)]
struct IpLink {
    ifname: String,
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Debug, Deserialize)]
struct IpAddrInfo {
    #[serde(default)]
    local: Option<IpAddr>,
}

/// Parse `ip -j addr show` output, skipping the loopback device
pub fn parse_ip_addr_json(text: &str) -> Result<InterfaceTable, serde_json::Error> {
    let links: Vec<IpLink> = serde_json::from_str(text)?;
    Ok(links
        .into_iter()
        .filter(|link| link.ifname != "lo")
        .map(|link| {
            let addrs = link.addr_info.into_iter().filter_map(|a| a.local).collect();
            (
                link.ifname,
                InterfaceState {
                    addrs,
                    ..InterfaceState::default()
                },
            )
        })
        .collect())
}

/// Extract DNS servers and the router from a `dhcpcd -U` lease dump
pub fn parse_dhcpcd_lease(text: &str) -> (Vec<IpAddr>, Option<IpAddr>) {
    let mut dns_servers = Vec::new();
    let mut gateway = None;

    for line in text.lines() {
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('\'').trim_matches('"');
        let addrs = value.split_whitespace().filter_map(|v| v.parse::<IpAddr>().ok());
        match name.trim() {
            "domain_name_servers" => dns_servers.extend(addrs),
            "routers" => gateway = gateway.or(addrs.into_iter().next()),
            _ => {}
        }
    }
    (dns_servers, gateway)
}

/// wpa_supplicant configuration for the networks of a wifi port
pub fn render_wpa_supplicant_conf(wireless: &WirelessConfig) -> String {
    let mut conf = String::from("# Generated by nimd\nctrl_interface=/run/wpa_supplicant\n");
    if wireless.kind != WirelessType::Wifi {
        return conf;
    }
    for wifi in &wireless.wifi {
        conf.push_str("network={\n");
        conf.push_str(&format!("    ssid=\"{}\"\n", wifi.ssid));
        match wifi.key_scheme.as_deref() {
            Some(scheme) if !scheme.is_empty() => {
                conf.push_str(&format!("    key_mgmt={}\n", scheme));
            }
            _ => conf.push_str("    key_mgmt=NONE\n"),
        }
        conf.push_str(&format!("    priority={}\n", wifi.priority));
        conf.push_str("}\n");
    }
    conf
}

/// Physical network devices under `sys_class_net`, sorted by name
///
/// Only entries backed by a device (`<name>/device`) count; bridges,
/// tunnels and loopback are left out of the fallback candidate.
pub async fn raw_interfaces(sys_class_net: impl AsRef<Path>) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(sys_class_net).await?;
    while let Some(entry) = entries.next_entry().await? {
        if tokio::fs::metadata(entry.path().join("device")).await.is_ok() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

async fn run<S: AsRef<str>>(if_name: &str, args: &[S]) -> Result<(), ProvisionError> {
    output(if_name, args).await.map(|_| ())
}

async fn output<S: AsRef<str>>(if_name: &str, args: &[S]) -> Result<String, ProvisionError> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| ProvisionError::new(if_name, "empty command"))?;
    debug!(
        "Running {} {}",
        program.as_ref(),
        rest.iter().map(|a| a.as_ref()).collect::<Vec<_>>().join(" ")
    );

    let out = Command::new(program.as_ref())
        .args(rest.iter().map(|a| a.as_ref()))
        .output()
        .await
        .map_err(|e| ProvisionError::new(if_name, format!("{}: {}", program.as_ref(), e)))?;

    if !out.status.success() {
        return Err(ProvisionError::new(
            if_name,
            format!(
                "{} exited with {}: {}",
                program.as_ref(),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            ),
        ));
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}
