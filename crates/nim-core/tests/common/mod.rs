//! Test doubles and common utilities for contract tests
//!
//! The doubles are cheap to clone and share their state between clones, so
//! a test keeps one handle for assertions and gives another to the manager.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nim_core::config::{NimConfig, ProbeConfig};
use nim_core::engine::{DpcManager, ManagerEvent};
use nim_core::error::Result;
use nim_core::state::MemoryPublisher;
use nim_core::traits::{
    ConnectivityProbe, InterfaceProbeResult, ManualClock, PolicyRouter, PortProvisioner,
    ProbeError, ProbeReport, ProvisionError, StatePublisher,
};
use nim_core::types::{
    DeviceNetworkStatus, DevicePortConfig, DevicePortConfigList, InterfaceState, InterfaceTable,
    NetworkPortConfig,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Wall time the manual clock starts at (2024-01-01T00:00:00Z)
pub const BASE_SECS: i64 = 1_704_067_200;

/// `secs` after the test epoch
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(BASE_SECS + secs, 0).unwrap()
}

/// Candidate with one DHCP management port
pub fn dpc(key: &str, secs: i64, if_name: &str) -> DevicePortConfig {
    DevicePortConfig::new(key, at(secs), vec![NetworkPortConfig::dhcp_mgmt(if_name)])
}

/// Reachability probe answering per interface.
///
/// Interfaces without a scripted result succeed. Mirrors the real probe:
/// no management address at all is `NoUsableInterfaces`, and the test
/// passes as soon as `min_working` interfaces succeed.
#[derive(Clone, Default)]
pub struct ScriptedProbe {
    results: Arc<Mutex<HashMap<String, ProbeError>>>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make tests through `if_name` fail with `error`
    pub fn fail(&self, if_name: &str, error: ProbeError) {
        self.results.lock().unwrap().insert(if_name.to_string(), error);
    }

    pub fn succeed(&self, if_name: &str) {
        self.results.lock().unwrap().remove(if_name);
    }

    /// Management interfaces of every probe call, in call order
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ConnectivityProbe for ScriptedProbe {
    async fn verify(
        &self,
        status: &DeviceNetworkStatus,
        min_working: usize,
        _timeout: Duration,
    ) -> ProbeReport {
        let mgmt: Vec<String> = status.mgmt_ports().map(|p| p.if_name.clone()).collect();
        self.calls.lock().unwrap().push(mgmt);

        let results = self.results.lock().unwrap().clone();
        let mut interfaces = Vec::new();
        let mut working = 0;
        let mut last_error = None;
        for port in status.mgmt_ports() {
            if port.usable_addrs().next().is_none() {
                continue;
            }
            match results.get(&port.if_name) {
                Some(err) => {
                    interfaces.push(InterfaceProbeResult::failed(&port.if_name, err.to_string()));
                    last_error = Some(err.clone());
                }
                None => {
                    interfaces.push(InterfaceProbeResult::ok(&port.if_name));
                    working += 1;
                }
            }
        }

        if interfaces.is_empty() {
            return ProbeReport::failure(ProbeError::NoUsableInterfaces, interfaces);
        }
        if working >= min_working {
            return ProbeReport::success(interfaces);
        }
        let error = last_error.unwrap_or_else(|| ProbeError::Other("not enough working ports".into()));
        ProbeReport::failure(error, interfaces)
    }

    fn probe_name(&self) -> &'static str {
        "scripted"
    }
}

/// Provisioner over a mutable interface table
#[derive(Clone, Default)]
pub struct ScriptedProvisioner {
    table: Arc<Mutex<InterfaceTable>>,
    /// Remaining bind failures per interface
    bind_failures: Arc<Mutex<HashMap<String, usize>>>,
    dhcp_updates: Arc<AtomicUsize>,
    wireless_updates: Arc<AtomicUsize>,
}

impl ScriptedProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `if_name` an address and a leased DNS server
    pub fn lease(&self, if_name: &str, addr: &str, dns: &str) {
        self.table.lock().unwrap().insert(
            if_name.to_string(),
            InterfaceState {
                addrs: vec![addr.parse().unwrap()],
                dns_servers: vec![dns.parse().unwrap()],
                gateway: Some(dns.parse().unwrap()),
            },
        );
    }

    pub fn release(&self, if_name: &str) {
        self.table.lock().unwrap().remove(if_name);
    }

    /// Fail the next `count` DHCP client updates touching `if_name`
    pub fn fail_bind(&self, if_name: &str, count: usize) {
        self.bind_failures.lock().unwrap().insert(if_name.to_string(), count);
    }

    pub fn dhcp_update_count(&self) -> usize {
        self.dhcp_updates.load(Ordering::SeqCst)
    }

    pub fn wireless_update_count(&self) -> usize {
        self.wireless_updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortProvisioner for ScriptedProvisioner {
    async fn apply_wireless(&self, _port: &NetworkPortConfig) -> Result<()> {
        self.wireless_updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_dhcp_client(
        &self,
        new: &DevicePortConfig,
        _old: &DevicePortConfig,
    ) -> std::result::Result<(), ProvisionError> {
        self.dhcp_updates.fetch_add(1, Ordering::SeqCst);
        let mut failures = self.bind_failures.lock().unwrap();
        for port in &new.ports {
            if let Some(remaining) = failures.get_mut(&port.if_name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ProvisionError::new(&port.if_name, "interface not bound"));
                }
            }
        }
        Ok(())
    }

    async fn interfaces(&self) -> InterfaceTable {
        self.table.lock().unwrap().clone()
    }
}

/// Publisher that counts calls and keeps every status it was given
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    store: MemoryPublisher,
    list_publishes: Arc<AtomicUsize>,
    flushes: Arc<AtomicUsize>,
    statuses: Arc<Mutex<Vec<DeviceNetworkStatus>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Underlying storage, shared with the manager
    pub fn store(&self) -> &MemoryPublisher {
        &self.store
    }

    /// Seed the list the manager ingests on startup
    pub async fn preload(&self, list: DevicePortConfigList) {
        self.store.publish_port_config_list(&list).await.unwrap();
    }

    pub async fn published_list(&self) -> Option<DevicePortConfigList> {
        self.store.load_port_config_list().await.unwrap()
    }

    pub fn list_publish_count(&self) -> usize {
        self.list_publishes.load(Ordering::SeqCst)
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn statuses(&self) -> Vec<DeviceNetworkStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn last_status(&self) -> Option<DeviceNetworkStatus> {
        self.statuses.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl StatePublisher for RecordingPublisher {
    async fn publish_port_config_list(&self, list: &DevicePortConfigList) -> Result<()> {
        self.list_publishes.fetch_add(1, Ordering::SeqCst);
        self.store.publish_port_config_list(list).await
    }

    async fn load_port_config_list(&self) -> Result<Option<DevicePortConfigList>> {
        self.store.load_port_config_list().await
    }

    async fn publish_network_status(&self, status: &DeviceNetworkStatus) -> Result<()> {
        self.statuses.lock().unwrap().push(status.clone());
        self.store.publish_network_status(status).await
    }

    async fn network_status(&self) -> Result<Option<DeviceNetworkStatus>> {
        self.store.network_status().await
    }

    async fn publish_port_config(&self, key: &str, dpc: &DevicePortConfig) -> Result<()> {
        self.store.publish_port_config(key, dpc).await
    }

    async fn unpublish_port_config(&self, key: &str) -> Result<()> {
        self.store.unpublish_port_config(key).await
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Router that only counts updates
#[derive(Clone, Default)]
pub struct CountingRouter {
    updates: Arc<AtomicUsize>,
}

impl CountingRouter {
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyRouter for CountingRouter {
    async fn update(&self, _status: &DeviceNetworkStatus) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Helper to create a minimal NimConfig for testing
pub fn minimal_config(resolv_conf_path: PathBuf) -> NimConfig {
    let mut config = NimConfig::new(ProbeConfig::Http {
        url: "https://controller.example/api/v2/edgedevice/ping".to_string(),
        user_agent: None,
    });
    config.resolv_conf_path = resolv_conf_path;
    config.verify.max_retest_count = 3;
    config.event_channel_capacity = 1000;
    config
}

/// A manager wired to test doubles
pub struct Harness {
    pub manager: DpcManager,
    pub events: mpsc::Receiver<ManagerEvent>,
    pub probe: ScriptedProbe,
    pub provisioner: ScriptedProvisioner,
    pub publisher: RecordingPublisher,
    pub router: CountingRouter,
    pub clock: ManualClock,
    pub resolv_conf: PathBuf,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Build with `tweak` applied to the minimal config
    pub fn with_config(tweak: impl FnOnce(&mut NimConfig)) -> Self {
        Self::with_publisher(RecordingPublisher::new(), tweak)
    }

    pub fn with_publisher(publisher: RecordingPublisher, tweak: impl FnOnce(&mut NimConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let resolv_conf = dir.path().join("resolv.conf");
        let mut config = minimal_config(resolv_conf.clone());
        tweak(&mut config);

        let probe = ScriptedProbe::new();
        let provisioner = ScriptedProvisioner::new();
        let router = CountingRouter::default();
        let clock = ManualClock::new(at(0));

        let (manager, events) = DpcManager::new(
            Box::new(probe.clone()),
            Box::new(provisioner.clone()),
            Box::new(publisher.clone()),
            config,
        )
        .expect("manager construction succeeds");
        let manager = manager
            .with_router(Box::new(router.clone()))
            .with_clock(Arc::new(clock.clone()));

        Self {
            manager,
            events,
            probe,
            provisioner,
            publisher,
            router,
            clock,
            resolv_conf,
            _dir: dir,
        }
    }

    /// Events emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<ManagerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub fn resolv_conf_text(&self) -> String {
        std::fs::read_to_string(&self.resolv_conf).unwrap_or_default()
    }

    /// Move the clock forward by `secs`
    pub fn advance(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }
}

/// Outcomes in emission order
pub fn outcomes(events: &[ManagerEvent]) -> Vec<nim_core::verify::VerifyOutcome> {
    events
        .iter()
        .filter_map(|e| match e {
            ManagerEvent::Outcome { outcome, .. } => Some(*outcome),
            _ => None,
        })
        .collect()
}

/// Indices of started verifications in emission order
pub fn started(events: &[ManagerEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            ManagerEvent::VerificationStarted { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}
