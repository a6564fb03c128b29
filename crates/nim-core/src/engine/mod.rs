//! Device port configuration manager
//!
//! The DpcManager is responsible for:
//! - Merging configuration notifications into the priority list
//! - Driving verification of one candidate at a time
//! - Committing the working candidate and its network status
//! - Regenerating the resolver configuration and routing on change
//!
//! ## Architecture
//!
//! ```text
//!  NimEvent ──► ┌────────────┐
//!  (config,     │ DpcManager │──► ManagerEvent (monitoring)
//!   adapters,   └────────────┘
//!   timers)           │
//!      ┌──────────────┼───────────────┬───────────────┐
//!      ▼              ▼               ▼               ▼
//! ┌──────────┐ ┌─────────────┐ ┌─────────────┐ ┌────────────────┐
//! │ Probe    │ │ Provisioner │ │ Publisher   │ │ resolv.conf +  │
//! │ (verify) │ │ (dhcp/wifi) │ │ (list, DNS) │ │ PolicyRouter   │
//! └──────────┘ └─────────────┘ └─────────────┘ └────────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. A configuration change is merged into the list by the editor
//! 2. Verification restarts from the highest priority testable entry
//! 3. Each outcome republishes the status with `testing` set
//! 4. SUCCESS commits the candidate, FAIL advances, WAIT arms the retest
//!    timer, PCI_WAIT waits for the next adapter update
//!
//! All state is owned by the manager and mutated through `&mut self` from
//! a single task, so an edit can never interleave with a running probe.

pub mod timers;

pub use timers::{TimerKind, TimerSet};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::{NimConfig, TimerConfig, VerifyConfig};
use crate::error::Result;
use crate::list::{EditKind, apply_update, compress};
use crate::resolv::ResolvConfWriter;
use crate::traits::{
    Clock, ConnectivityProbe, GLOBAL_KEY, NoopPolicyRouter, PolicyRouter, PortProvisioner,
    StatePublisher, SystemClock,
};
use crate::types::{
    AssignableAdapters, DeviceNetworkStatus, DevicePortConfig, DevicePortConfigList,
    LAST_RESORT_KEY, last_resort_port_config,
};
use crate::verify::{self, DpcPending, VerifyContext, VerifyOutcome, VerifySettings};

/// Inbound events, delivered one at a time
#[derive(Debug, Clone, PartialEq)]
pub enum NimEvent {
    /// A configuration source published or updated a candidate
    PortConfigModify { key: String, config: DevicePortConfig },

    /// A configuration source retracted a candidate
    PortConfigDelete { key: String, config: DevicePortConfig },

    /// The assignable adapter list was replaced
    AssignableAdaptersModify { key: String, adapters: AssignableAdapters },

    AssignableAdaptersDelete { key: String },

    /// An interface gained or lost an address
    AddressChange { if_name: String },

    /// A timer expired
    Timer(TimerKind),
}

/// Events emitted by the DpcManager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// Manager started
    Started { candidates: usize },

    /// Verification of the entry at `index` began
    VerificationStarted { index: usize, key: String },

    /// One test finished
    Outcome { index: usize, outcome: VerifyOutcome },

    /// A candidate was committed as the applied configuration
    Selected { index: usize, key: String },

    /// No entry is eligible for testing
    NothingTestable,

    /// The (compressed) list was published
    ListPublished { len: usize },

    /// Manager stopped
    Stopped { reason: String },
}

/// Orchestration context of the verification loop
///
/// ## Lifecycle
///
/// 1. Create with [`DpcManager::new()`]
/// 2. Load the persisted list with [`DpcManager::ingest_port_config_list()`]
/// 3. Drive with [`DpcManager::run()`] or by calling
///    [`DpcManager::handle_event()`] directly
pub struct DpcManager {
    probe: Box<dyn ConnectivityProbe>,
    provisioner: Box<dyn PortProvisioner>,
    publisher: Box<dyn StatePublisher>,
    router: Box<dyn PolicyRouter>,
    clock: Arc<dyn Clock>,

    list: DevicePortConfigList,
    /// Applied candidate and its status
    current_dpc: Option<DevicePortConfig>,
    status: DeviceNetworkStatus,
    adapters: AssignableAdapters,
    pending: DpcPending,
    timers: TimerSet,
    resolv: ResolvConfWriter,
    usable_address_count: usize,
    cloud_connectivity_works: bool,

    timer_config: TimerConfig,
    verify_config: VerifyConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ManagerEvent>,
}

impl DpcManager {
    /// Create a new manager
    ///
    /// # Returns
    ///
    /// A tuple of (manager, event_receiver) where event_receiver yields manager events
    pub fn new(
        probe: Box<dyn ConnectivityProbe>,
        provisioner: Box<dyn PortProvisioner>,
        publisher: Box<dyn StatePublisher>,
        config: NimConfig,
    ) -> Result<(Self, mpsc::Receiver<ManagerEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let manager = Self {
            probe,
            provisioner,
            publisher,
            router: Box::new(NoopPolicyRouter),
            clock: Arc::new(SystemClock),
            list: DevicePortConfigList::default(),
            current_dpc: None,
            status: DeviceNetworkStatus::default(),
            adapters: AssignableAdapters::default(),
            pending: DpcPending::default(),
            timers: TimerSet::new(),
            resolv: ResolvConfWriter::new(config.resolv_conf_path),
            usable_address_count: 0,
            cloud_connectivity_works: false,
            timer_config: config.timers,
            verify_config: config.verify,
            event_tx: tx,
        };

        Ok((manager, rx))
    }

    /// Use `router` for policy-based routing updates
    pub fn with_router(mut self, router: Box<dyn PolicyRouter>) -> Self {
        self.router = router;
        self
    }

    /// Use `clock` as the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn port_config_list(&self) -> &DevicePortConfigList {
        &self.list
    }

    /// Applied network status
    pub fn network_status(&self) -> &DeviceNetworkStatus {
        &self.status
    }

    /// Applied candidate
    pub fn current_port_config(&self) -> Option<&DevicePortConfig> {
        self.current_dpc.as_ref()
    }

    pub fn pending(&self) -> &DpcPending {
        &self.pending
    }

    pub fn is_verifying(&self) -> bool {
        self.pending.in_progress
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    pub fn assignable_adapters(&self) -> &AssignableAdapters {
        &self.adapters
    }

    /// The controller was reached by the applied configuration
    pub fn cloud_connectivity_works(&self) -> bool {
        self.cloud_connectivity_works
    }

    /// Dispatch one inbound event
    pub async fn handle_event(&mut self, event: NimEvent) {
        match event {
            NimEvent::PortConfigModify { key, config } => self.handle_dpc_modify(&key, config).await,
            NimEvent::PortConfigDelete { key, config } => self.handle_dpc_delete(&key, config).await,
            NimEvent::AssignableAdaptersModify { key, adapters } => {
                self.handle_assignable_adapters_modify(&key, adapters).await
            }
            NimEvent::AssignableAdaptersDelete { key } => self.handle_assignable_adapters_delete(&key),
            NimEvent::AddressChange { if_name } => self.handle_address_change(&if_name).await,
            NimEvent::Timer(kind) => self.handle_timer(kind).await,
        }
    }

    /// Load the list published before a restart.
    ///
    /// Entries without management ports are dropped; they may come back
    /// from their source later but are not in the way during boot.
    pub async fn ingest_port_config_list(&mut self) {
        let stored = match self.publisher.load_port_config_list().await {
            Ok(Some(list)) => list,
            Ok(None) => {
                info!("ingest_port_config_list: no persisted list");
                DevicePortConfigList::default()
            }
            Err(e) => {
                error!("ingest_port_config_list: failed to load: {}", e);
                DevicePortConfigList::default()
            }
        };

        let kept = stored
            .port_configs
            .into_iter()
            .filter(|dpc| {
                let usable = dpc.is_usable();
                if !usable {
                    warn!("Stored DevicePortConfig key {} has no management ports; ignored", dpc.key);
                }
                usable
            })
            .collect();

        self.list = DevicePortConfigList::new(kept);
        self.compress_and_publish().await;
        self.list.current_index = None;
        info!("ingest_port_config_list: {} candidates", self.list.len());
    }

    /// Handle a new or updated candidate
    pub async fn handle_dpc_modify(&mut self, key: &str, mut config: DevicePortConfig) {
        config.sanitize(key, Some(self.clock.now()));
        if config.count_mgmt_ports() == 0 {
            warn!(
                "Received DevicePortConfig key {} has no management ports; will be ignored",
                config.key
            );
        }

        let changed = apply_update(&mut self.list, &config, EditKind::Update);
        if changed {
            self.compress_and_publish().await;
        }

        // A freshly booted device may see a configuration it already has in
        // the persisted list; without a usable status it must still test.
        if !changed
            && self.status.count_usable_addrs() > 0
            && self.status.count_dns_servers() > 0
            && self.list.current_index.is_some()
        {
            info!("handle_dpc_modify: config already current, nothing to do");
            return;
        }

        self.restart_verify("handle_dpc_modify").await;
    }

    /// Handle a retracted candidate
    pub async fn handle_dpc_delete(&mut self, key: &str, mut config: DevicePortConfig) {
        config.sanitize(key, None);

        if !apply_update(&mut self.list, &config, EditKind::Delete) {
            info!("handle_dpc_delete: {} not changed", key);
            return;
        }
        self.compress_and_publish().await;
        self.restart_verify("handle_dpc_delete").await;
    }

    /// Replace the assignable adapters and resume a verification waiting
    /// for a port to leave PCI passthrough
    pub async fn handle_assignable_adapters_modify(&mut self, key: &str, adapters: AssignableAdapters) {
        if key != GLOBAL_KEY {
            debug!("handle_assignable_adapters_modify: ignoring {}", key);
            return;
        }

        for bundle in adapters.bundles.iter().filter(|b| b.kind.is_net()) {
            let unchanged = self
                .adapters
                .lookup_by_phy_label(&bundle.phy_label)
                .is_some_and(|current| current.is_pci_back == bundle.is_pci_back);
            if unchanged {
                continue;
            }
            if bundle.is_pci_back {
                info!("adapter {} changed to PCIBack", bundle.phy_label);
            } else {
                info!("adapter {} released from PCIBack", bundle.phy_label);
            }
        }

        self.adapters = adapters;
        self.verify_device_port_config().await;
    }

    pub fn handle_assignable_adapters_delete(&mut self, key: &str) {
        // Adapter assignment only changes across restarts
        info!("handle_assignable_adapters_delete: {}", key);
    }

    /// An interface address changed: resume a waiting verification, or
    /// refresh the applied status
    pub async fn handle_address_change(&mut self, if_name: &str) {
        debug!("handle_address_change: {}", if_name);
        if self.pending.in_progress {
            self.verify_device_port_config().await;
            return;
        }

        let Some(current) = &self.current_dpc else {
            return;
        };
        let interfaces = self.provisioner.interfaces().await;
        let status = DeviceNetworkStatus::derive(current, &interfaces);
        if status == self.status {
            return;
        }
        info!("handle_address_change: status changed by {}", if_name);
        self.status = status;
        self.do_dns_update().await;
    }

    async fn handle_timer(&mut self, kind: TimerKind) {
        debug!("timer {} fired", kind);
        match kind {
            TimerKind::Retest => {
                if self.pending.in_progress {
                    self.verify_device_port_config().await;
                }
            }
            TimerKind::NetworkTest => self.network_test().await,
            TimerKind::NetworkTestBetter => {
                if self.pending.in_progress || self.list.current_index == Some(0) {
                    debug!("network-test-better: nothing to do");
                    return;
                }
                self.restart_verify("network-test-better").await;
            }
        }
    }

    /// Periodic re-test of the applied status
    async fn network_test(&mut self) {
        if self.pending.in_progress {
            return;
        }
        if self.list.current_index.is_none() {
            self.restart_verify("network-test").await;
            return;
        }

        let report = self
            .probe
            .verify(
                &self.status,
                self.verify_config.min_working_mgmt_ports,
                self.timer_config.test_send_timeout(),
            )
            .await;
        match report.result {
            Ok(()) => {
                debug!("network-test: applied configuration still works");
                self.cloud_connectivity_works = true;
                self.arm(TimerKind::NetworkTest, self.timer_config.network_test_interval());
            }
            Err(e) if e.is_remote_temporary() => {
                warn!("network-test: remote temporary failure: {}", e);
                self.arm(TimerKind::NetworkTest, self.timer_config.network_test_interval());
            }
            Err(e) => {
                warn!("network-test: applied configuration failed: {}", e);
                self.cloud_connectivity_works = false;
                self.restart_verify("network-test").await;
            }
        }
    }

    /// Start verification from the highest priority testable entry.
    ///
    /// No-op while a verification is in progress.
    pub async fn restart_verify(&mut self, caller: &str) {
        info!("restart_verify: requested by {}", caller);
        if self.pending.in_progress {
            info!("restart_verify: verification in progress");
            return;
        }

        let Some(index) = self.next_testable(0) else {
            info!("restart_verify: nothing testable");
            self.emit_event(ManagerEvent::NothingTestable);
            // Consumers must see that we have initialized even without addresses
            self.resolv.update(&self.status).await;
            self.update_routing().await;
            self.status.testing = false;
            self.publish_status().await;
            self.arm(TimerKind::NetworkTest, self.timer_config.network_test_interval());
            return;
        };

        self.setup_verify(index).await;
        self.verify_device_port_config().await;
        self.compress_and_publish().await;
    }

    /// Take the entry at `index` as the candidate under test
    pub async fn setup_verify(&mut self, index: usize) {
        let Some(dpc) = self.list.get(index).cloned() else {
            warn!("setup_verify: no entry at {}", index);
            return;
        };
        info!("setup_verify: testing {} at index {}", dpc.key, index);
        self.list.current_index = Some(index);
        let interfaces = self.provisioner.interfaces().await;
        let key = dpc.key.clone();
        self.pending.start(index, dpc, &interfaces);
        self.emit_event(ManagerEvent::VerificationStarted { index, key });
    }

    /// Run the verification loop until it settles or suspends
    pub async fn verify_device_port_config(&mut self) {
        if !self.pending.in_progress {
            debug!("verify_device_port_config: not in progress");
            return;
        }

        loop {
            // Resumed when a working configuration is found
            self.timers.stop(TimerKind::NetworkTest);
            self.timers.stop(TimerKind::NetworkTestBetter);
            self.timers.stop(TimerKind::Retest);

            let outcome = self.test_pending().await;
            match outcome {
                VerifyOutcome::PciWait => {
                    // Resumed by the next adapter update
                    info!("verify_device_port_config: PCI_WAIT for {}", self.pending.index);
                    return;
                }
                VerifyOutcome::Wait => {
                    info!("verify_device_port_config: WAIT for {}", self.pending.index);
                    self.arm(TimerKind::Retest, self.timer_config.dpc_test_duration());
                    return;
                }
                VerifyOutcome::Fail => {
                    warn!("verify_device_port_config: FAIL for {}", self.pending.index);
                    let tested = self.commit_pending_result();
                    self.compress_and_publish().await;

                    if self.first_preempts() {
                        warn!(
                            "verify_device_port_config: a new or working configuration is \
                             at the top of the list; restarting verification"
                        );
                        self.setup_verify(0).await;
                        continue;
                    }

                    let after = tested.unwrap_or(self.pending.index) + 1;
                    match self.next_testable(after) {
                        Some(next) => {
                            self.setup_verify(next).await;
                            continue;
                        }
                        None => {
                            info!("verify_device_port_config: nothing testable");
                            self.pending.in_progress = false;
                            self.emit_event(ManagerEvent::NothingTestable);
                            self.arm(TimerKind::NetworkTest, self.timer_config.network_test_interval());
                            return;
                        }
                    }
                }
                VerifyOutcome::Success => {
                    if self.commit_success().await {
                        return;
                    }
                }
            }
        }
    }

    /// Test the pending candidate once and publish the transient status
    async fn test_pending(&mut self) -> VerifyOutcome {
        let settings = self.verify_settings();
        let ctx = VerifyContext {
            adapters: &self.adapters,
            provisioner: self.provisioner.as_ref(),
            probe: self.probe.as_ref(),
            clock: self.clock.as_ref(),
            settings,
        };
        let outcome = verify::verify_pending(&mut self.pending, &ctx).await;

        self.emit_event(ManagerEvent::Outcome {
            index: self.pending.index,
            outcome,
        });

        // The probe resolves the controller through the candidate's servers
        self.resolv.update(&self.pending.pend_dns).await;
        if let Err(e) = self.router.update(&self.pending.pend_dns).await {
            warn!("policy routing update failed: {}", e);
        }
        self.pending.pend_dns.testing = true;
        if let Err(e) = self.publisher.publish_network_status(&self.pending.pend_dns).await {
            warn!("Failed to publish network status: {}", e);
        }
        outcome
    }

    /// Commit a SUCCESS. Returns `false` when verification must go on
    /// with a candidate that arrived during the test.
    async fn commit_success(&mut self) -> bool {
        let tested = self.commit_pending_result();
        self.pending.in_progress = false;

        match tested {
            Some(0) => {
                info!("Working DPC configuration found at index 0");
            }
            Some(index) => {
                warn!("Working DPC configuration found at index {}", index);
                if let Some(interval) = self.timer_config.network_test_better_interval() {
                    self.arm(TimerKind::NetworkTestBetter, interval);
                }
            }
            None => {}
        }
        self.list.current_index = tested;

        self.current_dpc = Some(self.pending.pend_dpc.clone());
        self.status = self.pending.pend_dns.clone();
        self.status.testing = false;
        if let Some(index) = tested {
            self.emit_event(ManagerEvent::Selected {
                index,
                key: self.pending.pend_dpc.key.clone(),
            });
        }
        self.compress_and_publish().await;
        self.do_dns_update().await;

        let raced = tested.is_none() || self.list.first().is_some_and(|d| d.is_usable() && d.is_untested());
        if raced {
            warn!(
                "verify_device_port_config: the list changed while testing; restarting verification"
            );
            if let Some(index) = self.next_testable(0) {
                self.setup_verify(index).await;
                return false;
            }
        }

        self.cloud_connectivity_works = true;
        self.arm(TimerKind::NetworkTest, self.timer_config.network_test_interval());
        true
    }

    /// Write the pending result into the matching list entry.
    ///
    /// The list may have been edited while the test was suspended, so the
    /// entry is located again by identity. Returns its index.
    pub fn commit_pending_result(&mut self) -> Option<usize> {
        match self.list.lookup(&self.pending.pend_dpc) {
            Some(index) => {
                debug!("commit_pending_result: updating entry {}", index);
                self.list.port_configs[index] = self.pending.pend_dpc.clone();
                Some(index)
            }
            None => {
                warn!(
                    "commit_pending_result: {} at {} no longer in list, result dropped",
                    self.pending.pend_dpc.key, self.pending.pend_dpc.time_priority
                );
                None
            }
        }
    }

    /// Compress the list if it is stable and publish it
    pub async fn compress_and_publish(&mut self) {
        self.list = compress(&self.list, self.pending.in_progress);
        if let Err(e) = self.publisher.publish_port_config_list(&self.list).await {
            warn!("Failed to publish DevicePortConfigList: {}", e);
            return;
        }
        self.emit_event(ManagerEvent::ListPublished { len: self.list.len() });
    }

    /// Settle point: resolver, routing and the published status
    pub async fn do_dns_update(&mut self) {
        let count = self.status.count_usable_addrs();
        if count != self.usable_address_count {
            info!(
                "DeviceNetworkStatus from {} to {} addresses",
                self.usable_address_count, count
            );
            self.usable_address_count = count;
        }
        self.resolv.update(&self.status).await;
        self.update_routing().await;
        self.status.testing = false;
        self.publish_status().await;
    }

    /// Publish the fallback candidate for the given raw interfaces
    pub async fn update_last_resort_port_config(&self, if_names: &[String]) {
        if if_names.is_empty() {
            return;
        }
        let config = last_resort_port_config(if_names);
        if let Err(e) = self.publisher.publish_port_config(LAST_RESORT_KEY, &config).await {
            warn!("Failed to publish {}: {}", LAST_RESORT_KEY, e);
        }
    }

    pub async fn remove_last_resort_port_config(&self) {
        if let Err(e) = self.publisher.unpublish_port_config(LAST_RESORT_KEY).await {
            warn!("Failed to unpublish {}: {}", LAST_RESORT_KEY, e);
        }
    }

    /// Run the manager
    ///
    /// Processes `events` and timer expirations until SIGINT is received.
    pub async fn run(&mut self, events: mpsc::Receiver<NimEvent>) -> Result<()> {
        self.run_internal(events, None).await
    }

    /// Run the manager until `shutdown_rx` fires (or SIGINT when `None`)
    pub async fn run_with_shutdown(
        &mut self,
        events: mpsc::Receiver<NimEvent>,
        shutdown_rx: Option<oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(events, shutdown_rx).await
    }

    async fn run_internal(
        &mut self,
        mut events: mpsc::Receiver<NimEvent>,
        shutdown_rx: Option<oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.emit_event(ManagerEvent::Started {
            candidates: self.list.len(),
        });

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        };
        tokio::pin!(shutdown);

        loop {
            let sleep_for = self
                .timers
                .next_deadline()
                .map(|at| (at - self.clock.now()).to_std().unwrap_or(Duration::ZERO));

            tokio::select! {
                Some(event) = events.recv() => {
                    self.handle_event(event).await;
                }

                _ = tokio::time::sleep(sleep_for.unwrap_or(Duration::from_secs(3600))), if sleep_for.is_some() => {
                    while let Some(kind) = self.timers.pop_expired(self.clock.now()) {
                        self.handle_event(NimEvent::Timer(kind)).await;
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(ManagerEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        // Flush published state before exiting
        self.publisher.flush().await?;
        info!("Publisher flushed, manager stopped");

        Ok(())
    }

    fn verify_settings(&self) -> VerifySettings {
        VerifySettings {
            max_retest_count: self.verify_config.max_retest_count,
            min_working_mgmt_ports: self.verify_config.min_working_mgmt_ports,
            timeout: self.timer_config.test_send_timeout(),
        }
    }

    fn next_testable(&self, start: usize) -> Option<usize> {
        self.list
            .next_testable_index(start, self.clock.now(), self.verify_config.retest_cooldown())
    }

    /// Entry 0 is new or known to work and should be tried before going on
    fn first_preempts(&self) -> bool {
        self.list
            .first()
            .is_some_and(|d| d.is_usable() && (d.is_untested() || d.was_working()))
    }

    fn arm(&mut self, kind: TimerKind, after: Duration) {
        let now = self.clock.now();
        self.timers.arm(kind, now, after);
    }

    async fn update_routing(&self) {
        if let Err(e) = self.router.update(&self.status).await {
            warn!("policy routing update failed: {}", e);
        }
    }

    async fn publish_status(&self) {
        if let Err(e) = self.publisher.publish_network_status(&self.status).await {
            warn!("Failed to publish DeviceNetworkStatus: {}", e);
        }
    }

    /// Emit a manager event
    fn emit_event(&self, event: ManagerEvent) {
        // Send event, logging warning if channel is full (backpressure)
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use crate::state::MemoryPublisher;
    use crate::traits::{ManualClock, ProbeError, ProbeReport, ProvisionError};
    use crate::types::{InterfaceTable, NetworkPortConfig};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct Unreachable;

    #[async_trait]
    impl ConnectivityProbe for Unreachable {
        async fn verify(&self, _status: &DeviceNetworkStatus, _min: usize, _timeout: Duration) -> ProbeReport {
            ProbeReport::failure(ProbeError::NoUsableInterfaces, Vec::new())
        }

        fn probe_name(&self) -> &'static str {
            "unreachable"
        }
    }

    struct NoInterfaces;

    #[async_trait]
    impl PortProvisioner for NoInterfaces {
        async fn apply_wireless(&self, _port: &NetworkPortConfig) -> Result<()> {
            Ok(())
        }

        async fn update_dhcp_client(
            &self,
            _new: &DevicePortConfig,
            _old: &DevicePortConfig,
        ) -> std::result::Result<(), ProvisionError> {
            Ok(())
        }

        async fn interfaces(&self) -> InterfaceTable {
            InterfaceTable::new()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_704_067_200 + secs, 0).unwrap()
    }

    fn dpc(key: &str, secs: i64, if_name: &str) -> DevicePortConfig {
        DevicePortConfig::new(key, at(secs), vec![NetworkPortConfig::dhcp_mgmt(if_name)])
    }

    fn manager(clock: &ManualClock, entries: Vec<DevicePortConfig>) -> DpcManager {
        let config = NimConfig::new(ProbeConfig::Http {
            url: "https://controller.example/ping".to_string(),
            user_agent: None,
        });
        let (manager, _events) = DpcManager::new(
            Box::new(Unreachable),
            Box::new(NoInterfaces),
            Box::new(MemoryPublisher::new()),
            config,
        )
        .unwrap();
        let mut manager = manager.with_clock(Arc::new(clock.clone()));
        manager.list = DevicePortConfigList::new(entries);
        manager
    }

    #[test]
    fn test_first_preempts() {
        let clock = ManualClock::new(at(100));

        assert!(!manager(&clock, vec![]).first_preempts());
        assert!(manager(&clock, vec![dpc("zedagent", 10, "eth0")]).first_preempts());

        let mut failed = dpc("zedagent", 10, "eth0");
        failed.last_failed = Some(at(50));
        assert!(!manager(&clock, vec![failed.clone()]).first_preempts());

        let mut recovered = failed;
        recovered.last_succeeded = Some(at(60));
        assert!(manager(&clock, vec![recovered]).first_preempts());

        let mut unmanaged = dpc("zedagent", 10, "eth0");
        unmanaged.ports[0].is_mgmt = false;
        assert!(!manager(&clock, vec![unmanaged]).first_preempts());
    }

    #[test]
    fn test_next_testable_wraps_past_cooling_entry() {
        let clock = ManualClock::new(at(100));
        let mut recent = dpc("zedagent", 30, "eth0");
        recent.last_failed = Some(at(90));
        let m = manager(
            &clock,
            vec![recent, dpc("override", 20, "eth1"), dpc("usb", 10, "eth2")],
        );

        assert_eq!(m.next_testable(2), Some(2));
        // wraps to 0, which is still cooling down
        assert_eq!(m.next_testable(3), Some(1));

        clock.advance(chrono::Duration::seconds(m.verify_config.retest_cooldown_secs as i64));
        assert_eq!(m.next_testable(3), Some(0));
    }

    #[test]
    fn test_manager_event_clone() {
        let event = ManagerEvent::Outcome {
            index: 1,
            outcome: VerifyOutcome::Wait,
        };
        assert_eq!(event.clone(), event);
    }
}
