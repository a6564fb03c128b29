// # Candidate Verification
//
// Tests the single candidate held in `DpcPending` and classifies the result
// into one of four outcomes. The driving loop that walks the list lives in
// the engine; this module only knows about one candidate at a time.
//
// ## Rules (evaluated in order)
//
// 1. A port still held by PCI passthrough: `PciWait`, or `Fail` when the
//    adapter is assigned to a workload.
// 2. Content changed since the last applied candidate: apply wireless
//    settings and reconfigure the address acquisition client. A bind error
//    counts against the retry ceiling.
// 3. Derive the status and run the reachability probe.
//    - success: `Success`
//    - server-side condition: `Wait`, the retry counter is not touched
//    - management ports lack address or DNS: counted `Wait`, then `Fail`
//    - anything else: `Fail` immediately

use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::traits::{Clock, ConnectivityProbe, InterfaceProbeResult, PortProvisioner};
use crate::types::{AssignableAdapters, DeviceNetworkStatus, DevicePortConfig, WirelessType};

/// Result of testing one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Fail,
    Success,
    Wait,
    PciWait,
}

impl fmt::Display for VerifyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerifyOutcome::Fail => "FAIL",
            VerifyOutcome::Success => "SUCCESS",
            VerifyOutcome::Wait => "WAIT",
            VerifyOutcome::PciWait => "PCI_WAIT",
        };
        f.write_str(s)
    }
}

/// The one in-flight verification
#[derive(Debug, Clone, Default)]
pub struct DpcPending {
    pub in_progress: bool,
    /// List index the candidate was taken from
    pub index: usize,
    /// Candidate under test, with the results recorded so far
    pub pend_dpc: DevicePortConfig,
    /// Last candidate applied to the interfaces
    pub old_dpc: DevicePortConfig,
    /// Status derived from `pend_dpc` for the probe
    pub pend_dns: DeviceNetworkStatus,
    pub test_count: u32,
}

impl DpcPending {
    /// Take `dpc` at `index` as the new candidate under test
    pub fn start(&mut self, index: usize, dpc: DevicePortConfig, interfaces: &crate::types::InterfaceTable) {
        self.in_progress = true;
        self.index = index;
        self.pend_dns = DeviceNetworkStatus::derive(&dpc, interfaces);
        self.pend_dpc = dpc;
        self.test_count = 0;
    }
}

/// Limits applied to a single test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifySettings {
    pub max_retest_count: u32,
    pub min_working_mgmt_ports: usize,
    pub timeout: Duration,
}

/// Collaborators a test needs
pub struct VerifyContext<'a> {
    pub adapters: &'a AssignableAdapters,
    pub provisioner: &'a dyn PortProvisioner,
    pub probe: &'a dyn ConnectivityProbe,
    pub clock: &'a dyn Clock,
    pub settings: VerifySettings,
}

/// Test the candidate in `pending` once
pub async fn verify_pending(pending: &mut DpcPending, ctx: &VerifyContext<'_>) -> VerifyOutcome {
    debug!("verify_pending: {} (count {})", pending.pend_dpc.key, pending.test_count);

    if let Some(held) = pending.pend_dpc.port_in_pci_back(ctx.adapters) {
        if let Some(owner) = held.used_by {
            let err = format!("port {} in PCIBack used by {}", held.if_name, owner);
            error!("verify_pending: {}", err);
            let now = ctx.clock.now();
            pending.pend_dpc.record_failure(err.clone(), now);
            pending.pend_dpc.set_port_error(&held.if_name, err, now);
            return VerifyOutcome::Fail;
        }
        info!(
            "verify_pending: port {} still in PCIBack, waiting for it to be released",
            held.if_name
        );
        return VerifyOutcome::PciWait;
    }

    if !pending.pend_dpc.same_content(&pending.old_dpc) {
        info!("verify_pending: {} changed, applying", pending.pend_dpc.key);
        apply_wireless_changes(ctx.provisioner, &pending.old_dpc, &pending.pend_dpc).await;

        if let Err(e) = ctx
            .provisioner
            .update_dhcp_client(&pending.pend_dpc, &pending.old_dpc)
            .await
        {
            if pending.test_count < ctx.settings.max_retest_count {
                pending.test_count += 1;
                warn!(
                    "verify_pending: retry due to {} at count {}",
                    e, pending.test_count
                );
                return VerifyOutcome::Wait;
            }
            warn!("verify_pending: giving up on {}", e);
            let now = ctx.clock.now();
            pending.pend_dpc.record_failure(e.to_string(), now);
            pending.pend_dpc.set_port_error(&e.if_name, e.message.clone(), now);
            return VerifyOutcome::Fail;
        }
        pending.old_dpc = pending.pend_dpc.clone();
    }

    let interfaces = ctx.provisioner.interfaces().await;
    pending.pend_dns = DeviceNetworkStatus::derive(&pending.pend_dpc, &interfaces);

    let report = ctx
        .probe
        .verify(
            &pending.pend_dns,
            ctx.settings.min_working_mgmt_ports,
            ctx.settings.timeout,
        )
        .await;

    let now = ctx.clock.now();
    record_port_results(&mut pending.pend_dpc, &report.interfaces, now);
    // Carry the per-port errors into the status the consumers see
    pending.pend_dns = DeviceNetworkStatus::derive(&pending.pend_dpc, &interfaces);

    let err = match report.result {
        Ok(()) => {
            if pending.pend_dns.mgmt_ports_have_ip_and_dns() {
                pending.pend_dpc.last_ip_and_dns = Some(now);
            }
            pending.pend_dpc.record_success(now);
            info!(
                "verify_pending: {} passed network test via {}",
                pending.pend_dpc.key,
                ctx.probe.probe_name()
            );
            return VerifyOutcome::Success;
        }
        Err(err) => err,
    };

    let err_str = format!("Failed network test: {}", err);
    if err.is_remote_temporary() {
        error!("verify_pending: remote temporary failure {}", err_str);
        return VerifyOutcome::Wait;
    }

    if !pending.pend_dns.mgmt_ports_have_ip_and_dns() {
        if pending.test_count < ctx.settings.max_retest_count {
            pending.test_count += 1;
            info!(
                "verify_pending no IP/DNS: count {}: {}",
                pending.test_count, err_str
            );
            return VerifyOutcome::Wait;
        }
        error!("verify_pending no IP/DNS: exceeded retest count: {}", err_str);
        pending.pend_dpc.record_failure(err_str, now);
        return VerifyOutcome::Fail;
    }

    error!("verify_pending: {}", err_str);
    pending.test_count = ctx.settings.max_retest_count;
    pending.pend_dpc.record_failure(err_str, now);
    pending.pend_dpc.last_ip_and_dns = Some(now);
    VerifyOutcome::Fail
}

/// Install wireless settings for ports whose wireless config changed, or
/// that move into or out of a wireless mode
async fn apply_wireless_changes(
    provisioner: &dyn PortProvisioner,
    old: &DevicePortConfig,
    new: &DevicePortConfig,
) {
    for port in &new.ports {
        let old_port = old.port(&port.if_name);
        if old_port.is_some_and(|o| o.wireless == port.wireless) {
            continue;
        }
        let was_wireless = old_port.is_some_and(|o| o.wireless.kind != WirelessType::None);
        if !port.wireless.is_wireless() && !was_wireless {
            continue;
        }
        if let Err(e) = provisioner.apply_wireless(port).await {
            warn!("apply_wireless_changes: {}: {}", port.if_name, e);
        }
    }
}

fn record_port_results(dpc: &mut DevicePortConfig, results: &[InterfaceProbeResult], now: chrono::DateTime<chrono::Utc>) {
    for result in results {
        let Some(port) = dpc.ports.iter_mut().find(|p| p.if_name == result.if_name) else {
            continue;
        };
        match &result.error {
            None => port.test_results.record_success(now),
            Some(e) => port.test_results.record_failure(e.clone(), now),
        }
    }
}
