//! Contract Test: Settle Points
//!
//! Constraints verified:
//! - The resolver file is only rewritten when the server set changes
//! - Address changes refresh the applied status and its side effects
//! - Nothing testable still publishes a settled status
//! - The fallback configuration is published and withdrawn on request
//!
//! If this test fails, consumers see stale or flapping network state.

mod common;

use common::*;
use nim_core::engine::{ManagerEvent, NimEvent, TimerKind};
use nim_core::types::{AssignableAdapters, CONTROLLER_KEY, IoBundle, IoBundleKind, LAST_RESORT_KEY};

fn modify(config: nim_core::DevicePortConfig) -> NimEvent {
    NimEvent::PortConfigModify {
        key: config.key.clone(),
        config,
    }
}

fn address_change(if_name: &str) -> NimEvent {
    NimEvent::AddressChange {
        if_name: if_name.to_string(),
    }
}

#[tokio::test]
async fn resolver_rewritten_only_when_servers_change() {
    let mut h = Harness::new();
    h.provisioner.lease("eth0", "10.0.0.5", "10.0.0.1");
    h.manager.handle_event(modify(dpc(CONTROLLER_KEY, 10, "eth0"))).await;
    assert!(h.resolv_conf_text().contains("nameserver 10.0.0.1"));

    std::fs::write(&h.resolv_conf, "sentinel").unwrap();

    // Same lease: status unchanged, nothing rewritten
    h.manager.handle_event(address_change("eth0")).await;
    assert_eq!(h.resolv_conf_text(), "sentinel");

    // New address but same DNS server: status republished, file untouched
    let statuses = h.publisher.statuses().len();
    h.provisioner.lease("eth0", "10.0.0.6", "10.0.0.1");
    h.manager.handle_event(address_change("eth0")).await;
    assert_eq!(h.resolv_conf_text(), "sentinel");
    assert_eq!(h.publisher.statuses().len(), statuses + 1);

    h.provisioner.lease("eth0", "10.0.0.6", "10.0.0.53");
    h.manager.handle_event(address_change("eth0")).await;
    let text = h.resolv_conf_text();
    assert!(text.contains("nameserver 10.0.0.53"), "{text}");
    assert!(!text.contains("nameserver 10.0.0.1\n"), "{text}");
}

#[tokio::test]
async fn address_change_refreshes_applied_status() {
    let mut h = Harness::new();
    h.provisioner.lease("eth0", "10.0.0.5", "10.0.0.1");
    h.manager.handle_event(modify(dpc(CONTROLLER_KEY, 10, "eth0"))).await;
    let routes = h.router.update_count();

    h.provisioner.release("eth0");
    h.manager.handle_event(address_change("eth0")).await;

    let status = h.manager.network_status();
    assert_eq!(status.count_usable_addrs(), 0);
    assert!(!status.testing);
    assert_eq!(h.publisher.last_status().unwrap(), *status);
    assert!(h.router.update_count() > routes);
    // Losing the lease does not start a new verification by itself
    assert!(!h.manager.is_verifying());
}

#[tokio::test]
async fn address_change_resumes_waiting_verification() {
    let mut h = Harness::new();
    h.manager.handle_event(modify(dpc(CONTROLLER_KEY, 10, "eth0"))).await;
    assert!(h.manager.is_verifying());

    h.provisioner.lease("eth0", "10.0.0.5", "10.0.0.1");
    h.manager.handle_event(address_change("eth0")).await;

    assert!(!h.manager.is_verifying());
    assert_eq!(h.manager.port_config_list().current_index, Some(0));
    assert!(!h.manager.timers().is_armed(TimerKind::Retest));
}

#[tokio::test]
async fn nothing_testable_publishes_settled_status() {
    let mut h = Harness::new();
    let mut unmanaged = dpc(CONTROLLER_KEY, 10, "eth0");
    unmanaged.ports[0].is_mgmt = false;

    h.manager.handle_event(modify(unmanaged)).await;

    assert!(h.drain_events().contains(&ManagerEvent::NothingTestable));
    assert!(!h.manager.is_verifying());
    assert_eq!(h.probe.call_count(), 0);
    assert!(!h.publisher.last_status().unwrap().testing);
    assert!(h.resolv_conf_text().starts_with("# Generated by nim\n"));
    assert!(h.manager.timers().is_armed(TimerKind::NetworkTest));
}

#[tokio::test]
async fn every_test_publishes_transient_status() {
    let mut h = Harness::new();
    h.provisioner.lease("eth0", "10.0.0.5", "10.0.0.1");
    h.manager.handle_event(modify(dpc(CONTROLLER_KEY, 10, "eth0"))).await;

    let statuses = h.publisher.statuses();
    assert!(statuses.len() >= 2);
    assert!(statuses[0].testing);
    assert!(!statuses.last().unwrap().testing);
}

#[tokio::test]
async fn last_resort_published_and_withdrawn() {
    let h = Harness::new();

    h.manager.update_last_resort_port_config(&[]).await;
    assert!(h.publisher.store().port_config(LAST_RESORT_KEY).await.is_none());

    h.manager
        .update_last_resort_port_config(&["eth0".to_string(), "eth1".to_string()])
        .await;
    let published = h.publisher.store().port_config(LAST_RESORT_KEY).await.unwrap();
    assert_eq!(published.key, LAST_RESORT_KEY);
    assert_eq!(published.count_mgmt_ports(), 2);

    h.manager.remove_last_resort_port_config().await;
    assert!(h.publisher.store().port_config(LAST_RESORT_KEY).await.is_none());
}

#[tokio::test]
async fn adapter_updates_for_other_keys_are_ignored() {
    let mut h = Harness::new();
    let adapters = AssignableAdapters {
        initialized: true,
        bundles: vec![IoBundle {
            phy_label: "eth0".to_string(),
            if_name: "eth0".to_string(),
            kind: IoBundleKind::Eth,
            is_pci_back: true,
            used_by: None,
        }],
    };

    h.manager
        .handle_event(NimEvent::AssignableAdaptersModify {
            key: "other".to_string(),
            adapters: adapters.clone(),
        })
        .await;
    assert!(h.manager.assignable_adapters().bundles.is_empty());

    h.manager
        .handle_event(NimEvent::AssignableAdaptersModify {
            key: "global".to_string(),
            adapters: adapters.clone(),
        })
        .await;
    assert_eq!(h.manager.assignable_adapters(), &adapters);

    // Deletes are only logged
    h.manager
        .handle_event(NimEvent::AssignableAdaptersDelete {
            key: "global".to_string(),
        })
        .await;
    assert_eq!(h.manager.assignable_adapters(), &adapters);
}
