// # Address Watcher
//
// Polls the provisioner's interface table and yields the names of
// interfaces whose addresses or lease (DNS servers, gateway) changed. The
// daemon turns each item into a `NimEvent::AddressChange`.

use nim_core::traits::PortProvisioner;
use nim_core::types::InterfaceTable;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Names of interfaces that appeared, disappeared, or changed state.
///
/// A renewed lease with new DNS servers counts even when the address is
/// kept.
pub fn changed_interfaces(old: &InterfaceTable, new: &InterfaceTable) -> Vec<String> {
    let mut changed: Vec<String> = new
        .iter()
        .filter(|(name, state)| old.get(*name).is_none_or(|prev| prev != *state))
        .map(|(name, _)| name.clone())
        .collect();
    changed.extend(old.keys().filter(|name| !new.contains_key(*name)).cloned());
    changed.sort();
    changed
}

/// Stream of address changes, polled every `poll_interval`
///
/// The first poll only records the baseline. Polling stops when the
/// stream is dropped.
pub fn address_changes(
    provisioner: Arc<dyn PortProvisioner>,
    poll_interval: Duration,
) -> Pin<Box<dyn Stream<Item = String> + Send + 'static>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        tracing::info!("Starting address monitoring (interval={:?})", poll_interval);

        let mut last = provisioner.interfaces().await;

        loop {
            tokio::time::sleep(poll_interval).await;

            let current = provisioner.interfaces().await;
            for if_name in changed_interfaces(&last, &current) {
                tracing::debug!("Addresses changed on {}", if_name);
                if tx.send(if_name).is_err() {
                    tracing::debug!("Receiver dropped, stopping address monitor");
                    return;
                }
            }
            last = current;
        }
    });

    Box::pin(UnboundedReceiverStream::new(rx))
}
