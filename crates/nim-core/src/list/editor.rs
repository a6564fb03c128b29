// # List Editor
//
// Applies add/update/delete notifications from the configuration sources
// to the priority list.
//
// ## Merge rules
//
// - The incoming candidate is matched with `DevicePortConfigList::lookup`
//   (identity first, then content).
// - Test history of a matched entry is carried over to the replacement.
// - A content-identical re-announcement of an entry that is not selected
//   only carries timestamp noise and is ignored.
// - After a structural change the selection follows the previously
//   selected entry if it is still working, otherwise it becomes unknown.

use tracing::{debug, info, warn};

use crate::types::{DevicePortConfig, DevicePortConfigList};

/// What the caller asked the editor to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Update,
    Delete,
}

/// Apply one edit to `list`.
///
/// Returns `true` when the list changed and must be republished.
pub fn apply_update(list: &mut DevicePortConfigList, candidate: &DevicePortConfig, kind: EditKind) -> bool {
    let current = list.current().cloned();
    let current_index = list.current_index;
    let matched = list.lookup(candidate);

    match (kind, matched) {
        (EditKind::Delete, None) => {
            warn!(
                "apply_update: delete of {} at {} not found in list",
                candidate.key, candidate.time_priority
            );
            return false;
        }
        (EditKind::Delete, Some(index)) => {
            info!("apply_update: delete {} at {}", candidate.key, index);
            list.remove(index);
        }
        (EditKind::Update, Some(index)) => {
            let old = &list.port_configs[index];
            if old.same_content(candidate) {
                let is_current = current_index == Some(index);
                if !is_current {
                    debug!(
                        "apply_update: {} unchanged except time priority {} -> {}",
                        candidate.key, old.time_priority, candidate.time_priority
                    );
                    return false;
                }
                info!("apply_update: {} is current; reorder", candidate.key);
            } else {
                info!("apply_update: {} content changed", candidate.key);
            }
            replace_entry(list, index, candidate.clone());
        }
        (EditKind::Update, None) => {
            info!("apply_update: insert {}", candidate.key);
            list.insert_by_priority(candidate.clone());
        }
    }

    reconcile_selection(list, current.as_ref(), current_index);
    true
}

/// Replace the entry at `index`, keeping its test history
fn replace_entry(list: &mut DevicePortConfigList, index: usize, mut replacement: DevicePortConfig) {
    let old = &list.port_configs[index];
    replacement.inherit_history(old);
    if old.time_priority == replacement.time_priority {
        debug!("replace_entry: same time priority, in place at {}", index);
        list.port_configs[index] = replacement;
        return;
    }
    list.remove(index);
    list.insert_by_priority(replacement);
}

/// Carry the selection across a structural change
fn reconcile_selection(
    list: &mut DevicePortConfigList,
    current: Option<&DevicePortConfig>,
    current_index: Option<usize>,
) {
    let Some(current) = current else {
        debug!("reconcile_selection: no current entry");
        return;
    };
    match list.lookup(current) {
        None => {
            // The selected entry is gone; keep index 0 only if it works
            let first_working = list.first().is_some_and(|d| d.was_working());
            list.current_index = first_working.then_some(0);
            info!(
                "reconcile_selection: current {:?} removed, now {:?}",
                current_index, list.current_index
            );
        }
        Some(new_index) if Some(new_index) != current_index => {
            let working = list.port_configs[new_index].was_working();
            list.current_index = working.then_some(new_index);
            info!(
                "reconcile_selection: current {:?} moved to {}, now {:?}",
                current_index, new_index, list.current_index
            );
        }
        Some(_) => {}
    }
}
