//! List compression before publication
//!
//! Once the list is stable (nothing under test, entry 0 selected and
//! working, entry 0 supplied by the controller) only entry 0 and the first
//! `lastresort` entry are kept. Every other entry, including static
//! overrides, is dropped from the published list.

use tracing::debug;

use crate::types::{CONTROLLER_KEY, DevicePortConfigList, LAST_RESORT_KEY};

/// Return the list to publish; unchanged unless it is stable
pub fn compress(list: &DevicePortConfigList, verification_in_progress: bool) -> DevicePortConfigList {
    if verification_in_progress || list.current_index != Some(0) || list.is_empty() {
        debug!(
            "compress: list still changing - in progress: {}, current: {:?}, len: {}",
            verification_in_progress,
            list.current_index,
            list.len()
        );
        return list.clone();
    }

    let first = &list.port_configs[0];
    if first.key != CONTROLLER_KEY || !first.was_working() {
        debug!(
            "compress: first entry not stable - key: {}, working: {}",
            first.key,
            first.was_working()
        );
        return list.clone();
    }

    let mut kept = vec![first.clone()];
    if let Some(fallback) = list.port_configs[1..].iter().find(|d| d.key == LAST_RESORT_KEY) {
        kept.push(fallback.clone());
    }
    debug!("compress: {} entries -> {}", list.len(), kept.len());

    DevicePortConfigList {
        current_index: Some(0),
        port_configs: kept,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DevicePortConfig, NetworkPortConfig, OVERRIDE_KEY};
    use chrono::{DateTime, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    fn dpc(key: &str, t: i64) -> DevicePortConfig {
        DevicePortConfig::new(key, at(t), vec![NetworkPortConfig::dhcp_mgmt("eth0")])
    }

    fn stable_list() -> DevicePortConfigList {
        let mut first = dpc(CONTROLLER_KEY, 30);
        first.last_succeeded = Some(at(100));
        DevicePortConfigList {
            current_index: Some(0),
            port_configs: vec![
                first,
                dpc(CONTROLLER_KEY, 20),
                dpc(OVERRIDE_KEY, 10),
                dpc(LAST_RESORT_KEY, 1),
                dpc(LAST_RESORT_KEY, 0),
            ],
        }
    }

    #[test]
    fn test_keeps_first_and_one_fallback() {
        let out = compress(&stable_list(), false);
        assert_eq!(out.len(), 2);
        assert_eq!(out.port_configs[0].time_priority, at(30));
        assert_eq!(out.port_configs[1].key, LAST_RESORT_KEY);
        assert_eq!(out.port_configs[1].time_priority, at(1));
        assert_eq!(out.current_index, Some(0));
    }

    #[test]
    fn test_override_entries_are_dropped() {
        // Intentional: once stable, overrides below entry 0 are not published
        let out = compress(&stable_list(), false);
        assert!(out.port_configs.iter().all(|d| d.key != OVERRIDE_KEY));
    }

    #[test]
    fn test_untouched_while_unstable() {
        let list = stable_list();
        assert_eq!(compress(&list, true), list);

        let mut unselected = stable_list();
        unselected.current_index = Some(1);
        assert_eq!(compress(&unselected, false), unselected);

        let mut failing = stable_list();
        failing.port_configs[0].last_failed = Some(at(200));
        assert_eq!(compress(&failing, false), failing);

        let mut overridden = stable_list();
        overridden.port_configs[0].key = OVERRIDE_KEY.to_string();
        assert_eq!(compress(&overridden, false), overridden);

        let empty = DevicePortConfigList::default();
        assert_eq!(compress(&empty, false), empty);
    }

    #[test]
    fn test_no_fallback_keeps_single_entry() {
        let mut list = stable_list();
        list.port_configs.retain(|d| d.key != LAST_RESORT_KEY);
        assert_eq!(compress(&list, false).len(), 1);
    }
}
