//! Priority-ordered list of candidate configurations

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::port_config::DevicePortConfig;

/// Candidates in descending `time_priority` order plus the selection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DevicePortConfigList {
    /// Entry believed to be applied and working; `None` when unknown
    #[serde(default)]
    pub current_index: Option<usize>,
    #[serde(default)]
    pub port_configs: Vec<DevicePortConfig>,
}

impl DevicePortConfigList {
    pub fn new(port_configs: Vec<DevicePortConfig>) -> Self {
        Self {
            current_index: None,
            port_configs,
        }
    }

    pub fn len(&self) -> usize {
        self.port_configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.port_configs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DevicePortConfig> {
        self.port_configs.get(index)
    }

    pub fn first(&self) -> Option<&DevicePortConfig> {
        self.port_configs.first()
    }

    /// The selected entry, if any
    pub fn current(&self) -> Option<&DevicePortConfig> {
        self.current_index.and_then(|i| self.port_configs.get(i))
    }

    /// Find the entry matching `dpc`.
    ///
    /// First by exact identity (version, key, time priority), then by
    /// key, version and content, since a source may re-announce identical
    /// content under a new timestamp after a restart. Entries from other
    /// sources never match, whatever their ports. Used by the editor and
    /// when committing a test result.
    pub fn lookup(&self, dpc: &DevicePortConfig) -> Option<usize> {
        if let Some(i) = self.port_configs.iter().position(|e| e.same_identity(dpc)) {
            debug!("lookup: identity match for {} at {}", dpc.key, i);
            return Some(i);
        }
        let found = self
            .port_configs
            .iter()
            .position(|e| e.key == dpc.key && e.version == dpc.version && e.same_content(dpc));
        if let Some(i) = found {
            debug!("lookup: content match for {} at {}", dpc.key, i);
        }
        found
    }

    /// Insert keeping descending priority; ties keep arrival order
    pub fn insert_by_priority(&mut self, dpc: DevicePortConfig) -> usize {
        let index = self
            .port_configs
            .iter()
            .position(|e| dpc.time_priority > e.time_priority)
            .unwrap_or(self.port_configs.len());
        debug!("insert_by_priority: {} at {}", dpc.key, index);
        self.port_configs.insert(index, dpc);
        index
    }

    /// Remove and return the entry at `index`
    pub fn remove(&mut self, index: usize) -> Option<DevicePortConfig> {
        (index < self.port_configs.len()).then(|| self.port_configs.remove(index))
    }

    /// Next entry eligible for testing, starting at `start` and wrapping
    /// around the list at most once
    pub fn next_testable_index(
        &self,
        start: usize,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Option<usize> {
        let len = self.port_configs.len();
        if len == 0 {
            debug!("next_testable_index: empty list");
            return None;
        }
        let found = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&i| {
                let testable = self.port_configs[i].is_testable(now, cooldown);
                if !testable {
                    debug!("next_testable_index: {} at {} is not testable", self.port_configs[i].key, i);
                }
                testable
            });
        debug!("next_testable_index: start {} found {:?}", start, found);
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::port_config::NetworkPortConfig;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    fn dpc(key: &str, t: i64, ifname: &str) -> DevicePortConfig {
        DevicePortConfig::new(key, at(t), vec![NetworkPortConfig::dhcp_mgmt(ifname)])
    }

    #[test]
    fn test_insert_descending_ties_in_arrival_order() {
        let mut list = DevicePortConfigList::default();
        list.insert_by_priority(dpc("a", 5, "eth0"));
        list.insert_by_priority(dpc("b", 10, "eth1"));
        list.insert_by_priority(dpc("c", 5, "eth2"));
        list.insert_by_priority(dpc("d", 1, "eth3"));

        let keys: Vec<_> = list.port_configs.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_lookup_identity_then_content() {
        let list = DevicePortConfigList::new(vec![dpc("zedagent", 10, "eth0"), dpc("zedagent", 5, "eth1")]);

        assert_eq!(list.lookup(&dpc("zedagent", 5, "eth1")), Some(1));
        // same content re-announced with a new timestamp
        assert_eq!(list.lookup(&dpc("zedagent", 99, "eth1")), Some(1));
        assert_eq!(list.lookup(&dpc("zedagent", 99, "wlan0")), None);
    }

    #[test]
    fn test_lookup_content_match_requires_same_key() {
        let list = DevicePortConfigList::new(vec![dpc("zedagent", 10, "eth0"), dpc("lastresort", 1, "eth1")]);

        assert_eq!(list.lookup(&dpc("zedagent", 50, "eth1")), None);
        assert_eq!(list.lookup(&dpc("override", 1, "eth1")), None);
        assert_eq!(list.lookup(&dpc("lastresort", 50, "eth1")), Some(1));
    }

    #[test]
    fn test_next_testable_wraps_and_skips() {
        let mut list = DevicePortConfigList::new(vec![
            dpc("a", 3, "eth0"),
            dpc("b", 2, "eth1"),
            dpc("c", 1, "eth2"),
        ]);
        list.port_configs[2].last_failed = Some(at(100));
        let cooldown = Duration::seconds(60);

        assert_eq!(list.next_testable_index(2, at(110), cooldown), Some(0));
        assert_eq!(list.next_testable_index(1, at(110), cooldown), Some(1));

        list.port_configs[0].last_failed = Some(at(100));
        list.port_configs[1].last_failed = Some(at(100));
        assert_eq!(list.next_testable_index(0, at(110), cooldown), None);
        assert_eq!(list.next_testable_index(0, at(200), cooldown), Some(0));
    }
}
