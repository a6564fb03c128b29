//! Assignable adapters
//!
//! The list of physical adapters that may be handed to workloads through
//! PCI passthrough. A network port whose adapter is in PCI-back is not
//! available to the host network stack.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Adapter class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoBundleKind {
    Eth,
    Wifi,
    Cellular,
    #[default]
    Other,
}

impl IoBundleKind {
    /// Network adapter classes
    pub fn is_net(&self) -> bool {
        matches!(self, IoBundleKind::Eth | IoBundleKind::Wifi | IoBundleKind::Cellular)
    }
}

/// One assignable adapter
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IoBundle {
    pub phy_label: String,
    #[serde(default)]
    pub if_name: String,
    pub kind: IoBundleKind,
    /// Adapter is detached from the host and held for passthrough
    #[serde(default)]
    pub is_pci_back: bool,
    /// Workload the adapter is assigned to
    #[serde(default)]
    pub used_by: Option<Uuid>,
}

/// Full adapter assignment list, published under key "global"
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssignableAdapters {
    #[serde(default)]
    pub initialized: bool,
    #[serde(default)]
    pub bundles: Vec<IoBundle>,
}

impl AssignableAdapters {
    pub fn lookup_by_phy_label(&self, phy_label: &str) -> Option<&IoBundle> {
        self.bundles.iter().find(|b| b.phy_label == phy_label)
    }

    pub fn lookup_by_if_name(&self, if_name: &str) -> Option<&IoBundle> {
        self.bundles.iter().find(|b| b.if_name == if_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let aa = AssignableAdapters {
            initialized: true,
            bundles: vec![IoBundle {
                phy_label: "eth0".to_string(),
                if_name: "eth0".to_string(),
                kind: IoBundleKind::Eth,
                is_pci_back: true,
                used_by: None,
            }],
        };
        assert!(aa.lookup_by_if_name("eth0").is_some());
        assert!(aa.lookup_by_phy_label("eth1").is_none());
        assert!(IoBundleKind::Wifi.is_net());
        assert!(!IoBundleKind::Other.is_net());
    }
}
