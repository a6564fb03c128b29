//! Data model
//!
//! - [`DevicePortConfig`]: one candidate configuration
//! - [`DevicePortConfigList`]: candidates in priority order plus the selection
//! - [`DeviceNetworkStatus`]: status derived from a candidate
//! - [`AssignableAdapters`]: adapters that may be held by PCI passthrough

pub mod adapters;
pub mod network_status;
pub mod port_config;
pub mod port_config_list;

pub use adapters::{AssignableAdapters, IoBundle, IoBundleKind};
pub use network_status::{DeviceNetworkStatus, InterfaceState, InterfaceTable, NetworkPortStatus};
pub use port_config::{
    CONTROLLER_KEY, CellularConfig, DPC_VERSION, DevicePortConfig, DhcpConfig, DhcpType,
    LAST_RESORT_KEY, NetworkPortConfig, OVERRIDE_KEY, PciBackPort, PortTestResults, WifiConfig,
    WirelessConfig, WirelessType, last_resort_port_config, last_resort_time_priority,
};
pub use port_config_list::DevicePortConfigList;
