// # nim-core
//
// Core library of the network interface manager.
//
// ## Architecture Overview
//
// The manager keeps a priority-ordered list of candidate device port
// configurations (DPCs), tests them one at a time for reachability of the
// controller, and applies the highest priority one that works:
//
// - **types**: DPC, DPC list, network status, assignable adapters
// - **list**: merging configuration notifications, list compression
// - **verify**: testing the single in-flight candidate
// - **DpcManager**: event loop driving verification, timers and publication
// - **resolv**: resolver configuration generation
// - **CollaboratorRegistry**: plugin registry for probes and publishers
//
// ## Design Principles
//
// 1. **Single owner**: all state is mutated by one task; events are
//    processed one at a time
// 2. **Collaborators behind traits**: probe, provisioner, router and
//    publisher are injected, so the state machine runs without a host
// 3. **Timers as data**: deadlines are kept in a `TimerSet` and turned into
//    events by the run loop
// 4. **Library-First**: the daemon is a thin wiring layer

pub mod config;
pub mod engine;
pub mod error;
pub mod list;
pub mod registry;
pub mod resolv;
pub mod state;
pub mod traits;
pub mod types;
pub mod verify;

// Re-export core types for convenience
pub use config::{NimConfig, ProbeConfig, PublisherConfig, TimerConfig, VerifyConfig};
pub use engine::{DpcManager, ManagerEvent, NimEvent, TimerKind, TimerSet};
pub use error::{Error, Result};
pub use registry::CollaboratorRegistry;
pub use resolv::{ResolvConfWriter, ResolvUpdate, generate_resolv_conf};
pub use state::{FilePublisher, MemoryPublisher};
pub use traits::{
    Clock, ConnectivityProbe, ManualClock, PolicyRouter, PortProvisioner, StatePublisher,
    SystemClock,
};
pub use types::{
    AssignableAdapters, DeviceNetworkStatus, DevicePortConfig, DevicePortConfigList,
    NetworkPortConfig,
};
pub use verify::{DpcPending, VerifyOutcome};
