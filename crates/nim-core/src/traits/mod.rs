//! Collaborator traits
//!
//! This module defines the interfaces the manager requires of the world
//! around it.
//!
//! - [`ConnectivityProbe`]: reachability test against the controller
//! - [`PortProvisioner`]: wireless, address acquisition, live interfaces
//! - [`PolicyRouter`]: routing table programming
//! - [`StatePublisher`]: pub/sub transport and persisted state
//! - [`Clock`]: time source

pub mod clock;
pub mod probe;
pub mod provisioner;
pub mod publisher;
pub mod routing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use probe::{ConnectivityProbe, InterfaceProbeResult, ProbeError, ProbeFactory, ProbeReport};
pub use provisioner::{PortProvisioner, ProvisionError};
pub use publisher::{GLOBAL_KEY, PublisherFactory, StatePublisher};
pub use routing::{NoopPolicyRouter, PolicyRouter};
