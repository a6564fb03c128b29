// # Publisher Implementations
//
// This module provides implementations of the StatePublisher trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::{FilePublisher, FilePublisherFactory};
pub use memory::{MemoryPublisher, MemoryPublisherFactory};
