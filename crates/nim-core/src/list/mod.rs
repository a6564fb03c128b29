//! Priority list maintenance
//!
//! - [`editor`]: merges add/update/delete notifications into the list
//! - [`compress`]: trims a stable list before publication

pub mod compress;
pub mod editor;

pub use compress::compress;
pub use editor::{EditKind, apply_update};
