//! Synchronization module for ConnSync
//!
//! Applies catalog state and change events to the workspace.

mod synchronizer;

pub use synchronizer::*;
