//! Connection catalog
//!
//! The catalog is the system of record for the data sources the workspace
//! mirrors. It is consulted for full reconciliations and for every change
//! event the monitor receives.

mod definitions;
mod rest;
mod source;

pub use definitions::*;
pub use rest::*;
pub use source::*;
