//! Connection event monitoring
//!
//! Subscribes to the catalog's change stream, dispatches connection changes
//! to the synchronizer, and retries failed handlers in the background.

#[allow(clippy::module_inception)]
mod monitor;
mod pending;
mod transport;

pub use monitor::*;
pub use pending::*;
pub use transport::*;
