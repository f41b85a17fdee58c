//! Workspace
//!
//! Local repository of connection records that the synchronizer keeps in
//! step with the catalog.

mod record;
mod store;

pub use record::*;
pub use store::*;
