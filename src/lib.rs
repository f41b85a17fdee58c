//! # ConnSync - Catalog Connection Synchronizer
//!
//! ConnSync keeps a workspace's data-source connections in step with an
//! external service catalog. It subscribes to the catalog's change-event
//! stream over a websocket, applies each connection change through a
//! synchronizer, retries failed handlers, and performs a full reconciliation
//! every time the subscription is (re)established.
//!
//! ## Features
//!
//! - **Reserved subscriptions**: HTTP reservation followed by a websocket stream
//! - **Ordered retry**: Pending handlers inspected smallest event id first
//! - **Automatic reconnect**: The maintenance loop reopens dropped streams
//! - **Full reconciliation**: Catalog listing mirrored into the workspace on connect
//! - **Pluggable seams**: Catalog, workspace, synchronizer and transport are traits
//!
//! ## Quick Start
//!
//! ```no_run
//! use connsync::prelude::*;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> connsync::Result<()> {
//! let config = MonitorConfig::default();
//! let catalog = Arc::new(HttpCatalog::new(config.clone())?);
//! let workspace = Arc::new(JsonFileWorkspace::open("workspace.json")?);
//! let synchronizer = Arc::new(CatalogSynchronizer::new(catalog, workspace));
//! let transport = Arc::new(WebSocketTransport::new(config.clone())?);
//!
//! let monitor = Arc::new(ConnectionMonitor::new(config, transport, synchronizer));
//! let cancel = CancellationToken::new();
//! let handle = monitor.start(cancel.clone());
//!
//! tokio::signal::ctrl_c().await.ok();
//! cancel.cancel();
//! handle.await.ok();
//! # Ok(())
//! # }
//! ```
//!
//! ## One-shot Reconciliation
//!
//! ```no_run
//! use connsync::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> connsync::Result<()> {
//! let catalog = Arc::new(HttpCatalog::new(MonitorConfig::default())?);
//! let workspace = Arc::new(InMemoryWorkspace::new());
//! let synchronizer = CatalogSynchronizer::new(catalog, workspace);
//!
//! let report = synchronizer.synchronize_connections().await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod monitor;
pub mod sync;
pub mod workspace;

// Re-export commonly used types
pub use config::{InFlightPolicy, MonitorConfig};
pub use error::{Result, SyncError};
pub use monitor::{ConnectionMonitor, MaintenanceOutcome};
pub use sync::{CatalogSynchronizer, ConnectionSynchronizer, SyncReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use connsync::prelude::*;
    //! ```

    pub use crate::catalog::{
        CatalogSource, ConnectionCatalog, HttpCatalog, InMemoryCatalog, SourceType,
    };
    pub use crate::config::{InFlightPolicy, MonitorConfig};
    pub use crate::error::{Result, SyncError};
    pub use crate::events::{decode_frame, ChangeAction, ChangeEvent, Decoded};
    pub use crate::monitor::{ConnectionMonitor, EventTransport, MaintenanceOutcome, WebSocketTransport};
    pub use crate::sync::{CatalogSynchronizer, ConnectionSynchronizer, SyncReport};
    pub use crate::workspace::{ConnectionRecord, InMemoryWorkspace, JsonFileWorkspace, Workspace};
}
