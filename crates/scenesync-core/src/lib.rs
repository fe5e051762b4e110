//! scenesync core - declarative scene graph reconciliation
//!
//! Drives a remote, RPC-controlled compositor from declarations:
//! - Reconciles declared scenes, inputs, filters and placements with the
//!   minimal set of remote mutations
//! - Tracks which remote objects this program created, across restarts
//! - Removes owned objects that no declaration references any more
//! - Hands out runtime handles bound to the objects it manages
//!
//! # Example
//!
//! ```rust,ignore
//! use scenesync_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), SyncError> {
//! let gateway = Arc::new(MemoryGateway::new());
//! let mut session = Session::new(gateway, SyncConfig::default());
//!
//! let chat = InputDeclaration::new("Chat", "browser_source").with_setting("url", "https://x");
//! let main = SceneDeclaration::new("Main").with_item("chat", SceneItemDeclaration::new(chat));
//!
//! let scene = session.sync(&main).await?;
//! println!("{} is live", scene.name());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod gc;
pub mod handle;
pub mod ledger;
pub mod protocol;
mod reconciler;
pub mod registry;
pub mod session;
pub mod simulator;

pub use config::{ForeignPolicy, SyncConfig};
pub use error::{ConfigError, LedgerError, SyncError};
pub use gateway::{Gateway, GatewayError, StatusClass};
pub use gc::{CleanFailure, CleanReport};
pub use handle::{Filter, Input, ItemPlacement, Scene, SceneItem};
pub use ledger::{classify, FileLedger, Ownership, OwnershipLedger, OwnershipRecord, RemoteLedger};
pub use protocol::Remote;
pub use registry::InstanceRegistry;
pub use session::Session;
pub use simulator::MemoryGateway;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for declaring and syncing scenes
    pub use crate::{
        Filter, ForeignPolicy, Gateway, Input, ItemPlacement, MemoryGateway, Scene, SceneItem,
        Session, SyncConfig, SyncError,
    };
    pub use scenesync_model::{
        FilterConfig, InputDeclaration, SceneDeclaration, SceneItemDeclaration, Transform,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
