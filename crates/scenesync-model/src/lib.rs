//! scenesync Declaration Model
//!
//! Immutable, caller-authored descriptions of the desired remote scene graph.
//!
//! # Core Concepts
//!
//! - [`InputDeclaration`]: a named source object with a kind and partial settings
//! - [`FilterConfig`]: a filter attached to an input or a scene
//! - [`SceneItemDeclaration`]: placement of a source inside a scene
//! - [`SceneDeclaration`]: a named scene; itself a valid source for another scene's item
//! - [`Kind`]: typed settings schema keyed by a kind string
//!
//! Nothing in this crate performs I/O. Declarations are plain data and can be
//! loaded from YAML or JSON.
//!
//! # Example
//!
//! ```rust
//! use scenesync_model::{InputDeclaration, SceneDeclaration, SceneItemDeclaration};
//!
//! let chat = InputDeclaration::new("Chat", "browser_source")
//!     .with_setting("url", "https://example.com/chat");
//!
//! let main = SceneDeclaration::new("Main")
//!     .with_item("chat", SceneItemDeclaration::new(chat));
//!
//! assert!(main.validate().is_ok());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod declaration;
mod error;
mod kind;
mod transform;

pub use declaration::{
    FilterConfig, InputDeclaration, SceneDeclaration, SceneItemDeclaration, SourceDeclaration,
};
pub use error::ModelError;
pub use kind::{to_settings, Kind};
pub use transform::Transform;

/// Partial settings map sent to the remote as-is.
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
