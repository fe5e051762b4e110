//! Object kinds
//!
//! A kind is identified by a string and carries a settings schema type. The
//! reconciler never looks inside the schema; it only compares kind strings.

use crate::{ModelError, Settings};
use serde::Serialize;

/// Trait for source and filter kinds
///
/// # Example
/// ```rust
/// use scenesync_model::{InputDeclaration, Kind};
/// use serde::Serialize;
///
/// struct BrowserSource;
///
/// #[derive(Serialize)]
/// struct BrowserSettings {
///     url: String,
///     width: u32,
/// }
///
/// impl Kind for BrowserSource {
///     const KIND: &'static str = "browser_source";
///     type Settings = BrowserSettings;
/// }
///
/// let settings = BrowserSettings { url: "https://x".into(), width: 800 };
/// let input = InputDeclaration::of_kind::<BrowserSource>("Chat", &settings).unwrap();
/// assert_eq!(input.kind, "browser_source");
/// assert_eq!(input.settings["width"], 800);
/// ```
pub trait Kind {
    /// Kind string as known by the remote
    const KIND: &'static str;

    /// Settings schema; fields left out of the serialized form are not touched remotely
    type Settings: Serialize;
}

/// Serialize typed settings into a partial settings map
///
/// # Errors
/// Returns [`ModelError::Settings`] if `settings` is not an object.
pub fn to_settings<K: Kind>(settings: &K::Settings) -> Result<Settings, ModelError> {
    match serde_json::to_value(settings) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(ModelError::Settings {
            kind: K::KIND.to_string(),
            reason: format!("got {other}"),
        }),
        Err(e) => Err(ModelError::Settings {
            kind: K::KIND.to_string(),
            reason: e.to_string(),
        }),
    }
}
