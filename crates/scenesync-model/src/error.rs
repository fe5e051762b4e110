//! Declaration errors

/// Errors raised while building or validating declarations
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// An object was declared without a name
    #[error("{what} declared with an empty name")]
    EmptyName { what: &'static str },

    /// An object was declared without a kind
    #[error("{name} declared with an empty kind")]
    EmptyKind { name: String },

    /// A scene contains itself, directly or through nested scenes
    #[error("scene {name} contains itself via {path:?}")]
    SelfNesting { name: String, path: Vec<String> },

    /// Typed settings did not serialize to a JSON object
    #[error("settings for kind {kind} must serialize to an object: {reason}")]
    Settings { kind: String, reason: String },

    /// Declaration document could not be parsed
    #[error("failed to parse declaration: {0}")]
    Parse(String),
}

impl From<serde_yaml::Error> for ModelError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}
