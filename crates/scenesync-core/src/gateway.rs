//! Remote gateway contract
//!
//! The gateway is the only way the core talks to the remote compositor: a
//! request/response call with a named method and a JSON payload. Transport,
//! authentication and the wire codec live behind this trait.

use async_trait::async_trait;
use serde_json::Value;

/// Request status codes the core classifies
pub mod status {
    /// The request type is unknown to the remote
    pub const UNKNOWN_REQUEST_TYPE: u16 = 204;
    /// A required request field is missing
    pub const MISSING_REQUEST_FIELD: u16 = 300;
    /// The named resource does not exist
    pub const RESOURCE_NOT_FOUND: u16 = 600;
    /// A resource already exists under this name
    pub const RESOURCE_ALREADY_EXISTS: u16 = 601;
    /// The name refers to a resource of another type (input vs scene)
    pub const INVALID_RESOURCE_TYPE: u16 = 602;
    /// The resource cannot accept this mutation right now
    pub const INVALID_RESOURCE_STATE: u16 = 604;
    /// The resource does not support this configuration
    pub const RESOURCE_NOT_CONFIGURABLE: u16 = 606;
}

/// Coarse classification of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Object not found
    NotFound,
    /// Object already exists under this name
    AlreadyExists,
    /// Name refers to an object of another type
    WrongType,
    /// Object cannot currently accept this mutation
    NotMutable,
    /// Anything else, including transport failures
    Other,
}

/// Errors returned by a [`Gateway`]
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// The remote answered with a failed request status
    #[error("{method} failed with status {code}: {comment}")]
    Status {
        method: String,
        code: u16,
        comment: String,
    },

    /// The request never got an answer
    #[error("transport failure: {0}")]
    Transport(String),

    /// The answer did not have the expected shape
    #[error("malformed {method} response: {reason}")]
    Decode { method: String, reason: String },
}

impl GatewayError {
    /// Build a status error
    pub fn status(method: impl Into<String>, code: u16, comment: impl Into<String>) -> Self {
        Self::Status {
            method: method.into(),
            code,
            comment: comment.into(),
        }
    }

    /// Classify the failure
    #[must_use]
    pub fn class(&self) -> StatusClass {
        match self {
            Self::Status { code, .. } => match *code {
                status::RESOURCE_NOT_FOUND => StatusClass::NotFound,
                status::RESOURCE_ALREADY_EXISTS => StatusClass::AlreadyExists,
                status::INVALID_RESOURCE_TYPE => StatusClass::WrongType,
                status::INVALID_RESOURCE_STATE | status::RESOURCE_NOT_CONFIGURABLE => {
                    StatusClass::NotMutable
                }
                _ => StatusClass::Other,
            },
            Self::Transport(_) | Self::Decode { .. } => StatusClass::Other,
        }
    }

    /// True for "object not found"
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.class() == StatusClass::NotFound
    }

    /// True for "object already exists under this name"
    #[inline]
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        self.class() == StatusClass::AlreadyExists
    }

    /// True for "object cannot currently accept this mutation"
    #[inline]
    #[must_use]
    pub fn is_not_mutable(&self) -> bool {
        self.class() == StatusClass::NotMutable
    }
}

/// Request/response channel to the remote compositor
///
/// Implementations must be safe to share; the core issues independent
/// read-only requests concurrently over one gateway.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Issue `method` with `params` and return the response payload
    ///
    /// # Errors
    /// - [`GatewayError::Status`] when the remote rejects the request
    /// - [`GatewayError::Transport`] when the channel fails
    async fn call(&self, method: &str, params: Value) -> Result<Value, GatewayError>;
}
