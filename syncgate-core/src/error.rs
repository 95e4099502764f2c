//! Error types for the gateway core.

use syncgate_types::{ApplicationId, Capability, Topic};
use thiserror::Error;

/// Result type for collaborator (port) calls.
pub type PortResult<T> = Result<T, PortError>;

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    /// The addressed record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The collaborator rejected caller-supplied input.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// The collaborator failed or could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors surfaced to the caller of a workflow.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A workflow that needs `context` was called without one.
    #[error("Requested context is not provided.")]
    MissingContext,

    /// Malformed or schema-incompatible input.
    #[error("{0}")]
    InvalidRequest(String),

    /// No authenticated principal on the request.
    #[error("authentication required")]
    Unauthenticated,

    /// The ACL evaluator denied the operation.
    #[error("permission denied: {capability} on model '{model}'")]
    PermissionDenied { capability: Capability, model: String },

    #[error("Device is not registered")]
    DeviceNotRegistered,

    #[error("Subscription not found")]
    SubscriptionNotFound,

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// The acting principal has no account record.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// The application schema could not be loaded.
    #[error("schema unavailable for application {application_id}: {reason}")]
    Schema {
        application_id: ApplicationId,
        reason: String,
    },

    /// A registry, store or search call failed.
    #[error("collaborator failure: {0}")]
    Collaborator(String),

    /// The message bus did not accept an event.
    #[error("failed to publish to {topic} topic: {reason}")]
    Publish { topic: Topic, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// HTTP status mirrored into the response body.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::MissingContext | GatewayError::InvalidRequest(_) => 400,
            GatewayError::Unauthenticated => 401,
            GatewayError::PermissionDenied { .. } => 403,
            GatewayError::DeviceNotRegistered
            | GatewayError::SubscriptionNotFound
            | GatewayError::ObjectNotFound(_)
            | GatewayError::AccountNotFound(_) => 404,
            GatewayError::Schema { .. }
            | GatewayError::Collaborator(_)
            | GatewayError::Publish { .. }
            | GatewayError::Serialization(_) => 500,
        }
    }

    /// True for 4xx errors caused by the request itself.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Maps a port failure where any failure, including not-found, is a
    /// server-side fault.
    pub fn collaborator(err: PortError) -> Self {
        GatewayError::Collaborator(err.to_string())
    }
}

/// Default mapping. Call sites that expect a `NotFound` map it themselves
/// before falling back to this.
impl From<PortError> for GatewayError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Invalid(msg) => GatewayError::InvalidRequest(msg),
            other => GatewayError::collaborator(other),
        }
    }
}
