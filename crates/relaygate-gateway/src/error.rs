//! Gateway error taxonomy.
//!
//! Codec and resolution errors are fatal to the current request and
//! surface immediately with `success=false`. Process-layer errors are
//! reported after the handler's single spawn retry. Platform errors carry
//! the adapter's verbatim payload so callers can inspect provider detail.

use relaygate_codec::CodecError;
use thiserror::Error;

/// Errors produced by the dispatch subsystem.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Envelope or content decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// No installed adapter serves the requested platform.
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    /// The adapter's declared protocol cannot serve the operation.
    #[error("capability mismatch: adapter '{adapter}' speaks {declared} but the operation needs {required}")]
    CapabilityMismatch {
        adapter: String,
        declared: String,
        required: String,
    },

    /// The adapter process could not be started (after one retry).
    #[error("adapter spawn failure for '{adapter}': {reason}")]
    AdapterSpawnFailure { adapter: String, reason: String },

    /// The adapter did not answer within the deadline.
    #[error("IPC timeout calling '{adapter}' method '{method}'")]
    IpcTimeout { adapter: String, method: String },

    /// The adapter produced output the frame decoder cannot recover from.
    #[error("IPC protocol error from '{adapter}': {reason}")]
    IpcProtocolError { adapter: String, reason: String },

    /// The stored token is expired and no refresh token is available.
    #[error("token for '{account}' on '{platform}' is expired and has no refresh token")]
    TokenExpiredNoRefresh { platform: String, account: String },

    /// The platform API rejected the call; `payload` is the adapter's
    /// verbatim error payload.
    #[error("platform API error: {message}")]
    PlatformApi {
        message: String,
        payload: Option<serde_json::Value>,
    },

    /// A manifest with the same name but different contents is already
    /// registered.
    #[error("adapter already registered with a conflicting manifest: {0}")]
    AlreadyExists(String),

    /// Registry lookup miss by adapter name.
    #[error("adapter not found: {0}")]
    NotFound(String),

    /// A required request field is empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Token vault collaborator failure.
    #[error("vault error: {0}")]
    Vault(String),

    /// Reliability scorer collaborator failure.
    #[error("reliability test error: {0}")]
    Reliability(String),

    /// Manifest file parsing failure.
    #[error("manifest parse error: {0}")]
    ManifestParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
