//! # Sync Error Types
//!
//! Error types for remote calls and sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Error Categories                                  │
//! │                                                                         │
//! │  ApiError (one remote call)                                            │
//! │  ├── transient:  Http 5xx/408/429 · Timeout · Network                  │
//! │  │               → retried by the resilience policy                     │
//! │  ├── permanent:  Http other 4xx · Decode · InvalidRequest              │
//! │  │               → returned immediately, item/parent-level failure      │
//! │  └── systemic:   RetriesExhausted · CircuitOpen                        │
//! │                  → aborts the current sync stage                        │
//! │                                                                         │
//! │  SyncError (everything else the crate can surface)                     │
//! │  ├── Configuration   InvalidConfig · InvalidUrl · ConfigLoadFailed     │
//! │  ├── Remote          Api(ApiError)                                      │
//! │  ├── Data            Mapping(CoreError) · Database(DbError)             │
//! │  ├── Webhook         InvalidSignature · InvalidPayload                  │
//! │  └── Orchestration   AlreadyRunning · Cancelled · NotFound              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use tradepost_core::CoreError;
use tradepost_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Remote API Errors
// =============================================================================

/// Failure of a single marketplace call.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Non-success HTTP status.
    #[error("HTTP {status} from {endpoint}: {message}")]
    Http {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// The attempt did not complete within the per-attempt timeout.
    #[error("{endpoint} timed out after {seconds}s")]
    Timeout { endpoint: String, seconds: u64 },

    /// Connection refused, reset, DNS failure...
    #[error("Network error calling {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    /// Response body did not match the expected shape.
    #[error("Failed to decode {endpoint} response: {message}")]
    Decode { endpoint: String, message: String },

    /// The request could not be built (bad base URL, bad path).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The endpoint's circuit is open; the call was not attempted.
    #[error("Circuit open for {endpoint}")]
    CircuitOpen { endpoint: String },

    /// Every attempt failed with a transient error.
    #[error("{endpoint} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        endpoint: String,
        attempts: u32,
        last_error: Box<ApiError>,
    },
}

impl ApiError {
    /// Returns true if retrying the same call may succeed.
    ///
    /// ## Transient Errors
    /// - 5xx, 408 Request Timeout, 429 Too Many Requests
    /// - Per-attempt timeout
    /// - Network failures
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            ApiError::Timeout { .. } | ApiError::Network { .. } => true,
            _ => false,
        }
    }

    /// Returns true if this failure means the endpoint is unusable right now.
    /// A stage hitting a systemic error stops instead of failing item by item.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            ApiError::CircuitOpen { .. } | ApiError::RetriesExhausted { .. }
        )
    }

    /// HTTP status, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::RetriesExhausted { last_error, .. } => last_error.status(),
            _ => None,
        }
    }
}

// =============================================================================
// Sync Errors
// =============================================================================

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid marketplace URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// Marketplace call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    // =========================================================================
    // Data Errors
    // =========================================================================
    /// A remote record could not be mapped to a local one.
    #[error("Mapping failed: {0}")]
    Mapping(#[from] CoreError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// A local entity referenced by the request does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    // =========================================================================
    // Webhook Errors
    // =========================================================================
    /// Signature header missing or not matching the body.
    #[error("Webhook signature verification failed")]
    InvalidSignature,

    /// Webhook body could not be understood.
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    // =========================================================================
    // Orchestration Errors
    // =========================================================================
    /// A sync run is already in progress.
    #[error("A sync run is already in progress")]
    AlreadyRunning,

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidPayload(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if redelivering / re-running the same operation later may
    /// succeed (remote outage, database busy).
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Api(e) => e.is_transient() || e.is_systemic(),
            SyncError::Database(DbError::PoolExhausted | DbError::ConnectionFailed(_)) => true,
            SyncError::AlreadyRunning => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns the remote error if this is a systemic remote failure.
    pub fn as_systemic(&self) -> Option<&ApiError> {
        match self {
            SyncError::Api(e) if e.is_systemic() => Some(e),
            _ => None,
        }
    }
}
