//! # Error Types
//!
//! Domain-specific error types for tradepost-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tradepost-core errors (this file)                                     │
//! │  ├── CoreError        - A remote record cannot become a local record   │
//! │  └── ValidationError  - A single field failed a rule                   │
//! │                                                                         │
//! │  tradepost-db errors (separate crate)                                  │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  tradepost-sync errors (separate crate)                                │
//! │  ├── ApiError         - Remote call failures (transient / systemic)    │
//! │  └── SyncError        - Everything the orchestrator can surface        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → item counted as "failed"          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while turning a remote record into a local one.
///
/// A sync run never aborts on these: the offending item is counted as
/// failed and the run moves on.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A field the local model requires was absent from the remote record.
    ///
    /// ## When This Occurs
    /// - Marketplace returned a blueprint without a name
    /// - A listing arrived without its blueprint reference
    #[error("{entity} {remote_id} is missing required field '{field}'")]
    MissingField {
        entity: &'static str,
        remote_id: i64,
        field: &'static str,
    },

    /// A field was present but violated a validation rule.
    #[error("{entity} {remote_id} is invalid: {source}")]
    InvalidRecord {
        entity: &'static str,
        remote_id: i64,
        #[source]
        source: ValidationError,
    },

    /// The remote element did not have the expected shape at all.
    #[error(
        "{entity} {} is malformed: {reason}",
        .remote_id.map_or_else(|| "<no id>".to_string(), |id| id.to_string())
    )]
    Malformed {
        entity: &'static str,
        remote_id: Option<i64>,
        reason: String,
    },

    /// Validation error not tied to a specific record.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Wraps a validation error with the record it belongs to.
    pub fn invalid(entity: &'static str, remote_id: i64, source: ValidationError) -> Self {
        CoreError::InvalidRecord {
            entity,
            remote_id,
            source,
        }
    }

    /// Creates a missing-field error.
    pub fn missing(entity: &'static str, remote_id: i64, field: &'static str) -> Self {
        CoreError::MissingField {
            entity,
            remote_id,
            field,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Field-level validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid format (e.g., a schedule time that is not HH:MM).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::missing("Blueprint", 42, "name");
        assert_eq!(
            err.to_string(),
            "Blueprint 42 is missing required field 'name'"
        );
    }

    #[test]
    fn test_invalid_record_keeps_source() {
        let err = CoreError::invalid(
            "Listing",
            7,
            ValidationError::Negative {
                field: "quantity".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "Listing 7 is invalid: quantity must not be negative"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "code".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
