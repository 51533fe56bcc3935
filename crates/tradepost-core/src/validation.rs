//! # Validation Module
//!
//! Rules applied to remote records before they touch the local store.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: serde (tradepost-sync::protocol)                             │
//! │  └── Shape of the JSON: types, required keys                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Entity Mapper + THIS MODULE                                  │
//! │  ├── Empty names, negative quantities, unknown conditions              │
//! │  └── Failure here → item counted as "failed", run continues            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK (quantity >= 0)                                  │
//! │  ├── UNIQUE (remote_id)                                                │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveTime;

use crate::error::ValidationError;
use crate::{CONDITIONS, MAX_CODE_LEN, MAX_NAME_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a marketplace identifier. Remote ids are strictly positive.
pub fn validate_remote_id(field: &str, id: i64) -> ValidationResult<()> {
    if id <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates and normalizes a display name.
///
/// ## Rules
/// - Surrounding whitespace is trimmed
/// - Must not be empty
/// - At most [`MAX_NAME_LEN`] characters
///
/// ```rust
/// use tradepost_core::validation::validate_name;
///
/// assert_eq!(validate_name("name", "  Alpha ").unwrap(), "Alpha");
/// assert!(validate_name("name", "   ").is_err());
/// ```
pub fn validate_name(field: &str, value: &str) -> ValidationResult<String> {
    validate_text(field, value, MAX_NAME_LEN)
}

/// Validates and normalizes a short code (expansion code, order code).
pub fn validate_code(field: &str, value: &str) -> ValidationResult<String> {
    validate_text(field, value, MAX_CODE_LEN)
}

fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value.to_string())
}

/// Normalizes an optional free-text attribute: blank becomes `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Validates a card condition against the marketplace's fixed list.
///
/// Matching is case-insensitive; the canonical spelling is returned.
pub fn validate_condition(value: &str) -> ValidationResult<String> {
    let value = value.trim();
    CONDITIONS
        .iter()
        .find(|c| c.eq_ignore_ascii_case(value))
        .map(|c| c.to_string())
        .ok_or_else(|| ValidationError::NotAllowed {
            field: "condition".to_string(),
            allowed: CONDITIONS.iter().map(|c| c.to_string()).collect(),
        })
}

/// Validates a language code (`en`, `de`, `jp`, ...). Returned lowercase.
pub fn validate_language(value: &str) -> ValidationResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: "language".to_string(),
        });
    }
    if value.len() > 8 || !value.chars().all(|c| c.is_ascii_alphabetic() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: "language".to_string(),
            reason: format!("'{}' is not a language code", value),
        });
    }
    Ok(value.to_ascii_lowercase())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a stock or order quantity (zero allowed).
pub fn validate_quantity(field: &str, quantity: i64) -> ValidationResult<()> {
    if quantity < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates an amount in cents (zero allowed).
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Schedule Validators
// =============================================================================

/// Parses a daily schedule time in `HH:MM` (24h) format.
///
/// ```rust
/// use tradepost_core::validation::parse_daily_time;
///
/// let t = parse_daily_time("03:30").unwrap();
/// assert_eq!(t.to_string(), "03:30:00");
/// assert!(parse_daily_time("25:00").is_err());
/// ```
pub fn parse_daily_time(value: &str) -> ValidationResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| {
        ValidationError::InvalidFormat {
            field: "daily_at".to_string(),
            reason: format!("expected HH:MM ({})", e),
        }
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_id() {
        assert!(validate_remote_id("id", 1).is_ok());
        assert!(validate_remote_id("id", 0).is_err());
        assert!(validate_remote_id("id", -4).is_err());
    }

    #[test]
    fn test_name_validation() {
        assert_eq!(validate_name("name", "Dominaria").unwrap(), "Dominaria");
        assert!(matches!(
            validate_name("name", ""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_name("name", &"x".repeat(MAX_NAME_LEN + 1)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_code_validation() {
        assert_eq!(validate_code("code", " dom ").unwrap(), "dom");
        assert!(validate_code("code", &"c".repeat(MAX_CODE_LEN + 1)).is_err());
    }

    #[test]
    fn test_optional_text() {
        assert_eq!(optional_text(Some(" rare ")), Some("rare".to_string()));
        assert_eq!(optional_text(Some("  ")), None);
        assert_eq!(optional_text(None), None);
    }

    #[test]
    fn test_condition_is_canonicalized() {
        assert_eq!(validate_condition("near mint").unwrap(), "Near Mint");
        assert!(matches!(
            validate_condition("Pristine"),
            Err(ValidationError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_language() {
        assert_eq!(validate_language("EN").unwrap(), "en");
        assert_eq!(validate_language("zh-tw").unwrap(), "zh-tw");
        assert!(validate_language("").is_err());
        assert!(validate_language("english!").is_err());
    }

    #[test]
    fn test_quantity_and_price() {
        assert!(validate_quantity("quantity", 0).is_ok());
        assert!(validate_quantity("quantity", -1).is_err());
        assert!(validate_price_cents("price", 0).is_ok());
        assert!(validate_price_cents("price", -1).is_err());
    }

    #[test]
    fn test_daily_time() {
        assert_eq!(
            parse_daily_time("00:05").unwrap(),
            NaiveTime::from_hms_opt(0, 5, 0).unwrap()
        );
        assert!(parse_daily_time("3am").is_err());
        assert!(parse_daily_time("12:60").is_err());
    }
}
