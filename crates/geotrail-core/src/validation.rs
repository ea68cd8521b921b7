//! # Validation Module
//!
//! Input validation for captured fixes and upload options.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Host bridge (JavaScript)                                     │
//! │  └── Shapes options into a ConfigPatch                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: configure() / upload() (Rust)                                │
//! │  └── THIS MODULE: field names, ranges, non-empty params                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  └── NOT NULL constraints                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use geotrail_core::validation::parse_upload_fields;
//! use geotrail_core::UploadField;
//!
//! let fields = parse_upload_fields(&["timestamp", "latitude"]).unwrap();
//! assert_eq!(fields, vec![UploadField::Timestamp, UploadField::Latitude]);
//! assert!(parse_upload_fields(&["altitude"]).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::{Fix, UploadField};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Fix Validators
// =============================================================================

/// Validates a fix before it is persisted.
///
/// ## Rules
/// - Latitude in [-90, 90], longitude in [-180, 180]
/// - Heading, when known, in [0, 360]
/// - Speed finite and not negative
pub fn validate_fix(fix: &Fix) -> ValidationResult<()> {
    check_range("latitude", fix.latitude, -90.0, 90.0)?;
    check_range("longitude", fix.longitude, -180.0, 180.0)?;

    if let Some(heading) = fix.heading {
        check_range("heading", heading, 0.0, 360.0)?;
    }

    if !fix.speed.is_finite() {
        return Err(ValidationError::NotFinite {
            field: "speed".to_string(),
        });
    }
    if fix.speed < 0.0 {
        return Err(ValidationError::Negative {
            field: "speed".to_string(),
        });
    }

    Ok(())
}

fn check_range(field: &str, value: f64, min: f64, max: f64) -> ValidationResult<()> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite {
            field: field.to_string(),
        });
    }
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
        });
    }
    Ok(())
}

// =============================================================================
// Upload Option Validators
// =============================================================================

/// Parses an ordered list of upload field names.
///
/// ## Rules
/// - At least one field
/// - Every name must be a known field (no silent skipping)
/// - No field listed twice
///
/// Order is preserved.
pub fn parse_upload_fields<S: AsRef<str>>(names: &[S]) -> ValidationResult<Vec<UploadField>> {
    if names.is_empty() {
        return Err(ValidationError::Required {
            field: "upload_fields".to_string(),
        });
    }

    let mut fields = Vec::with_capacity(names.len());
    for name in names {
        let field: UploadField = name.as_ref().parse()?;
        if fields.contains(&field) {
            return Err(ValidationError::Duplicate {
                field: "upload_fields".to_string(),
                value: field.to_string(),
            });
        }
        fields.push(field);
    }

    Ok(fields)
}

/// Validates the top-level parameter name that holds the batch.
pub fn validate_locations_param(name: &str) -> ValidationResult<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "upload_locations_param".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_fix() {
        assert!(validate_fix(&Fix::new(0, 45.0, 90.0)).is_ok());
        assert!(validate_fix(&Fix::new(0, -90.0, 180.0).with_heading(360.0)).is_ok());

        assert!(validate_fix(&Fix::new(0, 91.0, 0.0)).is_err());
        assert!(validate_fix(&Fix::new(0, 0.0, -180.5)).is_err());
        assert!(validate_fix(&Fix::new(0, f64::NAN, 0.0)).is_err());
        assert!(validate_fix(&Fix::new(0, 0.0, 0.0).with_heading(400.0)).is_err());
        assert!(validate_fix(&Fix::new(0, 0.0, 0.0).with_speed(-1.0)).is_err());
    }

    #[test]
    fn test_parse_upload_fields_preserves_order() {
        let fields = parse_upload_fields(&["speed", "timestamp", "heading"]).unwrap();
        assert_eq!(
            fields,
            vec![UploadField::Speed, UploadField::Timestamp, UploadField::Heading]
        );
    }

    #[test]
    fn test_parse_upload_fields_rejects_bad_input() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            parse_upload_fields(&empty),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            parse_upload_fields(&["timestamp", "altitude"]),
            Err(ValidationError::NotAllowed { .. })
        ));
        assert!(matches!(
            parse_upload_fields(&["latitude", "latitude"]),
            Err(ValidationError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_validate_locations_param() {
        assert!(validate_locations_param("locations").is_ok());
        assert!(validate_locations_param("  ").is_err());
    }
}
