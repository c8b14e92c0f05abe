//! # Error Types
//!
//! Structured error types for emissions_core. Every failure carries enough
//! context (activity id, factor id, unit, region) to tell an operator what to
//! fix without re-running the calculation.
//!
//! Two kinds of failure matter most for triage and survive every wrapping
//! layer: [`ErrorKind::NotFound`] means configuration is missing (register a
//! factor), [`ErrorKind::UnsupportedUnit`] means the activity data is bad (fix
//! the input). A negative or non-finite quantity is bad input too and
//! classifies as [`ErrorKind::InvalidQuantity`]. Use [`EmissionsError::kind`]
//! rather than matching on the outer variant.
//!
//! ## Example
//!
//! ```rust
//! use emissions_core::errors::{EmissionsError, EmissionsResult};
//!
//! fn to_kwh(quantity: f64, unit: &str) -> EmissionsResult<f64> {
//!     match unit {
//!         "kWh" => Ok(quantity),
//!         "MWh" => Ok(quantity * 1000.0),
//!         other => Err(EmissionsError::unsupported_unit(other, "not an energy unit")),
//!     }
//! }
//!
//! let err = to_kwh(12.0, "gal").unwrap_err();
//! assert!(err.is_unsupported_unit());
//! assert!(!err.is_not_found());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scope::Scope;

/// Result type alias for emissions_core operations
pub type EmissionsResult<T> = Result<T, EmissionsError>;

/// Structured error type for registry, calculator and engine operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum EmissionsError {
    /// No factor satisfies the lookup
    #[error("Emission factor not found: {query}")]
    NotFound { query: String },

    /// Scope number outside 1..=3
    #[error("Invalid scope: {value}")]
    InvalidScope { value: String },

    #[error("Invalid region '{region}': {reason}")]
    InvalidRegion { region: String, reason: String },

    #[error("Invalid source '{activity_source}': {reason}")]
    InvalidSource {
        activity_source: String,
        reason: String,
    },

    /// Unit cannot be processed or converted
    #[error("Unsupported unit '{unit}': {reason}")]
    UnsupportedUnit { unit: String, reason: String },

    /// The activity carries no identity
    #[error("Activity is missing or has no identifier")]
    NilActivity,

    /// Quantity is negative, NaN or infinite. Kept as text so NaN survives JSON.
    #[error("Invalid quantity {quantity} for activity '{activity_id}': {reason}")]
    InvalidQuantity {
        activity_id: String,
        quantity: String,
        reason: String,
    },

    /// Factor failed validation on registration or load
    #[error("Invalid factor '{factor_id}': {field} - {reason}")]
    InvalidFactor {
        factor_id: String,
        field: String,
        reason: String,
    },

    #[error("No calculator registered for {scope} (activity '{activity_id}')")]
    NoCalculatorRegistered { activity_id: String, scope: Scope },

    /// The routed calculator does not accept the activity
    #[error("Activity '{activity_id}' is not supported: source '{activity_source}', unit '{unit}'")]
    UnsupportedActivity {
        activity_id: String,
        activity_source: String,
        unit: String,
    },

    /// A calculator failed; `cause` holds the underlying error
    #[error("Calculation failed for activity '{activity_id}' ({scope})")]
    CalculationFailed {
        activity_id: String,
        scope: Scope,
        #[source]
        cause: Box<EmissionsError>,
    },

    /// Batch was cancelled before the activity got a worker slot
    #[error("Calculation cancelled for activity '{activity_id}'")]
    Cancelled { activity_id: String },

    #[error("Factor registry unavailable: {reason}")]
    RegistryUnavailable { reason: String },

    #[error("Invalid configuration: {problems:?}")]
    InvalidConfig { problems: Vec<String> },

    /// File I/O error
    #[error("File error: {operation} on '{path}' - {reason}")]
    FileError {
        operation: String,
        path: String,
        reason: String,
    },

    /// JSON / TOML serialization or deserialization error
    #[error("Serialization error: {reason}")]
    SerializationError { reason: String },

    /// Schema version mismatch
    #[error("Version mismatch: file version {file_version}, expected {expected_version}")]
    VersionMismatch {
        file_version: String,
        expected_version: String,
    },

    /// Generic internal error (should be rare)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse classification that sees through wrapping layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidScope,
    InvalidRegion,
    InvalidSource,
    UnsupportedUnit,
    NilActivity,
    InvalidQuantity,
    InvalidFactor,
    CalculationFailed,
    Cancelled,
    RegistryUnavailable,
    InvalidConfig,
    Io,
    Internal,
}

impl EmissionsError {
    /// Create a NotFound error
    pub fn not_found(query: impl Into<String>) -> Self {
        EmissionsError::NotFound {
            query: query.into(),
        }
    }

    pub fn invalid_region(region: impl Into<String>, reason: impl Into<String>) -> Self {
        EmissionsError::InvalidRegion {
            region: region.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_source(activity_source: impl Into<String>, reason: impl Into<String>) -> Self {
        EmissionsError::InvalidSource {
            activity_source: activity_source.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedUnit error
    pub fn unsupported_unit(unit: impl Into<String>, reason: impl Into<String>) -> Self {
        EmissionsError::UnsupportedUnit {
            unit: unit.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_quantity(activity_id: impl Into<String>, quantity: f64, reason: impl Into<String>) -> Self {
        EmissionsError::InvalidQuantity {
            activity_id: activity_id.into(),
            quantity: quantity.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidFactor error
    pub fn invalid_factor(
        factor_id: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        EmissionsError::InvalidFactor {
            factor_id: factor_id.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a calculator error with the activity that caused it
    pub fn calculation_failed(activity_id: impl Into<String>, scope: Scope, cause: EmissionsError) -> Self {
        EmissionsError::CalculationFailed {
            activity_id: activity_id.into(),
            scope,
            cause: Box::new(cause),
        }
    }

    pub fn registry_unavailable(reason: impl Into<String>) -> Self {
        EmissionsError::RegistryUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a FileError
    pub fn file_error(operation: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        EmissionsError::FileError {
            operation: operation.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn serialization(reason: impl Into<String>) -> Self {
        EmissionsError::SerializationError {
            reason: reason.into(),
        }
    }

    /// The innermost error, following `CalculationFailed` causes.
    pub fn root_cause(&self) -> &EmissionsError {
        let mut current = self;
        while let EmissionsError::CalculationFailed { cause, .. } = current {
            current = &**cause;
        }
        current
    }

    /// Classify the error after unwrapping engine context.
    ///
    /// `UnsupportedActivity` is bad input data and classifies as
    /// [`ErrorKind::UnsupportedUnit`]; `NoCalculatorRegistered` is an engine
    /// wiring failure and classifies as [`ErrorKind::CalculationFailed`].
    pub fn kind(&self) -> ErrorKind {
        match self.root_cause() {
            EmissionsError::NotFound { .. } => ErrorKind::NotFound,
            EmissionsError::InvalidScope { .. } => ErrorKind::InvalidScope,
            EmissionsError::InvalidRegion { .. } => ErrorKind::InvalidRegion,
            EmissionsError::InvalidSource { .. } => ErrorKind::InvalidSource,
            EmissionsError::UnsupportedUnit { .. } | EmissionsError::UnsupportedActivity { .. } => {
                ErrorKind::UnsupportedUnit
            }
            EmissionsError::NilActivity => ErrorKind::NilActivity,
            EmissionsError::InvalidQuantity { .. } => ErrorKind::InvalidQuantity,
            EmissionsError::InvalidFactor { .. } => ErrorKind::InvalidFactor,
            EmissionsError::NoCalculatorRegistered { .. } | EmissionsError::CalculationFailed { .. } => {
                ErrorKind::CalculationFailed
            }
            EmissionsError::Cancelled { .. } => ErrorKind::Cancelled,
            EmissionsError::RegistryUnavailable { .. } => ErrorKind::RegistryUnavailable,
            EmissionsError::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            EmissionsError::FileError { .. }
            | EmissionsError::SerializationError { .. }
            | EmissionsError::VersionMismatch { .. } => ErrorKind::Io,
            EmissionsError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Missing configuration: a factor needs to be registered.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Bad input data: the activity needs fixing.
    pub fn is_unsupported_unit(&self) -> bool {
        self.kind() == ErrorKind::UnsupportedUnit
    }

    /// Get a short error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            EmissionsError::NotFound { .. } => "NOT_FOUND",
            EmissionsError::InvalidScope { .. } => "INVALID_SCOPE",
            EmissionsError::InvalidRegion { .. } => "INVALID_REGION",
            EmissionsError::InvalidSource { .. } => "INVALID_SOURCE",
            EmissionsError::UnsupportedUnit { .. } => "UNSUPPORTED_UNIT",
            EmissionsError::NilActivity => "NIL_ACTIVITY",
            EmissionsError::InvalidQuantity { .. } => "INVALID_QUANTITY",
            EmissionsError::InvalidFactor { .. } => "INVALID_FACTOR",
            EmissionsError::NoCalculatorRegistered { .. } => "NO_CALCULATOR_REGISTERED",
            EmissionsError::UnsupportedActivity { .. } => "UNSUPPORTED_ACTIVITY",
            EmissionsError::CalculationFailed { .. } => "CALCULATION_FAILED",
            EmissionsError::Cancelled { .. } => "CANCELLED",
            EmissionsError::RegistryUnavailable { .. } => "REGISTRY_UNAVAILABLE",
            EmissionsError::InvalidConfig { .. } => "INVALID_CONFIG",
            EmissionsError::FileError { .. } => "FILE_ERROR",
            EmissionsError::SerializationError { .. } => "SERIALIZATION_ERROR",
            EmissionsError::VersionMismatch { .. } => "VERSION_MISMATCH",
            EmissionsError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for EmissionsError {
    fn from(err: serde_json::Error) -> Self {
        EmissionsError::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for EmissionsError {
    fn from(err: toml::de::Error) -> Self {
        EmissionsError::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_serialization() {
        let error = EmissionsError::calculation_failed(
            "act-1",
            Scope::Scope2,
            EmissionsError::unsupported_unit("gallons", "not an energy unit"),
        );
        let json = serde_json::to_string(&error).unwrap();
        let roundtrip: EmissionsError = serde_json::from_str(&json).unwrap();
        assert_eq!(error, roundtrip);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(EmissionsError::not_found("x").error_code(), "NOT_FOUND");
        assert_eq!(EmissionsError::NilActivity.error_code(), "NIL_ACTIVITY");
    }

    #[test]
    fn test_kind_survives_wrapping() {
        let not_found = EmissionsError::calculation_failed("a", Scope::Scope1, EmissionsError::not_found("diesel"));
        let bad_unit = EmissionsError::calculation_failed(
            "b",
            Scope::Scope3,
            EmissionsError::unsupported_unit("furlongs", "no conversion to km"),
        );

        assert!(not_found.is_not_found());
        assert!(!not_found.is_unsupported_unit());
        assert!(bad_unit.is_unsupported_unit());
        assert!(!bad_unit.is_not_found());
        assert_eq!(not_found.error_code(), "CALCULATION_FAILED");
    }

    #[test]
    fn test_source_chain() {
        let err = EmissionsError::calculation_failed("a", Scope::Scope1, EmissionsError::not_found("diesel"));
        let source = err.source().expect("wrapped cause");
        assert!(source.to_string().contains("diesel"));
    }

    #[test]
    fn test_invalid_quantity_keeps_nan_through_json() {
        let err = EmissionsError::calculation_failed(
            "a",
            Scope::Scope2,
            EmissionsError::invalid_quantity("a", f64::NAN, "quantity must be a finite number"),
        );
        assert_eq!(err.kind(), ErrorKind::InvalidQuantity);
        assert!(!err.is_unsupported_unit());

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("NaN"));
        let roundtrip: EmissionsError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, roundtrip);
        assert_eq!(roundtrip.root_cause().error_code(), "INVALID_QUANTITY");
    }

    #[test]
    fn test_unsupported_activity_is_bad_input() {
        let err = EmissionsError::UnsupportedActivity {
            activity_id: "a".into(),
            activity_source: "fleet".into(),
            unit: "kWh".into(),
        };
        assert_eq!(err.kind(), ErrorKind::UnsupportedUnit);
    }
}
