//! Error types for probability calibration

use thiserror::Error;

/// Result type alias for calibration operations
pub type Result<T> = std::result::Result<T, CalibrationError>;

/// Main error type for the calibration crate
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Not fitted: {0} is only available after a successful fit")]
    NotFitted(String),

    #[error("Input outside training domain: {0}")]
    DomainError(String),

    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CalibrationError::NotFitted("temperature".to_string());
        assert_eq!(
            err.to_string(),
            "Not fitted: temperature is only available after a successful fit"
        );
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = CalibrationError::InvalidParameter {
            name: "t_init".to_string(),
            value: "0".to_string(),
            reason: "temperature must be greater than 0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid parameter: t_init = 0, temperature must be greater than 0"
        );
    }
}
