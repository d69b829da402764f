//! Error types for the Vika provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Vika provider errors
#[derive(Error, Debug)]
pub enum VikaError {
    /// API answered with `success: false`
    #[error("Vika API error (code {code}): {message}")]
    ApiError { code: i64, message: String },

    /// Non-2xx status without a usable envelope
    #[error("HTTP error (status {status_code}): {message}")]
    HttpError { status_code: u16, message: String },

    /// Rate limit or server errors persisted across every attempt
    #[error("Request failed after {attempts} attempts (last status {status_code})")]
    RetriesExhausted { attempts: u32, status_code: u16 },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// No record matched the lookup
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// The filter cannot be expressed as a datasheet formula
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Local file could not be read for upload
    #[error("Failed to read {path}: {message}")]
    FileRead { path: String, message: String },

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Vika operations
pub type Result<T> = std::result::Result<T, VikaError>;

impl From<VikaError> for BridgeError {
    fn from(error: VikaError) -> Self {
        match error {
            VikaError::RecordNotFound(what) => BridgeError::NotFound(what),
            VikaError::UnsupportedFilter(msg) => {
                BridgeError::InvalidInput(format!("Unsupported filter: {}", msg))
            }
            VikaError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = VikaError::ApiError {
            code: 301,
            message: "Datasheet not found".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Vika API error (code 301): Datasheet not found"
        );
    }

    #[test]
    fn test_error_conversion() {
        let bridge: BridgeError = VikaError::RecordNotFound("rec1".to_string()).into();
        assert!(matches!(bridge, BridgeError::NotFound(ref id) if id == "rec1"));

        let bridge: BridgeError = VikaError::UnsupportedFilter("recordId".to_string()).into();
        assert!(matches!(bridge, BridgeError::InvalidInput(_)));

        let bridge: BridgeError = VikaError::ParseError("eof".to_string()).into();
        assert!(matches!(bridge, BridgeError::OperationFailed(_)));
    }
}
