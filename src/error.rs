//! Custom error types for the drivers.
//!
//! This module defines the primary error type, `DaqError`, shared by the
//! transport adapters, the parameter table, the instrument drivers and the
//! buffer decoder. Using the `thiserror` crate, it gives every failure a
//! distinct, named variant so callers can match on what went wrong instead of
//! parsing messages.
//!
//! ## Error Hierarchy
//!
//! - **`Config`** / **`Configuration`**: loading errors from `figment` and
//!   semantic validation errors in the loaded configuration.
//! - **`Transport`**: failures talking to the instrument, including timeouts.
//! - **Parameter errors**: unknown names, read-only or write-only access, values
//!   outside a parameter's domain and responses that cannot be parsed.
//! - **Buffer errors**: `BufferNotPrepared`, `EmptyBuffer` and `MalformedFrame`
//!   raised around the SR844 data-buffer readout. None of them are retried
//!   internally.
//! - **`FeatureNotEnabled`**: functionality that was not compiled in (the VISA
//!   backend), with a message on how to enable it.

use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Every failure the drivers can report.
#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Parameter '{0}' is read-only")]
    ParameterReadOnly(String),

    #[error("Parameter '{0}' is write-only")]
    ParameterWriteOnly(String),

    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue { parameter: String, reason: String },

    #[error("Could not parse response {response:?} to '{command}'")]
    ResponseParse { command: String, response: String },

    #[error("Invalid channel {0}. The SR844 only has channels 1 and 2")]
    InvalidChannel(u8),

    #[error("Buffer for channel {channel} not ready. Please run prepare_buffer_readout")]
    BufferNotPrepared { channel: u8 },

    #[error("No points stored in the data buffer, nothing to read")]
    EmptyBuffer,

    #[error("Malformed buffer frame: {0}")]
    MalformedFrame(String),

    #[error("Buffer holds {reported} points but readout was prepared for {prepared}")]
    BufferSizeChanged { prepared: usize, reported: usize },
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}

impl DaqError {
    /// Shorthand for an `InvalidValue` error.
    pub fn invalid_value(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        DaqError::InvalidValue {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a `ResponseParse` error.
    pub fn response_parse(command: impl Into<String>, response: impl Into<String>) -> Self {
        DaqError::ResponseParse {
            command: command.into(),
            response: response.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DaqError::Instrument("lock-in overloaded".to_string());
        assert_eq!(err.to_string(), "Instrument error: lock-in overloaded");
    }

    #[test]
    fn test_buffer_errors_are_distinct() {
        let not_ready = DaqError::BufferNotPrepared { channel: 2 };
        assert!(not_ready.to_string().contains("channel 2"));
        assert!(not_ready.to_string().contains("prepare_buffer_readout"));

        assert!(matches!(DaqError::EmptyBuffer, DaqError::EmptyBuffer));

        let malformed = DaqError::MalformedFrame("7 bytes".into());
        assert_eq!(malformed.to_string(), "Malformed buffer frame: 7 bytes");
    }

    #[test]
    fn test_invalid_value_helper() {
        let err = DaqError::invalid_value("phase", "400 not in [-360, 360]");
        assert_eq!(
            err.to_string(),
            "Invalid value for 'phase': 400 not in [-360, 360]"
        );
    }
}
