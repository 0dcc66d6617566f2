//! # Error Types
//!
//! Custom error types for AWS Monitor using `thiserror`.

use thiserror::Error;

/// Reasons a station payload could not be turned into a [`Reading`].
///
/// [`Reading`]: crate::station::protocol::Reading
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Payload bytes are not valid UTF-8
    #[error("payload is not valid UTF-8")]
    InvalidEncoding,

    /// A required `Label = value` token is absent
    #[error("missing field '{field}'")]
    MissingField { field: &'static str },

    /// The captured value is not a number of the declared type
    #[error("invalid value '{value}' for field '{field}'")]
    InvalidNumber { field: &'static str, value: String },

    /// The value parsed but lies outside the physical range of the sensor
    #[error("value '{value}' for field '{field}' is out of range")]
    OutOfRange { field: &'static str, value: String },
}

/// Main error type for AWS Monitor
#[derive(Debug, Error)]
pub enum AwsMonitorError {
    /// Payload parse failures
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Appending a row to the store failed
    #[error("Store write error: {0}")]
    StoreWrite(String),

    /// Reading rows back from the store failed
    #[error("Store read error: {0}")]
    StoreRead(String),

    /// Broker client errors
    #[error("MQTT error: {0}")]
    Mqtt(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for AWS Monitor
pub type Result<T> = std::result::Result<T, AwsMonitorError>;
