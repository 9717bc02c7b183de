//! Error types for the meter.

use thiserror::Error;

/// Main error type for meter operations.
#[derive(Debug, Error)]
pub enum MeterError {
    #[error("Invalid rate: {0}")]
    InvalidRateSpec(String),

    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("History query failed: {0}")]
    TransportFailure(String),

    #[error("Unparsable quantity: {0:?}")]
    UnparsableQuantity(String),

    #[error("Unparsable block time: {0:?}")]
    UnparsableTimestamp(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Payments are disabled: no submitter configured")]
    PaymentsDisabled,

    #[error("Payment rejected: {0}")]
    PaymentRejected(String),
}

impl From<serde_json::Error> for MeterError {
    fn from(e: serde_json::Error) -> Self {
        MeterError::Decode(e.to_string())
    }
}

impl From<regex::Error> for MeterError {
    fn from(e: regex::Error) -> Self {
        MeterError::InvalidConfig(e.to_string())
    }
}

/// Result type for meter operations.
pub type Result<T> = std::result::Result<T, MeterError>;
