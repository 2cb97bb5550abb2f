use thiserror::Error;

/// Errors raised by the scheduling engine and its parameter store.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Rejected parameter update; the active parameters are unchanged.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Rating outside Again/Hard/Good/Easy.
    #[error("invalid rating: {0}")]
    InvalidRating(String),

    /// Caller-supplied prior state violates a scheduling invariant.
    #[error("invalid scheduling state: {0}")]
    InvalidState(String),

    /// A formula produced NaN or infinity. Indicates a bad weight table.
    #[error("non-finite {quantity}: {value}")]
    NonFinite { quantity: &'static str, value: f64 },

    #[error("failed to read parameter file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to parse parameter file: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
