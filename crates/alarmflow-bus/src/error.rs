//! Error types for bus operations.

use alarmflow_types::codec::CodecError;

/// Errors raised by publishers and subscribers.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Connection to the brokers could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A value could not be published.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// The subscription could not be established.
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    /// The component is not in the state required by the operation.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// The expected lifecycle state.
        expected: &'static str,
        /// The actual lifecycle state.
        actual: &'static str,
    },

    /// A wire value could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}
