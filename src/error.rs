//! Client error types.
//!
//! [`ClientError`] is the central error type returned by the session client
//! and the request coordinator. [`TransportError`] is the cloneable error
//! value broadcast to every subscriber of the session's error channel.

use std::time::Duration;

/// Error returned by [`crate::session::ConsultationSessionClient`] and
/// [`crate::coordinator::RequestCoordinator`] operations.
///
/// # Categories
///
/// | Variant                                   | Origin      | Scope              |
/// |-------------------------------------------|-------------|--------------------|
/// | `Rejected`                                | Protocol    | the failing call   |
/// | `NotConnected`, `ConnectionLost`, `AckTimeout` | Transport | the failing call |
/// | `MalformedAck`, `Serialization`           | Codec       | the failing call   |
/// | `CoordinatorClosed`, `OperationAborted`   | Coordinator | the failing caller |
/// | `InvalidConfig`                           | Setup       | `initialize`       |
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server acknowledged the call with an error string.
    ///
    /// The display form is exactly the server's string.
    #[error("{0}")]
    Rejected(String),

    /// The session is not in the `Connected` state.
    #[error("not connected")]
    NotConnected,

    /// The connection dropped while the call awaited its acknowledgment.
    #[error("connection lost before acknowledgment")]
    ConnectionLost,

    /// No acknowledgment arrived within the configured timeout.
    #[error("no acknowledgment within {0:?}")]
    AckTimeout(Duration),

    /// The acknowledgment payload did not have the expected shape.
    #[error("malformed acknowledgment for {event}: {reason}")]
    MalformedAck {
        /// Outbound event name the acknowledgment belongs to.
        event: &'static str,
        /// Decoder error message.
        reason: String,
    },

    /// An outbound payload could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request coordinator has been shut down.
    #[error("request coordinator is closed")]
    CoordinatorClosed,

    /// A queued operation panicked before settling.
    #[error("queued operation for key {0} aborted")]
    OperationAborted(String),

    /// The supplied configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Connection-level error broadcast to all error subscribers.
///
/// These errors are not attributable to a single pending call, so they are
/// published through the session's error channel instead of returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Opening the WebSocket failed (the `connect_error` event).
    #[error("connect error: {0}")]
    ConnectFailed(String),

    /// The server pushed an `error` event.
    #[error("server error: {0}")]
    Server(String),

    /// An established connection closed unexpectedly.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// An inbound frame could not be decoded.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}
