//! Real-time consultation session: WebSocket transport, wire protocol,
//! ack correlation and the client API.
//!
//! The session keeps one persistent connection per
//! [`ConsultationSessionClient`] and republishes every inbound event to the
//! subscribers registered through its `on_*` methods.

pub mod client;
pub mod connection;
pub mod pending_acks;
pub mod protocol;

pub use client::ConsultationSessionClient;
pub use connection::ConnectionState;
pub use protocol::{DoctorLoginAck, JoinAck, ModeAck};
