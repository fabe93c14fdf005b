//! # carelink-realtime
//!
//! Client-side real-time coordination layer for the CareLink
//! maternal-health app.
//!
//! The crate provides two services that UI collaborators share through an
//! explicitly constructed [`app_state::AppContext`]:
//!
//! - [`coordinator::RequestCoordinator`]: FIFO, single-worker execution of
//!   keyed asynchronous operations (typically REST calls), so no two
//!   operations ever run at the same time.
//! - [`session::ConsultationSessionClient`]: one persistent WebSocket
//!   connection for doctor–patient consultation rooms, with typed
//!   request/ack calls, fire-and-forget sends, listener fan-out and
//!   reconnection.
//!
//! ## Architecture
//!
//! ```text
//! UI collaborators
//!     │
//!     ├── RequestCoordinator (coordinator/)
//!     │       └── serial worker task
//!     │
//!     └── ConsultationSessionClient (session/)
//!             ├── PendingAcks
//!             ├── connection task ── WebSocket
//!             ├── RoomDirectory (domain/)
//!             └── ListenerRegistry × 5 (domain/)
//! ```

pub mod app_state;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod session;
