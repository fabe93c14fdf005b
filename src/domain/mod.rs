//! Domain layer: consultation rooms, messages, notifications and the
//! listener registry used to fan events out to subscribers.
//!
//! Everything here is transport-agnostic; [`crate::session`] decodes wire
//! frames into these types.

pub mod listener_registry;
pub mod message;
pub mod notification;
pub mod room;
pub mod room_directory;
pub mod room_id;

pub use listener_registry::{ListenerRegistry, Unsubscribe};
pub use message::{ChatMessage, MessageKind, SenderRole};
pub use notification::ChatNotification;
pub use room::{ConsultationRoom, MedicalContext, Participant, RoomStatus};
pub use room_directory::RoomDirectory;
pub use room_id::RoomId;
