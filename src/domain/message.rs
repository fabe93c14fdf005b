//! Chat messages exchanged inside a consultation room.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RoomId;

/// Which side of the consultation sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    /// The patient who opened the room.
    Patient,
    /// The doctor attending the room.
    Doctor,
}

impl SenderRole {
    /// Returns the wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Doctor => "doctor",
        }
    }
}

/// Message body kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text.
    #[default]
    Text,
    /// Pre-encoded audio clip.
    Voice,
}

/// A message delivered through the `message` event.
///
/// Append-only: never mutated after receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Server-assigned message identifier.
    pub id: String,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Patient or doctor identifier of the sender.
    pub sender_id: String,
    /// Role of the sender.
    pub sender_role: SenderRole,
    /// Display name of the sender, when the server includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Text body (empty for voice messages without transcript).
    #[serde(default)]
    pub content: String,
    /// Body kind.
    #[serde(default, rename = "type")]
    pub kind: MessageKind,
    /// Base64-encoded audio for voice messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>,
    /// Audio duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Server timestamp.
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Returns `true` for voice messages.
    #[must_use]
    pub fn is_voice(&self) -> bool {
        self.kind == MessageKind::Voice
    }
}
