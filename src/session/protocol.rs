//! Wire protocol: frame envelope, outbound commands, inbound events and
//! acknowledgment payloads.
//!
//! Every WebSocket text frame carries one [`Frame`]. Outbound events that
//! expect an acknowledgment carry a correlation `id`; the server answers
//! with an `ack` frame bearing the same `id` and either an `error` string
//! or a payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ChatMessage, ChatNotification, ConsultationRoom, MedicalContext, RoomId, RoomStatus,
    SenderRole,
};

/// Top-level WebSocket frame envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame type discriminator.
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    /// Correlation id; present on events expecting an ack and on acks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Event name; absent on acks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Protocol-level error carried by an ack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Event- or ack-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Frame {
    /// Builds an event frame.
    #[must_use]
    pub fn event(name: &str, id: Option<u64>, payload: serde_json::Value) -> Self {
        Self {
            frame_type: FrameType::Event,
            id,
            event: Some(name.to_string()),
            timestamp: Utc::now(),
            error: None,
            payload,
        }
    }

    /// Builds an ack frame answering correlation id `id`.
    #[must_use]
    pub fn ack(id: u64, result: Result<serde_json::Value, String>) -> Self {
        let (error, payload) = match result {
            Ok(payload) => (None, payload),
            Err(error) => (Some(error), serde_json::Value::Null),
        };
        Self {
            frame_type: FrameType::Ack,
            id: Some(id),
            event: None,
            timestamp: Utc::now(),
            error,
            payload,
        }
    }
}

/// Discriminator for frame types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    /// Named event, in either direction.
    Event,
    /// Acknowledgment of an earlier event.
    Ack,
}

/// `patientJoin` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientJoin {
    /// Patient identifier.
    pub patient_id: String,
    /// Patient display name.
    pub patient_name: String,
    /// Opaque intake context.
    pub medical_context: MedicalContext,
}

/// `patientMessage` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientMessage {
    /// Target room.
    pub room_id: RoomId,
    /// Sending patient.
    pub patient_id: String,
    /// Text body.
    pub content: String,
}

/// `doctorLogin` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorLogin {
    /// Doctor identifier.
    pub doctor_id: String,
    /// Doctor display name.
    pub doctor_name: String,
}

/// `doctorJoinRoom` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorJoinRoom {
    /// Target room.
    pub room_id: RoomId,
    /// Doctor identifier.
    pub doctor_id: String,
    /// Doctor display name.
    pub doctor_name: String,
}

/// `doctorMessage` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorMessage {
    /// Target room.
    pub room_id: RoomId,
    /// Sending doctor.
    pub doctor_id: String,
    /// Doctor display name.
    pub doctor_name: String,
    /// Text body.
    pub content: String,
}

/// `toggleDoctorMode` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleDoctorMode {
    /// Target room.
    pub room_id: RoomId,
    /// Doctor identifier.
    pub doctor_id: String,
    /// Doctor display name.
    pub doctor_name: String,
    /// Requested mode.
    pub enable_direct_mode: bool,
}

/// `voiceMessage` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceMessage {
    /// Target room.
    pub room_id: RoomId,
    /// Sending patient or doctor.
    pub sender_id: String,
    /// Role of the sender.
    pub sender_type: SenderRole,
    /// Base64-encoded audio clip.
    pub audio_data: String,
    /// Clip length in seconds.
    pub duration: f64,
}

/// `getRoomStatus` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRoomStatus {
    /// Room to describe.
    pub room_id: RoomId,
}

/// Commands the client emits.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// Patient opens or rejoins a room. Acked with [`JoinAck`].
    PatientJoin(PatientJoin),
    /// Patient text message. Not acked.
    PatientMessage(PatientMessage),
    /// Doctor session login. Acked with [`DoctorLoginAck`].
    DoctorLogin(DoctorLogin),
    /// Doctor joins a room. Acked with no payload.
    DoctorJoinRoom(DoctorJoinRoom),
    /// Doctor text message. Not acked.
    DoctorMessage(DoctorMessage),
    /// Switch relay mode. Acked with [`ModeAck`].
    ToggleDoctorMode(ToggleDoctorMode),
    /// Voice clip. Not acked.
    VoiceMessage(VoiceMessage),
    /// Status query answered by a `roomStatus` event. Not acked.
    GetRoomStatus(GetRoomStatus),
}

impl OutboundEvent {
    /// Returns the wire event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PatientJoin(_) => "patientJoin",
            Self::PatientMessage(_) => "patientMessage",
            Self::DoctorLogin(_) => "doctorLogin",
            Self::DoctorJoinRoom(_) => "doctorJoinRoom",
            Self::DoctorMessage(_) => "doctorMessage",
            Self::ToggleDoctorMode(_) => "toggleDoctorMode",
            Self::VoiceMessage(_) => "voiceMessage",
            Self::GetRoomStatus(_) => "getRoomStatus",
        }
    }

    /// Returns `true` if the server answers this event with an ack.
    #[must_use]
    pub const fn expects_ack(&self) -> bool {
        matches!(
            self,
            Self::PatientJoin(_)
                | Self::DoctorLogin(_)
                | Self::DoctorJoinRoom(_)
                | Self::ToggleDoctorMode(_)
        )
    }

    /// Encodes the event into a frame.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the payload cannot be encoded.
    pub fn into_frame(self, id: Option<u64>) -> Result<Frame, serde_json::Error> {
        let name = self.name();
        let payload = match self {
            Self::PatientJoin(p) => serde_json::to_value(p),
            Self::PatientMessage(p) => serde_json::to_value(p),
            Self::DoctorLogin(p) => serde_json::to_value(p),
            Self::DoctorJoinRoom(p) => serde_json::to_value(p),
            Self::DoctorMessage(p) => serde_json::to_value(p),
            Self::ToggleDoctorMode(p) => serde_json::to_value(p),
            Self::VoiceMessage(p) => serde_json::to_value(p),
            Self::GetRoomStatus(p) => serde_json::to_value(p),
        }?;
        Ok(Frame::event(name, id, payload))
    }
}

/// `patientJoin` ack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAck {
    /// Room assigned to the patient.
    pub room_id: RoomId,
}

/// `doctorLogin` ack: a snapshot, not a live subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorLoginAck {
    /// Rooms active at login time.
    #[serde(default)]
    pub active_rooms: Vec<ConsultationRoom>,
}

/// `toggleDoctorMode` ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeAck {
    /// Mode confirmed by the server; may differ from the requested one.
    pub direct_mode: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DoctorJoinedPayload {
    room_id: RoomId,
    doctor_id: String,
    #[serde(default)]
    doctor_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModeChangedPayload {
    room_id: RoomId,
    direct_mode: bool,
    #[serde(default)]
    doctor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomCreatedPayload {
    room_id: RoomId,
    patient_id: String,
    #[serde(default)]
    patient_name: Option<String>,
    #[serde(default)]
    medical_context: Option<MedicalContext>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DoctorStatusPayload {
    doctor_id: String,
    #[serde(default)]
    online: bool,
    #[serde(default)]
    room_id: Option<RoomId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveRoomsPayload {
    #[serde(default)]
    active_rooms: Vec<ConsultationRoom>,
}

/// Server-pushed events the client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// `message`.
    Message(ChatMessage),
    /// `roomStatus`.
    RoomStatus(RoomStatus),
    /// `error`.
    Error(String),
    /// `doctorJoined`, `doctorModeChanged`, `patientRoomCreated`,
    /// `doctorStatus`.
    Notification(ChatNotification),
    /// `activeRoomsUpdate`.
    ActiveRooms(Vec<ConsultationRoom>),
}

impl InboundEvent {
    /// Decodes a named event payload.
    ///
    /// Returns `Ok(None)` for event names the client does not handle.
    ///
    /// # Errors
    ///
    /// Returns the decoder error if a known event has a malformed payload.
    pub fn decode(name: &str, payload: serde_json::Value) -> Result<Option<Self>, serde_json::Error> {
        let event = match name {
            "message" => Self::Message(serde_json::from_value(payload)?),
            "roomStatus" => Self::RoomStatus(serde_json::from_value(payload)?),
            "error" => Self::Error(error_text(payload)),
            "doctorJoined" => {
                let p: DoctorJoinedPayload = serde_json::from_value(payload)?;
                Self::Notification(ChatNotification::DoctorJoined {
                    room_id: p.room_id,
                    doctor_id: p.doctor_id,
                    doctor_name: p.doctor_name,
                })
            }
            "doctorModeChanged" => {
                let p: ModeChangedPayload = serde_json::from_value(payload)?;
                Self::Notification(ChatNotification::DoctorModeChanged {
                    room_id: p.room_id,
                    direct_mode: p.direct_mode,
                    doctor_id: p.doctor_id,
                })
            }
            "patientRoomCreated" => {
                let p: RoomCreatedPayload = serde_json::from_value(payload)?;
                Self::Notification(ChatNotification::PatientRoomCreated {
                    room_id: p.room_id,
                    patient_id: p.patient_id,
                    patient_name: p.patient_name,
                    medical_context: p.medical_context,
                })
            }
            "doctorStatus" => {
                let p: DoctorStatusPayload = serde_json::from_value(payload)?;
                Self::Notification(ChatNotification::DoctorStatus {
                    doctor_id: p.doctor_id,
                    online: p.online,
                    room_id: p.room_id,
                })
            }
            "activeRoomsUpdate" => {
                // Servers send either a bare array or `{activeRooms: [...]}`.
                let rooms = if payload.is_array() {
                    serde_json::from_value(payload)?
                } else {
                    serde_json::from_value::<ActiveRoomsPayload>(payload)?.active_rooms
                };
                Self::ActiveRooms(rooms)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Extracts a human-readable message from an `error` event payload.
fn error_text(payload: serde_json::Value) -> String {
    match payload {
        serde_json::Value::String(s) => s,
        serde_json::Value::Object(ref map) => map
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| payload.to_string(), str::to_string),
        other => other.to_string(),
    }
}
