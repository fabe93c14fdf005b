//! Consultation room model: room summaries, status snapshots and the
//! medical context attached when a patient joins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RoomId, SenderRole};

/// Opaque structured payload (symptoms, pregnancy week, risk flags) sent
/// with a patient join.
///
/// The client never inspects it; it is forwarded to the server unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MedicalContext(serde_json::Value);

impl MedicalContext {
    /// Wraps an already-built JSON value.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Builds a context from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be represented as JSON.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self)
    }

    /// Returns the wrapped JSON value.
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Last known state of a consultation room.
///
/// The server owns the room's lifetime; the client only reflects what it
/// was last told.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationRoom {
    /// Room identifier.
    #[serde(alias = "roomId")]
    pub id: RoomId,
    /// Patient who opened the room.
    pub patient_id: String,
    /// Patient display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    /// Attending doctor, if one has joined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<String>,
    /// Attending doctor display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_name: Option<String>,
    /// Whether doctor messages bypass the mediated relay.
    #[serde(default)]
    pub direct_mode: bool,
    /// Creation time as reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Context supplied by the patient at join time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_context: Option<MedicalContext>,
}

impl ConsultationRoom {
    /// Creates the client-side record of a room the patient just joined.
    #[must_use]
    pub fn opened_by(id: RoomId, patient_id: &str, patient_name: &str) -> Self {
        Self {
            id,
            patient_id: patient_id.to_string(),
            patient_name: Some(patient_name.to_string()),
            doctor_id: None,
            doctor_name: None,
            direct_mode: false,
            created_at: Some(Utc::now()),
            medical_context: None,
        }
    }

    /// Returns `true` if a doctor has joined.
    #[must_use]
    pub fn has_doctor(&self) -> bool {
        self.doctor_id.is_some()
    }
}

/// Someone currently present in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Patient or doctor identifier.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Participant role.
    pub role: SenderRole,
}

/// Point-in-time snapshot of a room, delivered by the `roomStatus` event.
///
/// Immutable; superseded by the next snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    /// Room the snapshot describes.
    pub room_id: RoomId,
    /// Participants currently connected.
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// Current relay mode.
    #[serde(default)]
    pub direct_mode: bool,
    /// Whether a doctor is attending.
    #[serde(default)]
    pub doctor_present: bool,
    /// Whether the patient's connection is live.
    #[serde(default)]
    pub patient_connected: bool,
}
