//! Server-pushed room lifecycle notifications.
//!
//! Every room lifecycle push (`doctorJoined`, `doctorModeChanged`,
//! `patientRoomCreated`, `doctorStatus`) is decoded into a
//! [`ChatNotification`] and fanned out to notification subscribers.
//! Notifications are transient and not retained by the client beyond the
//! room directory update they trigger.

use serde::Serialize;

use super::{MedicalContext, RoomId};

/// Room lifecycle notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "notification", rename_all = "snake_case")]
pub enum ChatNotification {
    /// A doctor joined a room.
    DoctorJoined {
        /// Room identifier.
        room_id: RoomId,
        /// Doctor identifier.
        doctor_id: String,
        /// Doctor display name.
        doctor_name: Option<String>,
    },

    /// A room switched between mediated and direct relay.
    DoctorModeChanged {
        /// Room identifier.
        room_id: RoomId,
        /// Resulting mode.
        direct_mode: bool,
        /// Doctor who toggled the mode, when reported.
        doctor_id: Option<String>,
    },

    /// A patient opened a new room.
    PatientRoomCreated {
        /// Room identifier.
        room_id: RoomId,
        /// Patient identifier.
        patient_id: String,
        /// Patient display name.
        patient_name: Option<String>,
        /// Context supplied at join time.
        medical_context: Option<MedicalContext>,
    },

    /// A doctor's presence changed.
    DoctorStatus {
        /// Doctor identifier.
        doctor_id: String,
        /// Whether the doctor is online.
        online: bool,
        /// Room the doctor is attending, if any.
        room_id: Option<RoomId>,
    },
}

impl ChatNotification {
    /// Returns the room this notification concerns, if any.
    #[must_use]
    pub const fn room_id(&self) -> Option<&RoomId> {
        match self {
            Self::DoctorJoined { room_id, .. }
            | Self::DoctorModeChanged { room_id, .. }
            | Self::PatientRoomCreated { room_id, .. } => Some(room_id),
            Self::DoctorStatus { room_id, .. } => room_id.as_ref(),
        }
    }

    /// Returns the inbound event name this notification was decoded from.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::DoctorJoined { .. } => "doctorJoined",
            Self::DoctorModeChanged { .. } => "doctorModeChanged",
            Self::PatientRoomCreated { .. } => "patientRoomCreated",
            Self::DoctorStatus { .. } => "doctorStatus",
        }
    }
}
