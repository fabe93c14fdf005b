//! Last-known state of every room the session has observed.
//!
//! [`RoomDirectory`] is fed by acknowledgments (patient join, doctor join,
//! mode toggle) and by server pushes (notifications, room status, active
//! room lists). It never originates state; the server owns room lifetime.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{ChatNotification, ConsultationRoom, RoomId, RoomStatus};

/// Client-side mirror of room state, keyed by [`RoomId`].
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: RwLock<HashMap<RoomId, ConsultationRoom>>,
}

impl RoomDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a room record.
    pub async fn upsert(&self, room: ConsultationRoom) {
        self.rooms.write().await.insert(room.id.clone(), room);
    }

    /// Inserts a room unless one with the same id is already known.
    /// Returns `true` if inserted.
    pub async fn insert_if_absent(&self, room: ConsultationRoom) -> bool {
        let mut map = self.rooms.write().await;
        if map.contains_key(&room.id) {
            return false;
        }
        map.insert(room.id.clone(), room);
        true
    }

    /// Replaces the whole directory with the server's active room list.
    pub async fn replace_all(&self, rooms: Vec<ConsultationRoom>) {
        let mut map = self.rooms.write().await;
        map.clear();
        map.extend(rooms.into_iter().map(|room| (room.id.clone(), room)));
    }

    /// Records the outcome of a doctor joining a room.
    pub async fn record_doctor(&self, room_id: &RoomId, doctor_id: &str, doctor_name: Option<&str>) {
        if let Some(room) = self.rooms.write().await.get_mut(room_id) {
            room.doctor_id = Some(doctor_id.to_string());
            room.doctor_name = doctor_name.map(str::to_string);
        }
    }

    /// Records a confirmed relay mode.
    pub async fn record_mode(&self, room_id: &RoomId, direct_mode: bool) {
        if let Some(room) = self.rooms.write().await.get_mut(room_id) {
            room.direct_mode = direct_mode;
        }
    }

    /// Folds a lifecycle notification into the directory.
    pub async fn apply_notification(&self, notification: &ChatNotification) {
        match notification {
            ChatNotification::PatientRoomCreated {
                room_id,
                patient_id,
                patient_name,
                medical_context,
            } => {
                let mut map = self.rooms.write().await;
                let room = map.entry(room_id.clone()).or_insert_with(|| ConsultationRoom {
                    id: room_id.clone(),
                    patient_id: patient_id.clone(),
                    patient_name: None,
                    doctor_id: None,
                    doctor_name: None,
                    direct_mode: false,
                    created_at: Some(chrono::Utc::now()),
                    medical_context: None,
                });
                room.patient_name.clone_from(patient_name);
                room.medical_context.clone_from(medical_context);
            }
            ChatNotification::DoctorJoined {
                room_id,
                doctor_id,
                doctor_name,
            } => {
                self.record_doctor(room_id, doctor_id, doctor_name.as_deref())
                    .await;
            }
            ChatNotification::DoctorModeChanged {
                room_id,
                direct_mode,
                ..
            } => self.record_mode(room_id, *direct_mode).await,
            ChatNotification::DoctorStatus { .. } => {}
        }
    }

    /// Folds a status snapshot into the directory.
    pub async fn apply_status(&self, status: &RoomStatus) {
        self.record_mode(&status.room_id, status.direct_mode).await;
    }

    /// Returns a copy of one room's record.
    pub async fn get(&self, room_id: &RoomId) -> Option<ConsultationRoom> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Returns copies of all room records, ordered by room id.
    pub async fn list(&self) -> Vec<ConsultationRoom> {
        let map = self.rooms.read().await;
        let mut rooms: Vec<ConsultationRoom> = map.values().cloned().collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    /// Returns the number of known rooms.
    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Returns `true` if no room is known.
    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }

    /// Forgets every room.
    pub async fn clear(&self) {
        self.rooms.write().await.clear();
    }
}
