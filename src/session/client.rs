//! Doctor/patient consultation session client.
//!
//! [`ConsultationSessionClient`] owns one WebSocket connection (run by the
//! task in [`super::connection`]) and exposes the consultation protocol as
//! typed async methods. Request/response calls are correlated with their
//! acks through [`super::pending_acks::PendingAcks`]; fire-and-forget calls
//! only hand a frame to the transport.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use serde::de::{DeserializeOwned, IgnoredAny};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::connection::{ConnectionState, SessionShared, run_connection};
use super::protocol::{
    DoctorJoinRoom, DoctorLogin, DoctorLoginAck, DoctorMessage, GetRoomStatus, JoinAck, ModeAck,
    OutboundEvent, PatientJoin, PatientMessage, ToggleDoctorMode, VoiceMessage,
};
use crate::config::ClientConfig;
use crate::domain::{
    ChatMessage, ChatNotification, ConsultationRoom, MedicalContext, RoomId, RoomStatus,
    SenderRole, Unsubscribe,
};
use crate::error::{ClientError, TransportError};

/// Handle on a running connection task.
#[derive(Debug)]
struct RunningConnection {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Real-time client for consultation rooms.
///
/// Construct one per process (or per test) and share it behind an
/// [`Arc`]; see [`crate::app_state::AppContext`].
///
/// # Lifecycle
///
/// `initialize` opens the connection (unless `auto_connect` is off, in
/// which case `connect` does). `disconnect` closes it, fails pending acks,
/// and clears every listener. Both may be called repeatedly.
#[derive(Debug)]
pub struct ConsultationSessionClient {
    shared: Arc<SessionShared>,
    connection: Mutex<Option<RunningConnection>>,
}

impl ConsultationSessionClient {
    /// Creates a disconnected client with no configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SessionShared::new()),
            connection: Mutex::new(None),
        }
    }

    /// Applies `config` and, if `auto_connect` is set, opens the transport.
    ///
    /// An existing connection is fully disconnected first, which also
    /// clears all listeners; subscribe after initializing.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if the URL is not a WebSocket
    /// URL.
    pub async fn initialize(&self, config: ClientConfig) -> Result<(), ClientError> {
        config.validate()?;

        let mut connection = self.connection.lock().await;
        if connection.is_some() {
            tracing::info!("re-initializing consultation session");
            self.teardown(&mut connection).await;
        }

        let auto_connect = config.auto_connect;
        *self
            .shared
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(config.clone());

        if auto_connect {
            *connection = Some(self.spawn(config));
        }
        Ok(())
    }

    /// Opens the transport with the configuration given to `initialize`.
    ///
    /// Does nothing if a connection task is already running.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if `initialize` was never
    /// called.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let mut connection = self.connection.lock().await;
        if connection
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
        {
            return Ok(());
        }

        let config = self
            .shared
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ClientError::InvalidConfig("initialize was not called".to_string()))?;

        *connection = Some(self.spawn(config));
        Ok(())
    }

    /// Closes the transport, fails pending acks, clears every listener and
    /// the room directory. Safe to call any number of times.
    pub async fn disconnect(&self) {
        let mut connection = self.connection.lock().await;
        self.teardown(&mut connection).await;
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.current_state()
    }

    /// Returns a receiver that observes every state transition.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Waits until the session is connected.
    ///
    /// Keeps waiting through reconnection backoff.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] if the session is, or ends up,
    /// `Disconnected` (never initialized, disconnected, or reconnection
    /// attempts exhausted).
    pub async fn wait_until_connected(&self) -> Result<(), ClientError> {
        let mut state = self.shared.state.subscribe();
        let reached = state
            .wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Disconnected))
            .await
            .map(|s| *s)
            .map_err(|_| ClientError::NotConnected)?;
        match reached {
            ConnectionState::Connected => Ok(()),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Joins (or opens) the patient's consultation room.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] immediately when not connected,
    /// [`ClientError::Rejected`] with the server's error string, or an
    /// ack-level error (timeout, connection lost, malformed ack).
    pub async fn join_consultation(
        &self,
        patient_id: &str,
        patient_name: &str,
        medical_context: MedicalContext,
    ) -> Result<JoinAck, ClientError> {
        let ack: JoinAck = self
            .request(OutboundEvent::PatientJoin(PatientJoin {
                patient_id: patient_id.to_string(),
                patient_name: patient_name.to_string(),
                medical_context: medical_context.clone(),
            }))
            .await?;

        let mut room = ConsultationRoom::opened_by(ack.room_id.clone(), patient_id, patient_name);
        room.medical_context = Some(medical_context);
        self.shared.rooms.insert_if_absent(room).await;

        tracing::info!(room_id = %ack.room_id, patient_id, "joined consultation");
        Ok(ack)
    }

    /// Sends a patient text message. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when not connected.
    pub fn send_patient_message(
        &self,
        room_id: &RoomId,
        patient_id: &str,
        content: &str,
    ) -> Result<(), ClientError> {
        self.emit(OutboundEvent::PatientMessage(PatientMessage {
            room_id: room_id.clone(),
            patient_id: patient_id.to_string(),
            content: content.to_string(),
        }))
    }

    /// Logs a doctor in at the protocol level.
    ///
    /// The returned room list is a snapshot; later changes arrive through
    /// [`Self::on_room_list_update`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::join_consultation`].
    pub async fn doctor_login(
        &self,
        doctor_id: &str,
        doctor_name: &str,
    ) -> Result<DoctorLoginAck, ClientError> {
        let ack: DoctorLoginAck = self
            .request(OutboundEvent::DoctorLogin(DoctorLogin {
                doctor_id: doctor_id.to_string(),
                doctor_name: doctor_name.to_string(),
            }))
            .await?;
        self.shared.rooms.replace_all(ack.active_rooms.clone()).await;
        tracing::info!(doctor_id, rooms = ack.active_rooms.len(), "doctor logged in");
        Ok(ack)
    }

    /// Joins an existing room as its doctor.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`] if the room is absent or already
    /// held, otherwise as [`Self::join_consultation`].
    pub async fn doctor_join_room(
        &self,
        room_id: &RoomId,
        doctor_id: &str,
        doctor_name: &str,
    ) -> Result<(), ClientError> {
        let _: IgnoredAny = self
            .request(OutboundEvent::DoctorJoinRoom(DoctorJoinRoom {
                room_id: room_id.clone(),
                doctor_id: doctor_id.to_string(),
                doctor_name: doctor_name.to_string(),
            }))
            .await?;
        self.shared
            .rooms
            .record_doctor(room_id, doctor_id, Some(doctor_name))
            .await;
        tracing::info!(%room_id, doctor_id, "doctor joined room");
        Ok(())
    }

    /// Sends a doctor text message. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when not connected.
    pub fn send_doctor_message(
        &self,
        room_id: &RoomId,
        doctor_id: &str,
        doctor_name: &str,
        content: &str,
    ) -> Result<(), ClientError> {
        self.emit(OutboundEvent::DoctorMessage(DoctorMessage {
            room_id: room_id.clone(),
            doctor_id: doctor_id.to_string(),
            doctor_name: doctor_name.to_string(),
            content: content.to_string(),
        }))
    }

    /// Switches a room between mediated and direct relay.
    ///
    /// The resolved [`ModeAck::direct_mode`] is the server's decision and
    /// may differ from `enable_direct_mode`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::join_consultation`].
    pub async fn toggle_doctor_mode(
        &self,
        room_id: &RoomId,
        doctor_id: &str,
        doctor_name: &str,
        enable_direct_mode: bool,
    ) -> Result<ModeAck, ClientError> {
        let ack: ModeAck = self
            .request(OutboundEvent::ToggleDoctorMode(ToggleDoctorMode {
                room_id: room_id.clone(),
                doctor_id: doctor_id.to_string(),
                doctor_name: doctor_name.to_string(),
                enable_direct_mode,
            }))
            .await?;
        self.shared.rooms.record_mode(room_id, ack.direct_mode).await;
        if ack.direct_mode != enable_direct_mode {
            tracing::info!(%room_id, requested = enable_direct_mode, "mode change refused by server");
        }
        Ok(ack)
    }

    /// Sends a pre-encoded voice clip. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when not connected.
    pub fn send_voice_message(
        &self,
        room_id: &RoomId,
        sender_id: &str,
        sender_role: SenderRole,
        audio_data: &str,
        duration_seconds: f64,
    ) -> Result<(), ClientError> {
        self.emit(OutboundEvent::VoiceMessage(VoiceMessage {
            room_id: room_id.clone(),
            sender_id: sender_id.to_string(),
            sender_type: sender_role,
            audio_data: audio_data.to_string(),
            duration: duration_seconds,
        }))
    }

    /// Asks for a room status snapshot. The answer arrives on
    /// [`Self::on_room_status`], so subscribe first.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when not connected.
    pub fn get_room_status(&self, room_id: &RoomId) -> Result<(), ClientError> {
        self.emit(OutboundEvent::GetRoomStatus(GetRoomStatus {
            room_id: room_id.clone(),
        }))
    }

    /// Subscribes to chat messages.
    pub fn on_message<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.shared.listeners.messages.subscribe(listener)
    }

    /// Subscribes to room status snapshots.
    pub fn on_room_status<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&RoomStatus) + Send + Sync + 'static,
    {
        self.shared.listeners.room_status.subscribe(listener)
    }

    /// Subscribes to room lifecycle notifications.
    pub fn on_notification<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&ChatNotification) + Send + Sync + 'static,
    {
        self.shared.listeners.notifications.subscribe(listener)
    }

    /// Subscribes to active room list updates.
    pub fn on_room_list_update<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&Vec<ConsultationRoom>) + Send + Sync + 'static,
    {
        self.shared.listeners.room_list.subscribe(listener)
    }

    /// Subscribes to transport-level errors.
    pub fn on_error<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.shared.listeners.errors.subscribe(listener)
    }

    /// Returns the last known state of every observed room.
    pub async fn rooms(&self) -> Vec<ConsultationRoom> {
        self.shared.rooms.list().await
    }

    /// Returns the last known state of one room.
    pub async fn room(&self, room_id: &RoomId) -> Option<ConsultationRoom> {
        self.shared.rooms.get(room_id).await
    }

    fn spawn(&self, config: ClientConfig) -> RunningConnection {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        self.shared.set_outbound(Some(outbound_tx));
        self.shared.set_state(ConnectionState::Connecting);
        tracing::debug!(url = %config.url, "spawning connection task");

        let task = tokio::spawn(run_connection(
            Arc::clone(&self.shared),
            config,
            outbound_rx,
            shutdown_rx,
        ));

        RunningConnection {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn teardown(&self, connection: &mut Option<RunningConnection>) {
        if let Some(running) = connection.take() {
            let _ = running.shutdown.send(());
            if let Err(err) = running.task.await {
                tracing::warn!(error = %err, "connection task failed");
            }
            tracing::info!("consultation session disconnected");
        }
        self.shared.set_outbound(None);
        self.shared.acks.close();
        self.shared.set_state(ConnectionState::Disconnected);
        self.shared.listeners.clear_all();
        self.shared.rooms.clear().await;
    }

    fn ensure_connected(&self) -> Result<(), ClientError> {
        if self.shared.current_state() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    fn ack_timeout(&self) -> Option<Duration> {
        self.shared
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|config| config.ack_timeout)
    }

    fn emit(&self, event: OutboundEvent) -> Result<(), ClientError> {
        debug_assert!(!event.expects_ack(), "{} must go through request", event.name());
        self.ensure_connected()?;
        let name = event.name();
        let frame = event.into_frame(None)?;
        let sender = self
            .shared
            .outbound_sender()
            .ok_or(ClientError::NotConnected)?;
        sender.send(frame).map_err(|_| ClientError::NotConnected)?;
        tracing::debug!(event = name, "emitted");
        Ok(())
    }

    async fn request<R: DeserializeOwned>(&self, event: OutboundEvent) -> Result<R, ClientError> {
        debug_assert!(event.expects_ack(), "{} is never acknowledged", event.name());
        self.ensure_connected()?;
        let name = event.name();
        let (id, ack_rx) = self.shared.acks.register()?;

        let sent = event
            .into_frame(Some(id))
            .map_err(ClientError::from)
            .and_then(|frame| {
                self.shared
                    .outbound_sender()
                    .ok_or(ClientError::NotConnected)?
                    .send(frame)
                    .map_err(|_| ClientError::NotConnected)
            });
        if let Err(err) = sent {
            self.shared.acks.cancel(id);
            return Err(err);
        }
        tracing::debug!(event = name, id, "awaiting ack");

        let received = match self.ack_timeout() {
            Some(limit) => match tokio::time::timeout(limit, ack_rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.shared.acks.cancel(id);
                    tracing::warn!(event = name, id, "ack timed out");
                    return Err(ClientError::AckTimeout(limit));
                }
            },
            None => ack_rx.await,
        };

        let payload = received.map_err(|_| ClientError::ConnectionLost)??;
        serde_json::from_value(payload).map_err(|err| ClientError::MalformedAck {
            event: name,
            reason: err.to_string(),
        })
    }
}

impl Default for ConsultationSessionClient {
    fn default() -> Self {
        Self::new()
    }
}
