//! WebSocket connection task and connection state machine.
//!
//! One task owns the socket for the lifetime of a session: it connects,
//! runs the read/write loop, dispatches inbound frames to the listener
//! registries, and reconnects with capped exponential backoff until the
//! attempt budget is spent or the client shuts it down.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::pending_acks::PendingAcks;
use super::protocol::{Frame, FrameType, InboundEvent};
use crate::config::ClientConfig;
use crate::domain::{
    ChatMessage, ChatNotification, ConsultationRoom, ListenerRegistry, RoomDirectory, RoomStatus,
};
use crate::error::{ClientError, TransportError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection lifecycle.
///
/// ```text
/// Disconnected -> Connecting -> Connected -> ReconnectingBackoff -> Connecting
///                                   |                |
///                                   +--> Disconnected <+ (budget spent or disconnect())
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport. Initial and terminal state.
    #[default]
    Disconnected,
    /// Opening the WebSocket.
    Connecting,
    /// Transport is up; requests may be sent.
    Connected,
    /// Waiting before reconnection attempt `attempt` (1-based).
    ReconnectingBackoff {
        /// Attempt about to be made.
        attempt: u32,
    },
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::ReconnectingBackoff { attempt } => write!(f, "reconnecting (attempt {attempt})"),
        }
    }
}

/// The five fan-out channels of a session.
#[derive(Debug, Default)]
pub(crate) struct Listeners {
    pub(crate) messages: ListenerRegistry<ChatMessage>,
    pub(crate) room_status: ListenerRegistry<RoomStatus>,
    pub(crate) notifications: ListenerRegistry<ChatNotification>,
    pub(crate) room_list: ListenerRegistry<Vec<ConsultationRoom>>,
    pub(crate) errors: ListenerRegistry<TransportError>,
}

impl Listeners {
    pub(crate) fn clear_all(&self) {
        self.messages.clear();
        self.room_status.clear();
        self.notifications.clear();
        self.room_list.clear();
        self.errors.clear();
    }
}

/// State shared between the client handle and its connection task.
#[derive(Debug)]
pub(crate) struct SessionShared {
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) acks: PendingAcks,
    pub(crate) listeners: Listeners,
    pub(crate) rooms: RoomDirectory,
    pub(crate) outbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    pub(crate) config: Mutex<Option<ClientConfig>>,
}

impl SessionShared {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            acks: PendingAcks::new(),
            listeners: Listeners::default(),
            rooms: RoomDirectory::new(),
            outbound: Mutex::new(None),
            config: Mutex::new(None),
        }
    }

    pub(crate) fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "connection state changed");
        }
    }

    pub(crate) fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn outbound_sender(&self) -> Option<mpsc::UnboundedSender<Frame>> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_outbound(&self, sender: Option<mpsc::UnboundedSender<Frame>>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = sender;
    }

    /// Routes one decoded server event to the directory and listeners.
    async fn deliver(&self, event: InboundEvent) {
        match event {
            InboundEvent::Message(message) => {
                tracing::debug!(room_id = %message.room_id, id = %message.id, "message received");
                self.listeners.messages.publish(&message);
            }
            InboundEvent::RoomStatus(status) => {
                self.rooms.apply_status(&status).await;
                self.listeners.room_status.publish(&status);
            }
            InboundEvent::Error(reason) => {
                tracing::warn!(%reason, "server error event");
                self.listeners.errors.publish(&TransportError::Server(reason));
            }
            InboundEvent::Notification(notification) => {
                tracing::debug!(event = notification.event_name(), "notification received");
                self.rooms.apply_notification(&notification).await;
                self.listeners.notifications.publish(&notification);
            }
            InboundEvent::ActiveRooms(rooms) => {
                self.rooms.replace_all(rooms.clone()).await;
                self.listeners.room_list.publish(&rooms);
            }
        }
    }

    /// Handles one inbound text frame.
    async fn dispatch(&self, text: &str) {
        let frame = match serde_json::from_str::<Frame>(text) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "dropping undecodable frame");
                self.listeners
                    .errors
                    .publish(&TransportError::MalformedFrame(err.to_string()));
                return;
            }
        };

        match frame.frame_type {
            FrameType::Ack => {
                let Some(id) = frame.id else {
                    tracing::warn!("ack frame without correlation id");
                    return;
                };
                let outcome = match frame.error {
                    Some(error) => Err(ClientError::Rejected(error)),
                    None => Ok(frame.payload),
                };
                if !self.acks.resolve(id, outcome) {
                    tracing::debug!(id, "ack for unknown or expired call");
                }
            }
            FrameType::Event => {
                let Some(name) = frame.event else {
                    tracing::warn!("event frame without name");
                    return;
                };
                match InboundEvent::decode(&name, frame.payload) {
                    Ok(Some(event)) => self.deliver(event).await,
                    Ok(None) => tracing::debug!(event = %name, "ignoring unhandled event"),
                    Err(err) => {
                        tracing::warn!(event = %name, error = %err, "malformed event payload");
                        self.listeners
                            .errors
                            .publish(&TransportError::MalformedFrame(format!("{name}: {err}")));
                    }
                }
            }
        }
    }
}

/// Why a connected session's read/write loop ended.
enum SessionEnd {
    Shutdown,
    Lost(String),
}

/// Runs the connect / serve / reconnect loop until shutdown or until the
/// reconnection budget is spent.
pub(crate) async fn run_connection(
    shared: Arc<SessionShared>,
    config: ClientConfig,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut attempt: u32 = 0;

    loop {
        shared.set_state(ConnectionState::Connecting);

        let connected = tokio::select! {
            result = tokio_tungstenite::connect_async(config.url.as_str()) => result,
            _ = &mut shutdown => break,
        };

        match connected {
            Ok((socket, _response)) => {
                attempt = 0;
                tracing::info!(url = %config.url, "consultation session connected");
                // Frames enqueued while no socket was up are never replayed.
                discard_unsent(&mut outbound);
                shared.acks.open();
                shared.set_state(ConnectionState::Connected);

                let reason = match serve(&shared, socket, &mut outbound, &mut shutdown).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Lost(reason) => reason,
                };
                // Leave Connected before anyone hears about the loss.
                shared.set_state(state_after_failure(&config, attempt));
                shared.acks.close();
                discard_unsent(&mut outbound);

                tracing::warn!(%reason, "consultation session lost");
                shared
                    .listeners
                    .errors
                    .publish(&TransportError::ConnectionLost(reason));
            }
            Err(err) => {
                tracing::warn!(url = %config.url, attempt, error = %err, "connect failed");
                shared.set_state(state_after_failure(&config, attempt));
                shared
                    .listeners
                    .errors
                    .publish(&TransportError::ConnectFailed(err.to_string()));
            }
        }

        if attempt >= config.reconnection_attempts {
            tracing::warn!(
                attempts = config.reconnection_attempts,
                "reconnection attempts exhausted"
            );
            break;
        }
        attempt += 1;
        shared.set_state(ConnectionState::ReconnectingBackoff { attempt });

        let delay = config.backoff_delay(attempt);
        tracing::info!(attempt, ?delay, "reconnecting");
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = &mut shutdown => break,
        }
    }

    shared.acks.close();
    discard_unsent(&mut outbound);
    shared.set_state(ConnectionState::Disconnected);
    tracing::debug!("connection task stopped");
}

/// State to enter after failure number `attempt` (0 for a dropped live
/// session).
fn state_after_failure(config: &ClientConfig, attempt: u32) -> ConnectionState {
    if attempt >= config.reconnection_attempts {
        ConnectionState::Disconnected
    } else {
        ConnectionState::ReconnectingBackoff {
            attempt: attempt + 1,
        }
    }
}

/// Read/write loop for one established socket.
async fn serve(
    shared: &SessionShared,
    socket: Socket,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    shutdown: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = &mut *shutdown => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    // Client handle dropped.
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                };
                match serde_json::to_string(&frame) {
                    Ok(json) => {
                        if let Err(err) = ws_tx.send(Message::text(json)).await {
                            return SessionEnd::Lost(err.to_string());
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "failed to encode outbound frame"),
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => shared.dispatch(text.as_str()).await,
                    Some(Ok(Message::Close(close))) => {
                        let reason = close
                            .map(|c| format!("closed by server ({}): {}", u16::from(c.code), c.reason.as_str()))
                            .unwrap_or_else(|| "closed by server".to_string());
                        return SessionEnd::Lost(reason);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return SessionEnd::Lost(err.to_string()),
                    None => return SessionEnd::Lost("stream ended".to_string()),
                }
            }
        }
    }
}

/// Drops frames queued for a socket that no longer exists.
fn discard_unsent(outbound: &mut mpsc::UnboundedReceiver<Frame>) {
    let mut dropped = 0usize;
    while outbound.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        tracing::debug!(dropped, "discarded unsent frames");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn ack_frame_resolves_pending_call() {
        let shared = SessionShared::new();
        shared.acks.open();
        let Ok((id, rx)) = shared.acks.register() else {
            panic!("registration should succeed");
        };
        let ack = Frame::ack(id, Ok(serde_json::json!({"directMode": true})));
        let Ok(text) = serde_json::to_string(&ack) else {
            panic!("ack should encode");
        };

        shared.dispatch(&text).await;

        let Ok(Ok(payload)) = rx.await else {
            panic!("ack payload expected");
        };
        assert_eq!(payload.get("directMode"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn rejected_ack_carries_server_string() {
        let shared = SessionShared::new();
        shared.acks.open();
        let Ok((id, rx)) = shared.acks.register() else {
            panic!("registration should succeed");
        };
        let Ok(text) = serde_json::to_string(&Frame::ack(id, Err("room_full".to_string()))) else {
            panic!("ack should encode");
        };

        shared.dispatch(&text).await;

        let Ok(Err(err)) = rx.await else {
            panic!("rejection expected");
        };
        assert_eq!(err.to_string(), "room_full");
    }

    #[tokio::test]
    async fn event_frames_fan_out_and_update_directory() {
        let shared = SessionShared::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = shared.listeners.notifications.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let frame = Frame::event(
            "patientRoomCreated",
            None,
            serde_json::json!({"roomId": "room-42", "patientId": "p1", "patientName": "Jane"}),
        );
        let Ok(text) = serde_json::to_string(&frame) else {
            panic!("frame should encode");
        };
        shared.dispatch(&text).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(shared.rooms.len().await, 1);
    }

    #[tokio::test]
    async fn garbage_is_reported_to_error_listeners() {
        let shared = SessionShared::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = shared.listeners.errors.subscribe(move |err: &TransportError| {
            if let Ok(mut v) = sink.lock() {
                v.push(err.clone());
            }
        });

        shared.dispatch("not json").await;

        let errors = seen.lock().map(|v| v.clone()).unwrap_or_default();
        assert!(matches!(errors.first(), Some(TransportError::MalformedFrame(_))));
    }

    #[test]
    fn failure_state_follows_reconnection_budget() {
        let config = ClientConfig::new("ws://127.0.0.1:9/ws").with_reconnection_attempts(2);
        assert_eq!(
            state_after_failure(&config, 0),
            ConnectionState::ReconnectingBackoff { attempt: 1 }
        );
        assert_eq!(
            state_after_failure(&config, 1),
            ConnectionState::ReconnectingBackoff { attempt: 2 }
        );
        assert_eq!(state_after_failure(&config, 2), ConnectionState::Disconnected);

        let no_retries = config.with_reconnection_attempts(0);
        assert_eq!(state_after_failure(&no_retries, 0), ConnectionState::Disconnected);
    }

    #[test]
    fn state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(
            ConnectionState::ReconnectingBackoff { attempt: 2 }.to_string(),
            "reconnecting (attempt 2)"
        );
    }
}
