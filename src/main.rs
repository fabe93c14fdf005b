//! carelink-probe entry point.
//!
//! Connects a consultation session using environment configuration, logs
//! every inbound event, and disconnects on Ctrl-C. When
//! `CARELINK_DOCTOR_ID` is set the probe also logs in as that doctor and
//! prints the active room snapshot.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use carelink_realtime::app_state::AppContext;
use carelink_realtime::config::{ClientConfig, CoordinatorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = ClientConfig::from_env()?;
    tracing::info!(url = %config.url, "starting carelink-probe");

    let context = AppContext::new(CoordinatorConfig::from_env());
    let session = Arc::clone(&context.session);

    session.initialize(config).await?;

    // Subscribe after initialize: re-initialization clears listeners.
    let _subscriptions = [
        session.on_message(|m| {
            tracing::info!(room_id = %m.room_id, sender = %m.sender_id, kind = ?m.kind, "message");
        }),
        session.on_room_status(|s| {
            tracing::info!(room_id = %s.room_id, direct_mode = s.direct_mode, "room status");
        }),
        session.on_notification(|n| {
            tracing::info!(event = n.event_name(), "notification");
        }),
        session.on_room_list_update(|rooms| {
            tracing::info!(count = rooms.len(), "active rooms updated");
        }),
        session.on_error(|e| {
            tracing::warn!(error = %e, "transport error");
        }),
    ];

    session.wait_until_connected().await?;

    if let Ok(doctor_id) = std::env::var("CARELINK_DOCTOR_ID") {
        let doctor_name =
            std::env::var("CARELINK_DOCTOR_NAME").unwrap_or_else(|_| doctor_id.clone());
        let login_session = Arc::clone(&session);
        let (login_id, login_name) = (doctor_id.clone(), doctor_name);
        // Serialized like any other request so a re-login never overlaps.
        let ack = context
            .coordinator
            .queue_request(format!("doctor-login:{doctor_id}"), move || async move {
                login_session.doctor_login(&login_id, &login_name).await
            })
            .await?;
        for room in &ack.active_rooms {
            tracing::info!(room_id = %room.id, patient = %room.patient_id, direct_mode = room.direct_mode, "active room");
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    context.shutdown().await;

    Ok(())
}
