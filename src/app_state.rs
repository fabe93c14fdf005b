//! Explicitly constructed application context.
//!
//! Collaborators (screens, form controllers) receive an [`AppContext`]
//! instead of reaching for a process-wide singleton, so tests can build as
//! many isolated contexts as they need.

use std::sync::Arc;

use crate::config::CoordinatorConfig;
use crate::coordinator::RequestCoordinator;
use crate::session::ConsultationSessionClient;

/// Shared services handed to every collaborator.
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Real-time consultation session.
    pub session: Arc<ConsultationSessionClient>,
    /// Serializer for deduplicable REST calls.
    pub coordinator: Arc<RequestCoordinator>,
}

impl AppContext {
    /// Builds a context with a fresh, uninitialized session and a running
    /// coordinator. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(coordinator_config: CoordinatorConfig) -> Self {
        Self {
            session: Arc::new(ConsultationSessionClient::new()),
            coordinator: Arc::new(RequestCoordinator::new(coordinator_config)),
        }
    }

    /// Tears down both services: disconnects the session and drains the
    /// coordinator.
    pub async fn shutdown(&self) {
        self.session.disconnect().await;
        self.coordinator.shutdown().await;
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::session::ConnectionState;

    #[tokio::test]
    async fn contexts_are_isolated() {
        let a = AppContext::new(CoordinatorConfig::default());
        let b = AppContext::new(CoordinatorConfig::default());
        assert!(!Arc::ptr_eq(&a.session, &b.session));

        a.shutdown().await;
        let closed = a
            .coordinator
            .queue_request("k", || async { Ok::<_, ClientError>(()) })
            .await;
        assert!(matches!(closed, Err(ClientError::CoordinatorClosed)));

        let open = b
            .coordinator
            .queue_request("k", || async { Ok::<_, ClientError>(1) })
            .await;
        assert_eq!(open.ok(), Some(1));
        assert_eq!(b.session.connection_state(), ConnectionState::Disconnected);
    }
}
