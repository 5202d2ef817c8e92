//! Registration table mapping platform event kinds to handlers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use log::{error, warn};
use crate::core::error::ControllerError;
use crate::core::state::ControllerState;
use crate::platform::{EventKind, PlatformEvent};

/// Boxed asynchronous event handler
pub type EventHandler = Box<
    dyn Fn(Arc<ControllerState>, Arc<PlatformEvent>) -> BoxFuture<'static, Result<(), ControllerError>>
        + Send
        + Sync,
>;

/// Dispatches platform events to the handlers registered for their kind
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<EventKind, Vec<EventHandler>>,
}

impl EventDispatcher {
    /// Dispatcher with no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher wired to the controller's own handlers
    pub fn with_core_handlers() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(EventKind::DeviceJoined, handle_device_joined);
        dispatcher.register(EventKind::DeviceLeft, handle_device_left);
        dispatcher.register(EventKind::PacketIn, handle_packet_in);
        dispatcher.register(EventKind::PortStatsReply, handle_port_stats_reply);
        dispatcher
    }

    /// Add a handler for `kind`; handlers run in registration order
    pub fn register<F, Fut>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(Arc<ControllerState>, Arc<PlatformEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ControllerError>> + Send + 'static,
    {
        self.handlers
            .entry(kind)
            .or_default()
            .push(Box::new(move |state, event| handler(state, event).boxed()));
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map(|h| h.len()).unwrap_or(0)
    }

    /// Run every handler for the event. Failures are logged, never propagated.
    /// Returns the number of handlers that succeeded.
    pub async fn dispatch(&self, state: &Arc<ControllerState>, event: PlatformEvent) -> usize {
        let kind = event.kind();
        let Some(handlers) = self.handlers.get(&kind) else {
            warn!("No handler registered for {:?}", kind);
            return 0;
        };

        let event = Arc::new(event);
        let mut succeeded = 0;
        for handler in handlers {
            match handler(state.clone(), event.clone()).await {
                Ok(()) => succeeded += 1,
                Err(ControllerError::UnknownDevice(id)) => {
                    warn!("{:?} from unregistered switch {:016x} ignored", kind, id)
                }
                Err(e) => error!("Handling {:?} from switch {:016x} failed: {}", kind, event.device_id(), e),
            }
        }
        succeeded
    }
}

async fn handle_device_joined(
    state: Arc<ControllerState>,
    event: Arc<PlatformEvent>,
) -> Result<(), ControllerError> {
    if let PlatformEvent::DeviceJoined { device_id, session } = event.as_ref() {
        state.on_device_joined(*device_id, session.clone(), Utc::now()).await?;
    }
    Ok(())
}

async fn handle_device_left(
    state: Arc<ControllerState>,
    event: Arc<PlatformEvent>,
) -> Result<(), ControllerError> {
    if let PlatformEvent::DeviceLeft { device_id } = event.as_ref() {
        state.on_device_left(*device_id).await?;
    }
    Ok(())
}

async fn handle_packet_in(
    state: Arc<ControllerState>,
    event: Arc<PlatformEvent>,
) -> Result<(), ControllerError> {
    if let PlatformEvent::PacketIn { device_id, packet } = event.as_ref() {
        state.on_packet_in(*device_id, packet, Utc::now()).await?;
    }
    Ok(())
}

async fn handle_port_stats_reply(
    state: Arc<ControllerState>,
    event: Arc<PlatformEvent>,
) -> Result<(), ControllerError> {
    if let PlatformEvent::PortStatsReply { device_id, stats } = event.as_ref() {
        state.on_port_stats_reply(*device_id, stats, Utc::now()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::models::Config;
    use crate::platform::testing::RecordingSession;

    #[test]
    fn test_core_handlers_cover_every_kind() {
        let dispatcher = EventDispatcher::with_core_handlers();
        for kind in [
            EventKind::DeviceJoined,
            EventKind::DeviceLeft,
            EventKind::PacketIn,
            EventKind::PortStatsReply,
        ] {
            assert_eq!(dispatcher.handler_count(kind), 1);
        }
    }

    #[tokio::test]
    async fn test_custom_handlers_run_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = EventDispatcher::new();
        for _ in 0..2 {
            let calls = calls.clone();
            dispatcher.register(EventKind::DeviceLeft, move |_, _| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), ControllerError>(())
                }
            });
        }

        let state = Arc::new(ControllerState::new(&Config::default()));
        let ran = dispatcher
            .dispatch(&state, PlatformEvent::DeviceLeft { device_id: 1 })
            .await;

        assert_eq!(ran, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_handler_errors_are_contained() {
        let dispatcher = EventDispatcher::with_core_handlers();
        let state = Arc::new(ControllerState::new(&Config::default()));

        let ran = dispatcher
            .dispatch(
                &state,
                PlatformEvent::PortStatsReply {
                    device_id: 9,
                    stats: Vec::new(),
                },
            )
            .await;
        assert_eq!(ran, 0);

        let ran = dispatcher
            .dispatch(
                &state,
                PlatformEvent::DeviceJoined {
                    device_id: 9,
                    session: Arc::new(RecordingSession::default()),
                },
            )
            .await;
        assert_eq!(ran, 1);
        assert!(state.registry.get(9).await.is_some());
    }
}
