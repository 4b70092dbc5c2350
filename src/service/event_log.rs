//! Audit task copying bus events into the store's event log.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::domain::EventBus;
use crate::persistence::CoordinationStore;

/// Subscribes to `event_bus` and appends every event to `store` until the
/// bus closes.
///
/// Events are informational, so an append failure or a lagging receiver
/// is logged and skipped rather than stopping the task.
pub fn spawn_event_log(store: Arc<dyn CoordinationStore>, event_bus: &EventBus) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = store.append_event(&event).await {
                        tracing::error!(
                            error = %e,
                            event_type = event.event_type_str(),
                            subject_id = %event.subject_id(),
                            "failed to append event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event log lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("event log stopped");
    })
}
