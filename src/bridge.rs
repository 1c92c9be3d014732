use crate::session::{SessionEvent, SimulationSession};
use crate::twin::{TwinLifecycleController, TwinService};
use tracing::error;

/// Pumps session lifecycle events into the twin controller until the session
/// ends: entity-created drives standup, snapshot-ready drives publish, and
/// session-ended drives shutdown.
///
/// Remote failures are logged and do not stop the pump. Each lifecycle
/// trigger makes at most one remote attempt; a caller wanting retries wires
/// its own policy around the controller instead.
pub async fn run<S: TwinService>(
    mut session: SimulationSession,
    controller: &TwinLifecycleController<S>,
) {
    while let Some(event) = session.next_event().await {
        match event {
            SessionEvent::EntityCreated(entity) => {
                if let Err(e) = controller.standup(&entity).await {
                    error!("{e}");
                }
            }
            SessionEvent::SnapshotReady { entity, payload } => {
                if let Err(e) = controller.publish(&entity, &payload).await {
                    error!("{e}");
                }
            }
            SessionEvent::SessionEnded(entity) => {
                if let Err(e) = controller.shutdown(&entity).await {
                    error!("{e}");
                }
            }
        }
    }
}
