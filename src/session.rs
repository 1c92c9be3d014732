use crate::entity::Entity;
use crate::link::{
    DefinitionId, LinkEvent, RequestId, SimulationConnector, SimulationLink, SystemEventKind,
};
use crate::registry::{VariableRegistry, VariableSpec};
use crate::snapshot::Snapshot;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// Cadence defaults mirror the simulation transport's expected pacing:
// a settle delay before the first connect attempt, a short receive drain
// interval, and a 1 Hz data request sweep.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2500;
pub const DEFAULT_RECEIVE_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_DATA_REQUEST_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_CONNECT_RETRY_LIMIT: u32 = 1000;
pub const DEFAULT_CONNECT_RETRY_BACKOFF_MS: u64 = 500;

const SESSION_EVENT_BUFFER_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name announced to the simulation process on connect.
    pub client_name: String,
    pub entity_id: String,
    pub model_id: String,
    /// Variables registered once at connect time, in order.
    pub variables: Vec<VariableSpec>,
    pub settle_delay: Duration,
    pub receive_poll_interval: Duration,
    pub data_request_interval: Duration,
    pub connect_retry_limit: u32,
    pub connect_retry_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_name: "twinlink ingress client".to_string(),
            entity_id: "F151".to_string(),
            model_id: "dtmi:com:adt:Aircraft;1".to_string(),
            variables: Vec::new(),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            receive_poll_interval: Duration::from_millis(DEFAULT_RECEIVE_POLL_INTERVAL_MS),
            data_request_interval: Duration::from_millis(DEFAULT_DATA_REQUEST_INTERVAL_MS),
            connect_retry_limit: DEFAULT_CONNECT_RETRY_LIMIT,
            connect_retry_backoff: Duration::from_millis(DEFAULT_CONNECT_RETRY_BACKOFF_MS),
        }
    }
}

/// Session connection state.
///
/// `Disconnected` is both the initial state and the terminal state after a
/// session quit; `Failed` is absorbing and only reachable from `Connecting`
/// when the retry budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Polling,
    Failed,
}

/// Lifecycle events emitted by the session worker, in delivery order:
/// created, zero or more snapshots, ended.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    EntityCreated(Entity),
    SnapshotReady { entity: Entity, payload: String },
    SessionEnded(Entity),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("simulation connect timed out after {attempts} attempts")]
    ConnectionTimeout { attempts: u32 },
    #[error("simulation link lost")]
    LinkLost,
}

/// Handle to a running simulation session.
///
/// One background worker owns the link end-to-end (connect, receive, poll)
/// and is the sole emitter of lifecycle events; the handle only observes.
/// Must be created inside a tokio runtime.
pub struct SimulationSession {
    events: mpsc::Receiver<SessionEvent>,
    state: watch::Receiver<SessionState>,
    last_error: watch::Receiver<Option<SessionError>>,
    worker: JoinHandle<()>,
}

impl SimulationSession {
    /// Spawns the session worker. The worker waits out the settle delay,
    /// connects with a bounded retry budget, registers the configured
    /// variables exactly once, and then polls until the simulation quits.
    pub fn connect<C: SimulationConnector>(connector: C, config: SessionConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(SESSION_EVENT_BUFFER_SIZE);
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (error_tx, error_rx) = watch::channel(None);

        let worker = tokio::spawn(session_worker(connector, config, event_tx, state_tx, error_tx));

        Self {
            events: event_rx,
            state: state_rx,
            last_error: error_rx,
            worker,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch channel for observing state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.last_error.borrow().clone()
    }

    /// Next lifecycle event, or `None` once the worker has exited and the
    /// channel is drained.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Waits for the worker to finish.
    pub async fn join(self) {
        let _ = self.worker.await;
    }
}

async fn session_worker<C: SimulationConnector>(
    mut connector: C,
    config: SessionConfig,
    events: mpsc::Sender<SessionEvent>,
    state: watch::Sender<SessionState>,
    last_error: watch::Sender<Option<SessionError>>,
) {
    tokio::time::sleep(config.settle_delay).await;

    let _ = state.send(SessionState::Connecting);
    info!("attempting a connection to the simulation source...");
    let mut link = match connect_with_retry(&mut connector, &config).await {
        Some(link) => link,
        None => {
            let err = SessionError::ConnectionTimeout {
                attempts: config.connect_retry_limit,
            };
            error!("simulation connect failed: {err}");
            let _ = last_error.send(Some(err));
            let _ = state.send(SessionState::Failed);
            return;
        }
    };
    info!("connection to the simulation source successful");
    let _ = state.send(SessionState::Connected);

    if let Err(e) = link.subscribe_system_event(SystemEventKind::MissionCompleted) {
        warn!("system event subscription failed: {e}");
    }

    // One-time variable registration; failures are kept as permanently
    // unavailable requests rather than retried.
    let mut entity = Entity::new(&config.entity_id, &config.model_id);
    let mut registry = VariableRegistry::new();
    for spec in &config.variables {
        if let Err(e) = registry.add_request(&mut link, &mut entity, spec.clone()) {
            warn!("variable request rejected: {e}");
        }
    }

    if events
        .send(SessionEvent::EntityCreated(entity.clone()))
        .await
        .is_err()
    {
        // Nobody is listening; tear down without polling.
        let _ = state.send(SessionState::Disconnected);
        return;
    }

    let _ = state.send(SessionState::Polling);
    let outcome = poll_loop(link, &config, &mut entity, &mut registry, &events).await;
    if let Some(err) = outcome {
        error!("{err}");
        let _ = last_error.send(Some(err));
    }

    // The link has been released by now; report the terminal state and the
    // final lifecycle event exactly once.
    let _ = state.send(SessionState::Disconnected);
    let _ = events.send(SessionEvent::SessionEnded(entity)).await;
    info!("simulation session ended");
}

async fn connect_with_retry<C: SimulationConnector>(
    connector: &mut C,
    config: &SessionConfig,
) -> Option<C::Link> {
    for attempt in 1..=config.connect_retry_limit {
        match connector.connect(&config.client_name) {
            Ok(link) => {
                if attempt > 1 {
                    debug!("connected on attempt {attempt}");
                }
                return Some(link);
            }
            Err(e) => {
                warn!(
                    "connect attempt {attempt}/{} failed: {e}",
                    config.connect_retry_limit
                );
            }
        }
        if attempt < config.connect_retry_limit {
            tokio::time::sleep(config.connect_retry_backoff).await;
        }
    }
    None
}

/// Issues one data request per registered variable on the configured cadence,
/// draining incoming messages between requests so responses are not missed.
/// Returns `None` on a clean quit, `Some(err)` on link loss.
async fn poll_loop<L: SimulationLink>(
    mut link: L,
    config: &SessionConfig,
    entity: &mut Entity,
    registry: &mut VariableRegistry,
    events: &mpsc::Sender<SessionEvent>,
) -> Option<SessionError> {
    let mut answered: HashSet<RequestId> = HashSet::new();

    loop {
        let sweep: Vec<(RequestId, DefinitionId)> = registry
            .registered()
            .map(|r| (r.request, r.definition))
            .collect();
        if !sweep.is_empty() {
            debug!("polling {} telemetry requests", sweep.len());
        }

        for (request, definition) in sweep {
            match drain_messages(&mut link, registry, &mut answered) {
                Ok(DrainOutcome::Continue) => {}
                Ok(DrainOutcome::Quit) => return None,
                Err(err) => return Some(err),
            }
            if let Err(e) = link.request_data(request, definition) {
                warn!("data request {request} failed: {e}");
            }
        }

        match drain_messages(&mut link, registry, &mut answered) {
            Ok(DrainOutcome::Continue) => {}
            Ok(DrainOutcome::Quit) => return None,
            Err(err) => return Some(err),
        }

        let registered_count = registry.registered_count();
        let sweep_complete =
            registered_count > 0 && registry.registered().all(|r| answered.contains(&r.request));
        if sweep_complete {
            entity.update_contents(registry);
            let snapshot = Snapshot::assemble(entity, registry);
            let payload = snapshot.to_json();
            debug!("sweep complete, snapshot assembled for {}", entity.entity_id);
            if events
                .send(SessionEvent::SnapshotReady {
                    entity: entity.clone(),
                    payload,
                })
                .await
                .is_err()
            {
                return None;
            }
            answered.clear();
        }

        // With nothing registered the loop degenerates to a pure receive
        // drain waiting for quit, paced at the shorter receive interval.
        let pause = if registered_count > 0 {
            config.data_request_interval
        } else {
            config.receive_poll_interval
        };
        tokio::time::sleep(pause).await;
    }
}

enum DrainOutcome {
    Continue,
    Quit,
}

fn drain_messages<L: SimulationLink>(
    link: &mut L,
    registry: &mut VariableRegistry,
    answered: &mut HashSet<RequestId>,
) -> Result<DrainOutcome, SessionError> {
    let batch = match link.receive_messages() {
        Ok(batch) => batch,
        Err(e) => {
            // Total link loss after establishment is a terminal quit.
            error!("failed to receive messages from the simulation link: {e}");
            return Err(SessionError::LinkLost);
        }
    };

    for event in batch {
        match event {
            LinkEvent::Opened => debug!("simulation link open acknowledged"),
            LinkEvent::Data { request, value } => match registry.record_value(request, value) {
                Ok(entry) => {
                    debug!("variable {} received a value", entry.name);
                    answered.insert(request);
                }
                Err(e) => warn!("dropping unroutable data message: {e}"),
            },
            LinkEvent::SystemEvent { kind, status } => {
                info!("system event {kind:?} fired with status {status:?}");
            }
            LinkEvent::Exception { code } => {
                warn!("simulation link exception (code {code})");
            }
            LinkEvent::Quit => {
                info!("simulation quit received");
                return Ok(DrainOutcome::Quit);
            }
        }
    }

    Ok(DrainOutcome::Continue)
}
