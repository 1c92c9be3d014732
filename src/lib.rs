//! # Simulation-to-Twin Telemetry Ingress
//!
//! A bridge between a real-time simulation data source and a cloud twin-state
//! service: it polls named numeric/string variables from a live simulation at
//! a fixed interval, pushes one telemetry event per completed sample sweep to
//! the remote digital twin of the simulated entity, and keeps the twin's
//! create/replace/delete lifecycle in lockstep with the simulation session.
//!
//! ## Features
//!
//! - **Session management**: settle delay, bounded connect retry, background
//!   receive/poll worker, clean teardown on simulation quit
//! - **Variable multiplexing**: dense definition/request id assignment with
//!   one-shot registration and per-request response routing
//! - **Snapshot assembly**: one flat JSON payload per completed poll sweep,
//!   numbers rendered with fixed nine-fractional-digit precision
//! - **Twin lifecycle synchronization**: cached, per-entity-serialized
//!   create-or-replace / publish-telemetry / delete against the remote store
//!
//! ## Quick Start
//!
//! ```rust
//! use twinlink::registry::VariableSpec;
//! use twinlink::session::SessionConfig;
//!
//! let mut config = SessionConfig::default();
//! config.variables = vec![
//!     VariableSpec::numeric("PLANE PITCH DEGREES", "radians", "Pitch"),
//!     VariableSpec::numeric("PLANE ALTITUDE", "feet", "Altitude"),
//! ];
//! assert_eq!(config.entity_id, "F151");
//! ```
//!
//! Wire a [`session::SimulationSession`] to a [`twin::TwinLifecycleController`]
//! with [`bridge::run`] to drive the full ingress pipeline.
//!
//! ## Architecture
//!
//! - [`link`] - Simulation transport capability traits and link events
//! - [`registry`] - Variable request bookkeeping and id assignment
//! - [`entity`] - The simulated object mirrored as a twin
//! - [`session`] - Connection/session state machine and polling worker
//! - [`snapshot`] - Per-sweep telemetry snapshot assembly
//! - [`twin`] - Twin service capability and lifecycle controller
//! - [`bridge`] - Event pump from session lifecycle to twin operations

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod entity;
pub mod link;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod twin;

// Re-export main public types for convenience
pub use entity::Entity;
pub use link::{LinkEvent, SimulationConnector, SimulationLink, VarValue};
pub use registry::{VariableRegistry, VariableSpec};
pub use session::{SessionConfig, SessionEvent, SessionState, SimulationSession};
pub use snapshot::Snapshot;
pub use twin::{TwinLifecycleController, TwinRecord, TwinService};
