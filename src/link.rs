use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// String-typed variables arrive as fixed 256-byte records on the wire;
/// longer values are truncated at the link boundary.
pub const MAX_TEXT_VALUE_LEN: usize = 256;

pub type DefinitionId = u32;
pub type RequestId = u32;

pub type TextBuffer = ArrayString<MAX_TEXT_VALUE_LEN>;

/// A single sampled variable value, numeric or string.
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Number(f64),
    Text(TextBuffer),
}

impl VarValue {
    pub fn number(value: f64) -> Self {
        VarValue::Number(value)
    }

    /// Builds a text value, truncating at `MAX_TEXT_VALUE_LEN` bytes.
    pub fn text(value: &str) -> Self {
        let mut buffer = TextBuffer::new();
        for ch in value.chars() {
            if buffer.try_push(ch).is_err() {
                break;
            }
        }
        VarValue::Text(buffer)
    }

    pub fn as_json(&self) -> serde_json::Value {
        match self {
            VarValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            VarValue::Text(s) => serde_json::Value::String(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemEventKind {
    MissionCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissionStatus {
    Failed,
    Crashed,
    Succeeded,
}

/// Messages drained from the simulation link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The link reported its open handshake completed.
    Opened,
    /// A variable response correlated to an outstanding request.
    Data { request: RequestId, value: VarValue },
    /// A subscribed system event fired.
    SystemEvent {
        kind: SystemEventKind,
        status: MissionStatus,
    },
    /// The link reported a per-message failure; the session keeps running.
    Exception { code: u32 },
    /// The simulation is shutting down; the session must release the link.
    Quit,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("simulation connect failed: {0}")]
    ConnectFailed(String),
    #[error("simulation link closed")]
    Closed,
    #[error("simulation transport failure: {0}")]
    Transport(String),
}

/// Opens links to the simulation process.
pub trait SimulationConnector: Send + 'static {
    type Link: SimulationLink;

    fn connect(&mut self, client_name: &str) -> Result<Self::Link, LinkError>;
}

/// One established connection to the simulation process.
///
/// Calls are non-blocking: `receive_messages` drains whatever is pending and
/// returns immediately, `request_data` only enqueues the request. The session
/// worker owns the link exclusively and paces the calls itself.
pub trait SimulationLink: Send + 'static {
    fn add_variable_definition(
        &mut self,
        definition: DefinitionId,
        name: &str,
        unit: &str,
        is_string: bool,
    ) -> Result<(), LinkError>;

    fn request_data(&mut self, request: RequestId, definition: DefinitionId)
        -> Result<(), LinkError>;

    fn receive_messages(&mut self) -> Result<Vec<LinkEvent>, LinkError>;

    fn subscribe_system_event(&mut self, kind: SystemEventKind) -> Result<(), LinkError>;
}
