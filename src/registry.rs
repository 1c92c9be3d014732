use crate::entity::Entity;
use crate::link::{DefinitionId, RequestId, SimulationLink, TextBuffer, VarValue};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const MAX_VARIABLE_REQUESTS: usize = 32;

/// A variable to poll from the simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSpec {
    /// Source variable name, e.g. "PLANE ALTITUDE".
    pub name: String,
    /// Physical unit string; empty for string-typed variables.
    pub unit: String,
    pub is_string: bool,
    /// Label used in the outgoing snapshot, e.g. "Altitude".
    pub display_name: String,
}

impl VariableSpec {
    pub fn numeric(name: &str, unit: &str, display_name: &str) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
            is_string: false,
            display_name: display_name.to_string(),
        }
    }

    pub fn text(name: &str, display_name: &str) -> Self {
        Self {
            name: name.to_string(),
            unit: String::new(),
            is_string: true,
            display_name: display_name.to_string(),
        }
    }
}

/// One tracked telemetry request with its paired definition/request ids.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableRequest {
    pub definition: DefinitionId,
    pub request: RequestId,
    pub name: String,
    pub unit: String,
    pub is_string: bool,
    pub display_name: String,
    pub value: VarValue,
    /// True once the underlying subscription succeeded. Registration is
    /// attempted exactly once at creation time and never retried; a request
    /// that stays unregistered simply never yields data this session.
    pub registered: bool,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("variable registry full ({MAX_VARIABLE_REQUESTS} requests)")]
    Capacity,
    #[error("no variable request with id {0}")]
    UnknownRequest(RequestId),
}

/// Owns the ordered list of telemetry requests and their id assignment.
///
/// Definition and request ids are dense, monotonically assigned from 0, and
/// stable for the session's lifetime.
#[derive(Debug, Default)]
pub struct VariableRegistry {
    requests: Vec<VariableRequest, MAX_VARIABLE_REQUESTS>,
    next_definition: DefinitionId,
    next_request: RequestId,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
            next_definition: 0,
            next_request: 0,
        }
    }

    /// Assigns the next definition/request id pair, attempts registration
    /// against the link once, stores the request, and appends it to the
    /// entity's tracked telemetry list.
    pub fn add_request(
        &mut self,
        link: &mut impl SimulationLink,
        entity: &mut Entity,
        spec: VariableSpec,
    ) -> Result<RequestId, RegistryError> {
        if self.requests.is_full() {
            return Err(RegistryError::Capacity);
        }

        let definition = self.next_definition;
        let request = self.next_request;

        info!("adding variable request {} ({})", spec.name, spec.display_name);

        let unit = if spec.is_string { String::new() } else { spec.unit };
        let registered =
            match link.add_variable_definition(definition, &spec.name, &unit, spec.is_string) {
                Ok(()) => true,
                Err(e) => {
                    warn!("registration failed for {}: {e}", spec.name);
                    false
                }
            };

        let value = if spec.is_string {
            VarValue::Text(TextBuffer::new())
        } else {
            VarValue::Number(0.0)
        };

        let entry = VariableRequest {
            definition,
            request,
            name: spec.name,
            unit,
            is_string: spec.is_string,
            display_name: spec.display_name,
            value,
            registered,
        };

        self.requests
            .push(entry)
            .map_err(|_| RegistryError::Capacity)?;
        entity.telemetry.push(request);

        self.next_definition += 1;
        self.next_request += 1;

        Ok(request)
    }

    /// Routes a data response into its request slot by request id.
    /// Unroutable responses are the caller's drop-and-log path.
    pub fn record_value(
        &mut self,
        request: RequestId,
        value: VarValue,
    ) -> Result<&VariableRequest, RegistryError> {
        let entry = self
            .requests
            .iter_mut()
            .find(|r| r.request == request)
            .ok_or(RegistryError::UnknownRequest(request))?;
        entry.value = value;
        Ok(entry)
    }

    pub fn get(&self, request: RequestId) -> Option<&VariableRequest> {
        self.requests.iter().find(|r| r.request == request)
    }

    /// All requests in registration order, including unregistered ones.
    pub fn requests(&self) -> &[VariableRequest] {
        &self.requests
    }

    /// Requests whose subscription succeeded, in registration order.
    pub fn registered(&self) -> impl Iterator<Item = &VariableRequest> {
        self.requests.iter().filter(|r| r.registered)
    }

    pub fn registered_count(&self) -> usize {
        self.requests.iter().filter(|r| r.registered).count()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
