use crate::link::{RequestId, VarValue};
use crate::registry::VariableRegistry;
use std::collections::BTreeMap;

/// The simulated object mirrored as a remote twin.
///
/// Created once per session when the simulation link opens. `contents` holds
/// the last-known value per property and is refreshed on every completed poll
/// sweep; the entity itself is never deleted locally (deletion happens only
/// against the remote store on session end).
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub entity_id: String,
    pub model_id: String,
    pub contents: BTreeMap<String, VarValue>,
    /// Tracked telemetry requests in registration order. The registry owns
    /// the requests; the entity only references them by id.
    pub telemetry: Vec<RequestId>,
}

impl Entity {
    pub fn new(entity_id: &str, model_id: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            model_id: model_id.to_string(),
            contents: BTreeMap::new(),
            telemetry: Vec::new(),
        }
    }

    /// Refreshes `contents` from the registry's last-written slots.
    /// Unregistered requests never yield data and are skipped.
    pub fn update_contents(&mut self, registry: &VariableRegistry) {
        for request in &self.telemetry {
            if let Some(entry) = registry.get(*request) {
                if entry.registered {
                    self.contents
                        .insert(entry.display_name.clone(), entry.value.clone());
                }
            }
        }
    }

    /// Twin-store representation of the current contents.
    pub fn contents_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.contents
            .iter()
            .map(|(name, value)| (name.clone(), value.as_json()))
            .collect()
    }
}
