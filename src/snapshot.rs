use crate::entity::Entity;
use crate::link::VarValue;
use crate::registry::VariableRegistry;

/// One complete set of telemetry values for an entity, captured in a single
/// poll sweep. Field order follows variable registration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    entity_id: String,
    fields: Vec<(String, VarValue)>,
}

impl Snapshot {
    /// Builds the snapshot for an entity from the registry's last-written
    /// slots. Only registered variables contribute a field; values may be
    /// stale (there is no fresh-since-last-cycle filter).
    pub fn assemble(entity: &Entity, registry: &VariableRegistry) -> Self {
        let mut fields = Vec::with_capacity(entity.telemetry.len());
        for request in &entity.telemetry {
            if let Some(entry) = registry.get(*request) {
                if entry.registered {
                    fields.push((entry.display_name.clone(), entry.value.clone()));
                }
            }
        }
        Self {
            entity_id: entity.entity_id.clone(),
            fields,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn fields(&self) -> &[(String, VarValue)] {
        &self.fields
    }

    /// Renders the flat JSON payload consumed by the twin service: the
    /// entity id under `"Id"` followed by one entry per field. Numbers carry
    /// fixed nine-fractional-digit precision; strings pass through.
    pub fn to_json(&self) -> String {
        let mut out = String::with_capacity(32 + self.fields.len() * 32);
        out.push_str("{\"Id\":");
        out.push_str(&quote(&self.entity_id));
        for (name, value) in &self.fields {
            out.push(',');
            out.push_str(&quote(name));
            out.push(':');
            match value {
                VarValue::Number(n) => out.push_str(&render_number(*n)),
                VarValue::Text(s) => out.push_str(&quote(s)),
            }
        }
        out.push('}');
        out
    }
}

/// Fixed nine-fractional-digit text form for numeric telemetry.
pub fn render_number(value: f64) -> String {
    // Non-finite samples have no JSON number form.
    if value.is_finite() {
        format!("{value:.9}")
    } else {
        "null".to_string()
    }
}

fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{
        DefinitionId, LinkError, LinkEvent, RequestId, SimulationLink, SystemEventKind,
    };
    use crate::registry::VariableSpec;

    struct AcceptAllLink;

    impl SimulationLink for AcceptAllLink {
        fn add_variable_definition(
            &mut self,
            _definition: DefinitionId,
            _name: &str,
            _unit: &str,
            _is_string: bool,
        ) -> Result<(), LinkError> {
            Ok(())
        }

        fn request_data(
            &mut self,
            _request: RequestId,
            _definition: DefinitionId,
        ) -> Result<(), LinkError> {
            Ok(())
        }

        fn receive_messages(&mut self) -> Result<Vec<LinkEvent>, LinkError> {
            Ok(Vec::new())
        }

        fn subscribe_system_event(&mut self, _kind: SystemEventKind) -> Result<(), LinkError> {
            Ok(())
        }
    }

    struct RejectAllLink;

    impl SimulationLink for RejectAllLink {
        fn add_variable_definition(
            &mut self,
            _definition: DefinitionId,
            _name: &str,
            _unit: &str,
            _is_string: bool,
        ) -> Result<(), LinkError> {
            Err(LinkError::Transport("rejected".to_string()))
        }

        fn request_data(
            &mut self,
            _request: RequestId,
            _definition: DefinitionId,
        ) -> Result<(), LinkError> {
            Ok(())
        }

        fn receive_messages(&mut self) -> Result<Vec<LinkEvent>, LinkError> {
            Ok(Vec::new())
        }

        fn subscribe_system_event(&mut self, _kind: SystemEventKind) -> Result<(), LinkError> {
            Ok(())
        }
    }

    #[test]
    fn test_nine_digit_numeric_form() {
        assert_eq!(render_number(1000.123456789), "1000.123456789");
        assert_eq!(render_number(0.1), "0.100000000");
        assert_eq!(render_number(5000.0), "5000.000000000");
        assert_eq!(render_number(f64::NAN), "null");
    }

    #[test]
    fn test_snapshot_payload_shape() {
        let mut registry = VariableRegistry::new();
        let mut link = AcceptAllLink;
        let mut entity = Entity::new("F151", "dtmi:com:adt:Aircraft;1");

        let altitude = registry
            .add_request(
                &mut link,
                &mut entity,
                VariableSpec::numeric("PLANE ALTITUDE", "feet", "Altitude"),
            )
            .expect("registry has capacity");
        let heading = registry
            .add_request(
                &mut link,
                &mut entity,
                VariableSpec::text("GPS APPROACH MODE", "Heading"),
            )
            .expect("registry has capacity");

        registry
            .record_value(altitude, VarValue::number(1000.123456789))
            .expect("known request");
        registry
            .record_value(heading, VarValue::text("n/a"))
            .expect("known request");

        let snapshot = Snapshot::assemble(&entity, &registry);
        assert_eq!(snapshot.entity_id(), "F151");
        assert_eq!(
            snapshot.to_json(),
            r#"{"Id":"F151","Altitude":1000.123456789,"Heading":"n/a"}"#
        );
    }

    #[test]
    fn test_unregistered_variables_are_excluded() {
        let mut registry = VariableRegistry::new();
        let mut entity = Entity::new("F151", "dtmi:com:adt:Aircraft;1");

        registry
            .add_request(
                &mut AcceptAllLink,
                &mut entity,
                VariableSpec::numeric("PLANE PITCH DEGREES", "radians", "Pitch"),
            )
            .expect("registry has capacity");
        registry
            .add_request(
                &mut RejectAllLink,
                &mut entity,
                VariableSpec::numeric("PLANE ALTITUDE", "feet", "Altitude"),
            )
            .expect("failed registration still stores the request");

        let snapshot = Snapshot::assemble(&entity, &registry);
        assert_eq!(snapshot.fields().len(), 1);
        assert_eq!(snapshot.to_json(), r#"{"Id":"F151","Pitch":0.000000000}"#);
    }

    #[test]
    fn test_stale_values_are_included() {
        let mut registry = VariableRegistry::new();
        let mut link = AcceptAllLink;
        let mut entity = Entity::new("F151", "dtmi:com:adt:Aircraft;1");

        let pitch = registry
            .add_request(
                &mut link,
                &mut entity,
                VariableSpec::numeric("PLANE PITCH DEGREES", "radians", "Pitch"),
            )
            .expect("registry has capacity");
        registry
            .record_value(pitch, VarValue::number(0.25))
            .expect("known request");

        // A second sweep with no new value still reports the last one.
        let first = Snapshot::assemble(&entity, &registry);
        let second = Snapshot::assemble(&entity, &registry);
        assert_eq!(first, second);
        assert_eq!(second.to_json(), r#"{"Id":"F151","Pitch":0.250000000}"#);
    }

    #[test]
    fn test_quoting_escapes_special_characters() {
        let mut registry = VariableRegistry::new();
        let mut link = AcceptAllLink;
        let mut entity = Entity::new("edge\"case", "dtmi:com:adt:Aircraft;1");

        let label = registry
            .add_request(
                &mut link,
                &mut entity,
                VariableSpec::text("ATC ID", "Tail\"Number"),
            )
            .expect("registry has capacity");
        registry
            .record_value(label, VarValue::text("a\"b"))
            .expect("known request");

        let payload = Snapshot::assemble(&entity, &registry).to_json();
        let parsed: serde_json::Value =
            serde_json::from_str(&payload).expect("payload is valid JSON");
        assert_eq!(parsed["Id"], "edge\"case");
        assert_eq!(parsed["Tail\"Number"], "a\"b");
    }
}
