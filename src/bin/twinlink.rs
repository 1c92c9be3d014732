use clap::{App, Arg};
use colored::*;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;
use twinlink::link::{
    DefinitionId, LinkError, LinkEvent, RequestId, SimulationConnector, SimulationLink,
    SystemEventKind, VarValue,
};
use twinlink::registry::VariableSpec;
use twinlink::session::{SessionConfig, SimulationSession};
use twinlink::twin::{TwinLifecycleController, TwinRecord, TwinService, TwinServiceError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("twinlink")
        .version("0.1.0")
        .author("Immersive Telemetry Team")
        .about("🛫 Simulation-to-twin telemetry ingress - scripted flight demo")
        .arg(
            Arg::with_name("interval")
                .short("i")
                .long("interval")
                .value_name("MS")
                .help("Telemetry request interval in milliseconds")
                .takes_value(true)
                .default_value("1000")
                .validator(validate_u64),
        )
        .arg(
            Arg::with_name("duration")
                .short("d")
                .long("duration")
                .value_name("SECS")
                .help("Scripted flight length before the simulation quits")
                .takes_value(true)
                .default_value("15")
                .validator(validate_u64),
        )
        .arg(
            Arg::with_name("entity")
                .short("e")
                .long("entity")
                .value_name("ID")
                .help("Entity identifier for the twin instance")
                .takes_value(true)
                .default_value("F151"),
        )
        .arg(
            Arg::with_name("model")
                .short("m")
                .long("model")
                .value_name("MODEL_ID")
                .help("Model identifier for the remote twin schema")
                .takes_value(true)
                .default_value("dtmi:com:adt:Aircraft;1"),
        )
        .get_matches();

    tracing_subscriber::fmt::init();

    let interval_ms: u64 = matches.value_of("interval").unwrap_or("1000").parse()?;
    let duration_secs: u64 = matches.value_of("duration").unwrap_or("15").parse()?;
    let entity_id = matches.value_of("entity").unwrap_or("F151").to_string();
    let model_id = matches
        .value_of("model")
        .unwrap_or("dtmi:com:adt:Aircraft;1")
        .to_string();

    println!("{}", "🛫 twinlink - scripted flight demo".bold());
    println!("==================================");
    println!("   Entity: {}", entity_id.cyan());
    println!("   Model:  {}", model_id.cyan());
    println!(
        "   Flight: {}s at one sweep per {}ms",
        duration_secs, interval_ms
    );

    let config = SessionConfig {
        entity_id,
        model_id,
        variables: flight_variables(),
        settle_delay: Duration::from_millis(250),
        data_request_interval: Duration::from_millis(interval_ms),
        connect_retry_limit: 5,
        connect_retry_backoff: Duration::from_millis(200),
        ..SessionConfig::default()
    };

    let connector = ScriptedFlightConnector {
        flight_time: Duration::from_secs(duration_secs),
    };
    let session = SimulationSession::connect(connector, config);
    let controller = TwinLifecycleController::new(InMemoryTwinService::default());

    twinlink::bridge::run(session, &controller).await;

    println!("{}", "🛬 Flight complete, twin deleted".green());
    Ok(())
}

fn validate_u64(value: String) -> Result<(), String> {
    value
        .parse::<u64>()
        .map(|_| ())
        .map_err(|_| "value must be a non-negative integer".to_string())
}

/// The standard flight telemetry set.
fn flight_variables() -> Vec<VariableSpec> {
    vec![
        VariableSpec::numeric("PLANE PITCH DEGREES", "radians", "Pitch"),
        VariableSpec::numeric("PLANE ALTITUDE", "feet", "Altitude"),
        VariableSpec::numeric("PLANE HEADING DEGREES TRUE", "radians", "Heading"),
        VariableSpec::numeric("PLANE LONGITUDE", "radians", "Longitude"),
        VariableSpec::numeric("PLANE LATITUDE", "radians", "Latitude"),
        VariableSpec::numeric("AIRSPEED INDICATED", "knots", "Airspeed"),
        VariableSpec::numeric("PLANE BANK DEGREES", "radians", "Bank"),
    ]
}

struct ScriptedFlightConnector {
    flight_time: Duration,
}

impl SimulationConnector for ScriptedFlightConnector {
    type Link = ScriptedFlightLink;

    fn connect(&mut self, client_name: &str) -> Result<Self::Link, LinkError> {
        info!("scripted simulation accepted client {client_name}");
        Ok(ScriptedFlightLink {
            started: Instant::now(),
            flight_time: self.flight_time,
            definitions: HashMap::new(),
            pending: vec![LinkEvent::Opened],
            quit_sent: false,
        })
    }
}

/// An in-process stand-in for the simulation transport: answers every data
/// request from a smooth scripted flight profile and quits after the
/// configured flight time.
struct ScriptedFlightLink {
    started: Instant,
    flight_time: Duration,
    definitions: HashMap<DefinitionId, String>,
    pending: Vec<LinkEvent>,
    quit_sent: bool,
}

impl ScriptedFlightLink {
    fn sample(&self, name: &str) -> f64 {
        let t = self.started.elapsed().as_secs_f64();
        match name {
            "PLANE PITCH DEGREES" => 0.05 * (t * 0.4).sin(),
            "PLANE ALTITUDE" => 5000.0 + 250.0 * (t * 0.1).sin(),
            "PLANE HEADING DEGREES TRUE" => (t * 0.02) % (2.0 * std::f64::consts::PI),
            "PLANE LONGITUDE" => -1.4936 + t * 1.0e-6,
            "PLANE LATITUDE" => 0.7342 + t * 5.0e-7,
            "AIRSPEED INDICATED" => 250.0 + 15.0 * (t * 0.3).sin(),
            "PLANE BANK DEGREES" => 0.1 * (t * 0.25).cos(),
            _ => 0.0,
        }
    }
}

impl SimulationLink for ScriptedFlightLink {
    fn add_variable_definition(
        &mut self,
        definition: DefinitionId,
        name: &str,
        _unit: &str,
        _is_string: bool,
    ) -> Result<(), LinkError> {
        self.definitions.insert(definition, name.to_string());
        Ok(())
    }

    fn request_data(
        &mut self,
        request: RequestId,
        definition: DefinitionId,
    ) -> Result<(), LinkError> {
        let name = self
            .definitions
            .get(&definition)
            .ok_or_else(|| LinkError::Transport("unknown definition".to_string()))?;
        let value = VarValue::number(self.sample(name));
        self.pending.push(LinkEvent::Data { request, value });
        Ok(())
    }

    fn receive_messages(&mut self) -> Result<Vec<LinkEvent>, LinkError> {
        if !self.quit_sent && self.started.elapsed() >= self.flight_time {
            self.quit_sent = true;
            self.pending.push(LinkEvent::Quit);
        }
        Ok(std::mem::take(&mut self.pending))
    }

    fn subscribe_system_event(&mut self, _kind: SystemEventKind) -> Result<(), LinkError> {
        Ok(())
    }
}

/// Twin store kept in process memory; stands in for the remote service so the
/// demo exercises the full create/publish/delete lifecycle.
#[derive(Default)]
struct InMemoryTwinService {
    twins: Mutex<HashMap<String, TwinRecord>>,
}

#[async_trait::async_trait]
impl TwinService for InMemoryTwinService {
    async fn create_or_replace(
        &self,
        entity_id: &str,
        model_id: &str,
        contents: serde_json::Map<String, serde_json::Value>,
    ) -> Result<TwinRecord, TwinServiceError> {
        let record = TwinRecord {
            entity_id: entity_id.to_string(),
            model_id: model_id.to_string(),
            contents,
        };
        self.twins
            .lock()
            .await
            .insert(entity_id.to_string(), record.clone());
        Ok(record)
    }

    async fn delete(&self, entity_id: &str) -> Result<(), TwinServiceError> {
        self.twins
            .lock()
            .await
            .remove(entity_id)
            .map(|_| ())
            .ok_or_else(|| TwinServiceError::new(404, "twin not found"))
    }

    async fn publish_telemetry(
        &self,
        entity_id: &str,
        message_id: &str,
        payload: &str,
    ) -> Result<(), TwinServiceError> {
        if !self.twins.lock().await.contains_key(entity_id) {
            return Err(TwinServiceError::new(404, "twin not found"));
        }
        info!("📡 telemetry {message_id} for {entity_id}: {payload}");
        Ok(())
    }

    async fn get(&self, entity_id: &str) -> Result<TwinRecord, TwinServiceError> {
        self.twins
            .lock()
            .await
            .get(entity_id)
            .cloned()
            .ok_or_else(|| TwinServiceError::new(404, "twin not found"))
    }
}
