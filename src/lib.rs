// Public modules
pub mod config;
pub mod coordinator;
pub mod direct;
pub mod errors;
pub mod hub;
pub mod messages;
pub mod registry;
pub mod scheduler;
pub mod sensors;
pub mod sink;

// Re-export commonly used types
pub use config::{load_hub_config, CoordinatorConfig, HubConfig};
pub use coordinator::{MotionCoordinator, SessionState};
pub use errors::{HubError, HubResult, StreamError};
pub use hub::SensorHub;
pub use messages::{Reading, SensorEvent};
pub use registry::ConsumerId;
pub use sensors::{Sample, SampleSource, SensorKind, Value};
pub use sink::{EventSink, SensorStream};

use tokio_stream::StreamExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Initialize tracing with default configuration
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

/// Run the hub on simulated sources, logging every configured stream until Ctrl-C
pub async fn run_sensor_hub(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("[MotionSensorHub] starting up...");

    let hub_config_path = format!("{}/hub.toml", config_path);
    let hub_config = load_hub_config(&hub_config_path)?;
    info!("[config] loaded {} stream(s)", hub_config.streams.len());

    let hub = SensorHub::simulated(hub_config.coordinator.clone());

    let mut printers = Vec::new();
    for entry in &hub_config.streams {
        let (id, mut stream) = hub.subscribe_stream(entry.kind, entry.period()).await?;
        printers.push(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                match event.to_json() {
                    Ok(line) => info!("[{}] {}", id, line),
                    Err(e) => error!("[{}] failed to encode event: {}", id, e),
                }
            }
        }));
    }
    info!("[main] {} stream(s) running, Ctrl-C to stop", printers.len());

    tokio::signal::ctrl_c().await?;
    info!("[main] shutting down");

    let status = hub.status().await;
    match serde_json::to_string(&status) {
        Ok(json) => info!("[main] final status: {}", json),
        Err(e) => error!("[main] failed to encode status: {}", e),
    }

    hub.shutdown().await;
    for printer in printers {
        let _ = printer.await;
    }
    Ok(())
}
