use motion_sensorhub::{init_tracing, run_sensor_hub};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing with RUST_LOG environment variable support
    init_tracing();

    // Load configuration from CONFIG_PATH or default
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());
    tracing::info!("[main] Configuration path: {}", config_path);

    run_sensor_hub(&config_path).await
}
