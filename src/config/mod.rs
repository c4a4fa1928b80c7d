pub mod hub_config;

pub use hub_config::{load_hub_config, parse_hub_config, CoordinatorConfig, HubConfig, StreamEntry};
