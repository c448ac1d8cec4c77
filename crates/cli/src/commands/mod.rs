pub mod config;
pub mod endpoints;
pub mod utils;

pub use config::{handle_config_command, ConfigCommands};
pub use endpoints::{handle_endpoints_command, EndpointsCommands};
