pub mod config;
pub mod errors;
pub mod host;
pub mod telemetry;
