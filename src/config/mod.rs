pub mod app_configuration;
pub mod params;

pub use app_configuration::{AppConfiguration, StreamConfig};
pub use params::Params;
