pub mod project;
pub mod registry;

pub use project::{MonitoringConfig, SluiceConfig, load_config};
pub use registry::{Registry, init_default_registry, load_registry, save_registry};
