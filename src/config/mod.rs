//! Configuration management

mod settings;

pub use settings::{AppConfig, EngineSettings, GpuSettings, PanelConfig};
