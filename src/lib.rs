// Re-export all public modules so they can be used from main.rs
pub mod config;
pub mod error;
pub mod logging;

// MVC Architecture
pub mod controller;
pub mod model;
pub mod shader;
pub mod view;

pub use config::ViewerConfig;
pub use controller::Viewer;
pub use error::{ConfigError, ExportError, ModelError, ShaderError, ViewerError};
