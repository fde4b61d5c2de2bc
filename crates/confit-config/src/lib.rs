//! Parameter resolution, rendering and engine configuration for confit.
//!
//! This crate handles:
//! - Resolving typed parameters into concrete properties
//! - Rendering payload templates
//! - Engine settings and the API catalog (confit.kdl)

pub mod error;
pub mod resolve;
pub mod settings;
pub mod template;

pub use error::{ConfigError, ConfigResult};
pub use resolve::Resolver;
pub use settings::{EngineSettings, parse_engine_settings};
pub use template::{InterpolatingRenderer, Renderer};
