//! Core domain types and traits for confit.
//!
//! This crate contains:
//! - Coordinates and derived identifiers (external ids, name-based UUIDs)
//! - The parameter model and configuration objects
//! - Remote types and the API catalog
//! - Resolved entities and the per-run entity map
//! - Remote-access collaborator traits
//! - The deployment error taxonomy

pub mod api;
pub mod client;
pub mod config;
pub mod coordinate;
pub mod entity;
pub mod error;
pub mod id;
pub mod parameter;

pub use config::{ConfigObject, RemoteType};
pub use coordinate::Coordinate;
pub use entity::{EntityMap, Properties, ResolvedEntity};
pub use error::{Error, Result};
pub use parameter::{Parameter, Parameters};
