//! Error types for confit.

use std::time::Duration;

use thiserror::Error;

use crate::Coordinate;
use crate::client::RemoteError;

#[derive(Debug, Error)]
pub enum Error {
    /// The dependency graph is not acyclic. Aborts the run before any remote call.
    #[error("cyclic dependency detected: {}", format_cycles(.cycles))]
    CyclicDependency { cycles: Vec<Vec<Coordinate>> },

    #[error("config {config} cannot resolve reference to {target} (property `{property}`): {reason}")]
    UnresolvedReference {
        config: Coordinate,
        target: Coordinate,
        property: String,
        reason: String,
    },

    #[error("config {config} has the same name `{name}` as {existing} (api `{api}`)")]
    DuplicateIdentity {
        config: Coordinate,
        existing: Coordinate,
        api: String,
        name: String,
    },

    #[error("unknown remote type `{0}`")]
    UnknownRemoteType(String),

    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("payload rejected: {0}")]
    SchemaMismatch(String),

    #[error("deployment attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("missing parameter `{parameter}` in config {config}")]
    MissingParameter { config: Coordinate, parameter: String },

    #[error("environment variable `{0}` is not set")]
    MissingEnvironmentVariable(String),

    #[error("failed to render template: {0}")]
    Render(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("parameter `{0}` is reserved and cannot be defined by the user")]
    ReservedParameter(String),
}

impl Error {
    /// Whether this error aborts the whole run rather than a single config.
    pub fn is_graph_level(&self) -> bool {
        matches!(self, Error::CyclicDependency { .. })
    }
}

fn format_cycles(cycles: &[Vec<Coordinate>]) -> String {
    cycles
        .iter()
        .map(|cycle| {
            let mut names: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            // close the loop for readability: a -> b -> a
            if let Some(first) = cycle.first() {
                names.push(first.to_string());
            }
            names.join(" -> ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
