//! Deploy strategies for confit.
//!
//! Provides:
//! - Strategy selection per remote type ([`DeployStrategy`])
//! - Name-keyed and non-unique-name upserts for classic APIs
//! - External-id correlated upserts for SLOs and settings
//! - A synthetic client for dry runs
//! - An in-memory remote for tests

pub mod classic;
pub mod dry_run;
pub mod external;
pub mod memory;
pub mod strategy;

pub use dry_run::DryRunClient;
pub use memory::{CallCounts, InMemoryRemote};
pub use strategy::{DeployStrategy, Deployer};

pub use confit_core::client::{ClassicClient, ObjectSource, RemoteError};
