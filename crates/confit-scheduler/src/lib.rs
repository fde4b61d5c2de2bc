//! Deployment scheduling for confit.
//!
//! Builds the dependency graph of a set of configs, deploys it layer by layer
//! with bounded concurrency, and records the outcome of every config.

pub mod graph;
pub mod orchestrator;
pub mod report;

pub use graph::DependencyGraph;
pub use orchestrator::{ConfigState, DeployEvent, DeployOrchestrator, DeployResult, RunSummary};
pub use report::{
    FileRecorder, MemoryRecorder, NoopRecorder, Record, RecordState, Recorder, ReportError,
    read_records, read_report,
};
