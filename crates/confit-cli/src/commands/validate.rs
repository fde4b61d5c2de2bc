//! Dry-run deployment command.

use anyhow::{Context, Result};
use confit_deployer::Deployer;
use confit_scheduler::{
    ConfigState, DeployEvent, DeployOrchestrator, FileRecorder, NoopRecorder, Recorder,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{load_objects, load_settings};

/// Deploy every config against the dry-run client.
pub async fn run(
    objects_path: &Path,
    settings_path: Option<&Path>,
    report: Option<PathBuf>,
) -> Result<()> {
    let objects = load_objects(objects_path)?;
    let mut settings = load_settings(settings_path)?;
    if report.is_some() {
        settings.report_path = report;
    }

    println!("Validating {} configs", objects.len());

    let recorder: Arc<dyn Recorder> = match &settings.report_path {
        Some(path) => {
            println!("Report: {}", path.display());
            Arc::new(
                FileRecorder::open(path)
                    .with_context(|| format!("Failed to open report: {}", path.display()))?,
            )
        }
        None => Arc::new(NoopRecorder),
    };

    let deployer = Deployer::dry_run(settings.apis.clone());
    let orchestrator = DeployOrchestrator::new(deployer, settings).with_recorder(recorder);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight deployments");
            on_signal.cancel();
        }
    });

    let (mut rx, result_handle) = orchestrator.execute(objects, cancel);

    while let Some(event) = rx.recv().await {
        match event {
            DeployEvent::LayerStarted { index, configs } => {
                println!("\n▶ Layer {} ({} configs)", index, configs.len());
            }
            DeployEvent::ConfigStarted { .. } => {}
            DeployEvent::ConfigCompleted { coordinate, state } => match state {
                ConfigState::Deployed => println!("  ✓ {}", coordinate),
                ConfigState::Failed { message } => println!("  ✗ {}: {}", coordinate, message),
                ConfigState::Excluded => println!("  ⊘ {} excluded", coordinate),
                ConfigState::Skipped { reason } => {
                    println!("  ⊘ {} skipped: {}", coordinate, reason)
                }
                ConfigState::Pending | ConfigState::Deploying => {}
            },
            DeployEvent::RunCompleted { success } => {
                if success {
                    println!("\n--- Validation completed successfully ---");
                } else {
                    println!("\n--- Validation failed ---");
                }
            }
        }
    }

    let result = result_handle
        .await
        .context("Deployment task failed")??;

    println!("{}", result.summary());
    if result.cancelled {
        anyhow::bail!("Validation cancelled");
    }
    if !result.success {
        anyhow::bail!("{} configs failed", result.summary().failed);
    }
    Ok(())
}
