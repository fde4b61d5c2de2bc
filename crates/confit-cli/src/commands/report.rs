//! Report summary command.

use anyhow::{Context, Result};
use confit_scheduler::{Record, RecordState, read_report};
use std::path::Path;

/// Record counts per state.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReportCounts {
    pub success: usize,
    pub error: usize,
    pub excluded: usize,
    pub skipped: usize,
}

impl ReportCounts {
    pub fn from_records(records: &[Record]) -> Self {
        let mut counts = Self::default();
        for record in records {
            match record.state {
                RecordState::Success => counts.success += 1,
                RecordState::Error => counts.error += 1,
                RecordState::Excluded => counts.excluded += 1,
                RecordState::Skipped => counts.skipped += 1,
            }
        }
        counts
    }
}

/// Print counts per state and every error record of a report file.
pub fn run(path: &Path) -> Result<()> {
    let records = read_report(path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;

    let counts = ReportCounts::from_records(&records);
    println!("{} records", records.len());
    println!("  success:  {}", counts.success);
    println!("  error:    {}", counts.error);
    println!("  excluded: {}", counts.excluded);
    println!("  skipped:  {}", counts.skipped);

    let errors: Vec<_> = records
        .iter()
        .filter(|r| r.state == RecordState::Error)
        .collect();
    if !errors.is_empty() {
        println!("\nErrors:");
        for record in errors {
            println!(
                "  {} {}: {}",
                record.time.format("%Y-%m-%dT%H:%M:%SZ"),
                record.config,
                record.error.as_deref().unwrap_or("unknown error")
            );
            for detail in &record.details {
                println!("    {}: {}", detail.detail_type, detail.message);
            }
        }
    }
    Ok(())
}
