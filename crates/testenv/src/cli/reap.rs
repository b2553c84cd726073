use anyhow::Result;
use chrono::Utc;
use spanner_testenv_core::reap::sweep_stale;
use spanner_testenv_core::{AdminService, TestEnvConfig};

use crate::ux::present_warning;

/// One stale sweep over the configured project. Prints the affected
/// instance paths; exits with 1 when anything could not be listed or
/// deleted.
pub async fn execute(
    service: &dyn AdminService,
    config: &TestEnvConfig,
    dry_run: bool,
) -> Result<i32> {
    config.validate()?;

    let report = sweep_stale(service, &config.sweep(dry_run), Utc::now(), None).await;
    let affected = if dry_run {
        &report.would_delete
    } else {
        &report.deleted
    };
    for path in affected {
        println!("{path}");
    }
    for err in &report.failed {
        present_warning(&err.to_string());
    }
    Ok(if report.failed.is_empty() { 0 } else { 1 })
}
