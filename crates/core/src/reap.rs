//! Deleting the run's own resources and stale leftovers.
//!
//! Nothing in here returns an error: a failed delete is logged and the
//! resource is left for a later sweep to pick up.
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::admin::{AdminError, AdminService};
use crate::error::TestEnvError;
use crate::resource::ManagedResource;
use crate::scan::scan_instances;

/// A resource the reaper knows how to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Instance(String),
    Database(String),
}

impl Target {
    pub fn path(&self) -> &str {
        match self {
            Target::Instance(path) | Target::Database(path) => path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Deleted,
    /// Someone else deleted it first.
    AlreadyGone,
    Failed,
}

#[derive(Debug, Default)]
pub struct ReapReport {
    /// Stale instances a dry run left in place.
    pub would_delete: Vec<String>,
    pub deleted: Vec<String>,
    pub already_gone: Vec<String>,
    pub failed: Vec<TestEnvError>,
}

impl ReapReport {
    fn push(&mut self, path: &str, result: Result<(), AdminError>) -> Deletion {
        match result {
            Ok(()) => {
                self.deleted.push(path.to_string());
                Deletion::Deleted
            }
            Err(e) if e.is_not_found() => {
                self.already_gone.push(path.to_string());
                Deletion::AlreadyGone
            }
            Err(source) => {
                self.failed.push(TestEnvError::TeardownFailed {
                    path: path.to_string(),
                    source,
                });
                Deletion::Failed
            }
        }
    }
}

async fn delete(service: &dyn AdminService, target: &Target) -> Result<(), AdminError> {
    match target {
        Target::Instance(path) => service.delete_instance(path).await,
        Target::Database(path) => service.drop_database(path).await,
    }
}

/// Deletes the resource created for this run.
#[instrument(skip(service))]
pub async fn reap_own(service: &dyn AdminService, target: &Target) -> Deletion {
    let path = target.path();
    match delete(service, target).await {
        Ok(()) => {
            info!("Deleted {path}");
            Deletion::Deleted
        }
        Err(e) if e.is_not_found() => {
            debug!("{path} was already deleted");
            Deletion::AlreadyGone
        }
        Err(source) => {
            let err = TestEnvError::TeardownFailed {
                path: path.to_string(),
                source,
            };
            warn!("{err}");
            Deletion::Failed
        }
    }
}

/// Deletes every given instance, continuing past failures.
pub async fn reap_stale(service: &dyn AdminService, stale: &[ManagedResource]) -> ReapReport {
    let mut report = ReapReport::default();
    for instance in stale {
        info!("Deleting stale test instance {}", instance.name);
        let result = service.delete_instance(&instance.name).await;
        match report.push(&instance.name, result) {
            Deletion::Deleted => {}
            Deletion::AlreadyGone => debug!("{} was already deleted", instance.name),
            Deletion::Failed => {
                if let Some(err) = report.failed.last() {
                    warn!("{err}");
                }
            }
        }
    }
    report
}

/// Options for a stale sweep over one project.
#[derive(Debug, Clone)]
pub struct Sweep {
    pub project: String,
    pub owner_label: String,
    pub stale_after: Duration,
    /// Only report what would be deleted.
    pub dry_run: bool,
}

/// Scans for stale instances and deletes them; best effort throughout.
#[instrument(skip(service, exclude), fields(project = %sweep.project))]
pub async fn sweep_stale(
    service: &dyn AdminService,
    sweep: &Sweep,
    now: DateTime<Utc>,
    exclude: Option<&str>,
) -> ReapReport {
    let outcome = scan_instances(
        service,
        &sweep.project,
        &sweep.owner_label,
        sweep.stale_after,
        now,
        exclude,
    )
    .await;
    let mut report = if sweep.dry_run {
        let mut report = ReapReport::default();
        for instance in outcome.stale {
            info!("Would delete stale test instance {}", instance.name);
            report.would_delete.push(instance.name);
        }
        report
    } else {
        reap_stale(service, &outcome.stale).await
    };
    if let Some(err) = outcome.error {
        report.failed.push(err);
    }
    report
}
