//! Existence checks that tell "absent" apart from "the service is unhealthy".
use tracing::{debug, instrument};

use crate::admin::AdminService;
use crate::error::TestEnvError;
use crate::resource::{DatabaseName, InstanceName, ManagedResource};

#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    Exists(ManagedResource),
    Absent,
}

impl Probe {
    pub fn exists(&self) -> bool {
        matches!(self, Probe::Exists(_))
    }
}

#[instrument(skip(service), fields(instance = %name))]
pub async fn probe_instance(
    service: &dyn AdminService,
    name: &InstanceName,
) -> Result<Probe, TestEnvError> {
    let result = service.get_instance(name).await;
    classify(result, &name.to_string())
}

#[instrument(skip(service), fields(database = %name))]
pub async fn probe_database(
    service: &dyn AdminService,
    name: &DatabaseName,
) -> Result<Probe, TestEnvError> {
    let result = service.get_database(name).await;
    classify(result, &name.to_string())
}

fn classify(
    result: Result<ManagedResource, crate::admin::AdminError>,
    path: &str,
) -> Result<Probe, TestEnvError> {
    match result {
        Ok(resource) => {
            debug!("{path} exists");
            Ok(Probe::Exists(resource))
        }
        Err(e) if e.is_not_found() => {
            debug!("{path} does not exist");
            Ok(Probe::Absent)
        }
        Err(source) => Err(TestEnvError::ProbeFailed {
            path: path.to_string(),
            source,
        }),
    }
}
