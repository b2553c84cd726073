//! Creating instances and databases and waiting for them to become ready.
use std::collections::HashMap;

use tracing::{info, instrument, warn};

use crate::admin::{AdminError, AdminService};
use crate::error::{Stage, TestEnvError};
use crate::probe::{Probe, probe_database};
use crate::resource::{CreateDatabase, CreateInstance, DatabaseName, InstanceName, UpdateDdl};

/// Everything needed to create an instance.
#[derive(Debug, Clone)]
pub struct InstanceSpec {
    pub name: InstanceName,
    /// Short placement name such as `regional-us-east1`.
    pub config: String,
    pub node_count: u32,
    pub labels: HashMap<String, String>,
}

impl InstanceSpec {
    fn to_request(&self) -> CreateInstance {
        CreateInstance {
            name: self.name.clone(),
            config: format!(
                "projects/{}/instanceConfigs/{}",
                self.name.project(),
                self.config
            ),
            display_name: self.name.instance().to_string(),
            node_count: self.node_count,
            labels: self.labels.clone(),
        }
    }
}

/// Everything needed to create a database.
#[derive(Debug, Clone)]
pub struct DatabaseSpec {
    pub name: DatabaseName,
    pub statements: Vec<String>,
    pub proto_descriptors: Option<Vec<u8>>,
}

impl DatabaseSpec {
    pub fn new(name: DatabaseName) -> Self {
        Self {
            name,
            statements: Vec::new(),
            proto_descriptors: None,
        }
    }

    pub fn with_statements(mut self, statements: Vec<String>) -> Self {
        self.statements = statements;
        self
    }

    pub fn with_proto_descriptors(mut self, descriptors: Vec<u8>) -> Self {
        self.proto_descriptors = Some(descriptors);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    /// Someone else created the resource between our probe and our create.
    AlreadyExisted,
}

#[instrument(skip(service, spec), fields(instance = %spec.name))]
pub async fn provision_instance(
    service: &dyn AdminService,
    spec: &InstanceSpec,
) -> Result<Provisioned, TestEnvError> {
    let path = spec.name.to_string();
    info!("Creating instance {path} with config {}", spec.config);
    let submitted = service.create_instance(&spec.to_request()).await;
    let outcome = await_creation(service, submitted, &path).await?;
    if outcome == Provisioned::Created {
        info!("Created instance {path}");
    }
    Ok(outcome)
}

#[instrument(skip(service, spec), fields(database = %spec.name))]
pub async fn provision_database(
    service: &dyn AdminService,
    spec: &DatabaseSpec,
) -> Result<Provisioned, TestEnvError> {
    let path = spec.name.to_string();
    info!(
        "Creating database {path} with {} extra statements",
        spec.statements.len()
    );
    let request = CreateDatabase {
        create_statement: spec.name.create_statement(),
        extra_statements: spec.statements.clone(),
        proto_descriptors: spec.proto_descriptors.clone(),
    };
    let submitted = service.create_database(spec.name.instance(), &request).await;
    let outcome = await_creation(service, submitted, &path).await?;
    if outcome == Provisioned::Created {
        info!("Created database {path}");
    }
    Ok(outcome)
}

/// Creates the database only when it does not exist yet.
pub async fn ensure_database(
    service: &dyn AdminService,
    spec: &DatabaseSpec,
) -> Result<Provisioned, TestEnvError> {
    match probe_database(service, &spec.name).await? {
        Probe::Exists(_) => {
            info!("Database {} already exists", spec.name);
            Ok(Provisioned::AlreadyExisted)
        }
        Probe::Absent => provision_database(service, spec).await,
    }
}

/// Applies schema statements to an existing database and waits for them.
#[instrument(skip(service, statements, proto_descriptors), fields(database = %database))]
pub async fn update_database_ddl(
    service: &dyn AdminService,
    database: &DatabaseName,
    statements: Vec<String>,
    proto_descriptors: Option<Vec<u8>>,
) -> Result<(), TestEnvError> {
    let path = database.to_string();
    let request = UpdateDdl {
        statements,
        proto_descriptors,
    };
    let operation = service
        .update_database_ddl(database, &request)
        .await
        .map_err(|source| TestEnvError::Ddl {
            path: path.clone(),
            stage: Stage::Submit,
            source,
        })?;
    service
        .wait_operation(&operation)
        .await
        .map_err(|source| TestEnvError::Ddl {
            path: path.clone(),
            stage: Stage::Wait,
            source,
        })?;
    info!("Updated schema of {path}");
    Ok(())
}

async fn await_creation(
    service: &dyn AdminService,
    submitted: Result<crate::resource::Operation, AdminError>,
    path: &str,
) -> Result<Provisioned, TestEnvError> {
    let operation = match submitted {
        Ok(op) => op,
        Err(e) if e.is_already_exists() => {
            warn!("{path} was created concurrently, reusing it");
            return Ok(Provisioned::AlreadyExisted);
        }
        Err(source) => {
            return Err(TestEnvError::ProvisionFailed {
                path: path.to_string(),
                stage: Stage::Submit,
                source,
            });
        }
    };
    if operation.done {
        return Ok(Provisioned::Created);
    }
    match service.wait_operation(&operation).await {
        Ok(()) => Ok(Provisioned::Created),
        Err(e) if e.is_already_exists() => {
            warn!("{path} was created concurrently, reusing it");
            Ok(Provisioned::AlreadyExisted)
        }
        Err(source) => Err(TestEnvError::ProvisionFailed {
            path: path.to_string(),
            stage: Stage::Wait,
            source,
        }),
    }
}
