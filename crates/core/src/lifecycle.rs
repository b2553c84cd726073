//! Sets up a disposable instance and database for a test run and tears them
//! down afterwards.
//!
//! The instance is the long-lived parent: it is reused when it already
//! exists and only created (and later deleted, together with any stale
//! siblings) when it does not. The database is always created fresh under a
//! unique id and always dropped.
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::{info, instrument};

use crate::admin::{AdminError, AdminService};
use crate::cleanup::{CleanupHandle, CleanupStack};
use crate::config::TestEnvConfig;
use crate::error::{Stage, TestEnvError};
use crate::naming::{ownership_labels, unique_database_id};
use crate::probe::{Probe, probe_instance};
use crate::provision::{
    DatabaseSpec, InstanceSpec, Provisioned, provision_database, provision_instance,
};
use crate::reap::{Target, reap_own, sweep_stale};
use crate::resource::{DatabaseName, InstanceName};

/// Where the run's database lives.
#[derive(Debug, Clone, PartialEq)]
pub struct TestDatabase {
    pub instance: InstanceName,
    pub database: DatabaseName,
    /// Whether this run created the instance (and will delete it).
    pub instance_created: bool,
}

impl TestDatabase {
    /// Connection string understood by the database drivers.
    pub fn dsn(&self) -> String {
        self.database.to_string()
    }
}

/// A ready database plus the teardown that undoes everything `setup` did.
#[derive(Debug)]
pub struct TestContext {
    database: TestDatabase,
    cleanup: CleanupStack,
}

impl TestContext {
    pub fn database(&self) -> &TestDatabase {
        &self.database
    }

    pub fn dsn(&self) -> String {
        self.database.dsn()
    }

    pub fn instance(&self) -> &InstanceName {
        &self.database.instance
    }

    pub fn instance_created(&self) -> bool {
        self.database.instance_created
    }

    /// Paths that teardown will delete, in order.
    pub fn pending_cleanup(&self) -> Vec<&str> {
        self.cleanup.pending()
    }

    /// Drops the database, then deletes the instance if this run created it.
    /// Never fails; problems are logged.
    pub async fn teardown(mut self) {
        self.cleanup.run_all().await;
    }
}

pub struct TestEnv {
    service: Arc<dyn AdminService>,
    config: TestEnvConfig,
}

impl TestEnv {
    pub fn new(service: Arc<dyn AdminService>, config: TestEnvConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &TestEnvConfig {
        &self.config
    }

    /// Makes sure the instance exists and creates a fresh database in it,
    /// applying `statements` at creation time.
    ///
    /// Configuration problems are reported before the service is contacted.
    /// If anything fails after the instance was created, the instance is
    /// deleted again before the error is returned.
    #[instrument(skip_all, fields(project = %self.config.project_id, instance = %self.config.instance_id))]
    pub async fn setup(&self, statements: &[String]) -> Result<TestContext, TestEnvError> {
        self.config.validate()?;
        let now = Utc::now();
        let database_id = unique_database_id(&self.config.database_prefix, now)?;
        let instance = self.config.instance_name();

        let mut cleanup = CleanupStack::new();
        let instance_created = match self.prepare_instance(&instance, now, &mut cleanup).await {
            Ok(created) => created,
            Err(err) => {
                cleanup.run_all().await;
                return Err(err);
            }
        };

        let database = instance.database(&database_id);
        if let Err(err) = self.create_database(&database, statements).await {
            cleanup.run_all().await;
            return Err(err);
        }
        cleanup.push(CleanupHandle::delete(
            self.service.clone(),
            Target::Database(database.to_string()),
        ));

        info!("Test database {database} is ready");
        Ok(TestContext {
            database: TestDatabase {
                instance,
                database,
                instance_created,
            },
            cleanup,
        })
    }

    /// Runs `body` against a fresh database and tears everything down
    /// afterwards, also when `body` panics (the panic is resumed once
    /// teardown has finished).
    pub async fn run<F, Fut, T>(&self, statements: &[String], body: F) -> Result<T, TestEnvError>
    where
        F: FnOnce(TestDatabase) -> Fut,
        Fut: Future<Output = T>,
    {
        let context = self.setup(statements).await?;
        let result = AssertUnwindSafe(body(context.database().clone()))
            .catch_unwind()
            .await;
        context.teardown().await;
        match result {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn prepare_instance(
        &self,
        instance: &InstanceName,
        now: DateTime<Utc>,
        cleanup: &mut CleanupStack,
    ) -> Result<bool, TestEnvError> {
        if let Probe::Exists(_) = probe_instance(self.service.as_ref(), instance).await? {
            info!("Using existing instance {instance}");
            return Ok(false);
        }

        let spec = InstanceSpec {
            name: instance.clone(),
            config: self.config.instance_config.clone(),
            node_count: self.config.node_count,
            labels: ownership_labels(&self.config.owner_label, now),
        };
        match provision_instance(self.service.as_ref(), &spec).await? {
            Provisioned::Created => {
                cleanup.push(self.instance_cleanup(instance));
                Ok(true)
            }
            Provisioned::AlreadyExisted => Ok(false),
        }
    }

    async fn create_database(
        &self,
        database: &DatabaseName,
        statements: &[String],
    ) -> Result<(), TestEnvError> {
        let spec = DatabaseSpec::new(database.clone()).with_statements(statements.to_vec());
        match provision_database(self.service.as_ref(), &spec).await? {
            Provisioned::Created => Ok(()),
            // The id is unique per run, so an existing database belongs to
            // somebody else and must not be used or dropped.
            Provisioned::AlreadyExisted => Err(TestEnvError::ProvisionFailed {
                path: database.to_string(),
                stage: Stage::Submit,
                source: AdminError::AlreadyExists(database.to_string()),
            }),
        }
    }

    /// Deletes the instance, then removes stale instances left by other runs.
    fn instance_cleanup(&self, instance: &InstanceName) -> CleanupHandle {
        let service = self.service.clone();
        let target = Target::Instance(instance.to_string());
        let sweep = self.config.sweep(false);
        CleanupHandle::new(&instance.to_string(), move || async move {
            reap_own(service.as_ref(), &target).await;
            let report =
                sweep_stale(service.as_ref(), &sweep, Utc::now(), Some(target.path())).await;
            if !report.deleted.is_empty() {
                info!("Deleted {} stale test instances", report.deleted.len());
            }
        })
    }
}
