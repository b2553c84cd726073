//! The admin service contract the lifecycle code drives.
//!
//! Implementations live outside this crate (see `spanner-testenv-rest`); the
//! lifecycle modules only ever talk to `dyn AdminService`.
use async_trait::async_trait;
use thiserror::Error;

use crate::resource::{
    CreateDatabase, CreateInstance, DatabaseName, InstanceName, ManagedResource, Operation, Page,
    UpdateDdl,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdminError {
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),
    #[error("Service returned {code}: {message}")]
    Status { code: String, message: String },
    #[error("Operation {name} failed with code {code}: {message}")]
    OperationFailed {
        name: String,
        code: i32,
        message: String,
    },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl AdminError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AdminError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, AdminError::AlreadyExists(_))
    }
}

/// Instance and database administration calls.
///
/// Create and update calls return an [`Operation`] which must be passed to
/// [`AdminService::wait_operation`] before the resource can be used.
#[async_trait]
pub trait AdminService: Send + Sync {
    async fn get_instance(&self, name: &InstanceName) -> Result<ManagedResource, AdminError>;

    async fn create_instance(&self, request: &CreateInstance) -> Result<Operation, AdminError>;

    /// Lists instances under `projects/<project>` matching `filter`.
    async fn list_instances(
        &self,
        project: &str,
        filter: &str,
        page_token: Option<&str>,
    ) -> Result<Page<ManagedResource>, AdminError>;

    async fn delete_instance(&self, name: &str) -> Result<(), AdminError>;

    async fn get_database(&self, name: &DatabaseName) -> Result<ManagedResource, AdminError>;

    async fn create_database(
        &self,
        instance: &InstanceName,
        request: &CreateDatabase,
    ) -> Result<Operation, AdminError>;

    async fn update_database_ddl(
        &self,
        database: &DatabaseName,
        request: &UpdateDdl,
    ) -> Result<Operation, AdminError>;

    async fn drop_database(&self, name: &str) -> Result<(), AdminError>;

    /// Blocks until the operation completes; the error of a failed operation
    /// is returned as-is.
    async fn wait_operation(&self, operation: &Operation) -> Result<(), AdminError>;
}
