use std::fmt;

use thiserror::Error;

use crate::admin::AdminError;
use crate::config::ConfigError;

/// Where a provisioning or DDL request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The request was rejected before an operation was started.
    Submit,
    /// The operation started but finished with an error.
    Wait,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Submit => write!(f, "could not submit request"),
            Stage::Wait => write!(f, "waiting for operation to finish failed"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TestEnvError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Could not check whether {path} exists: {source}")]
    ProbeFailed { path: String, source: AdminError },
    #[error("Could not create {path}, {stage}: {source}")]
    ProvisionFailed {
        path: String,
        stage: Stage,
        source: AdminError,
    },
    #[error("Could not update schema of {path}, {stage}: {source}")]
    Ddl {
        path: String,
        stage: Stage,
        source: AdminError,
    },
    #[error("Could not delete {path}: {source}")]
    TeardownFailed { path: String, source: AdminError },
    #[error("Failed to fetch resources under {parent}: {source}")]
    ScanFailed { parent: String, source: AdminError },
}
