//! Test environment configuration.
//!
//! Values come from built-in defaults, then an optional YAML file, then the
//! process environment. Defaults make the suite runnable against an
//! emulator without any setup; a variable that is set but empty is taken
//! as-is and rejected by [`TestEnvConfig::validate`].
use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::reap::Sweep;
use crate::resource::{DatabaseName, InstanceName};

pub const ENV_PROJECT: &str = "SPANNER_TEST_PROJECT";
pub const ENV_INSTANCE: &str = "SPANNER_TEST_INSTANCE";
pub const ENV_DATABASE_PREFIX: &str = "SPANNER_TEST_DBID";
pub const ENV_NODE_COUNT: &str = "SPANNER_TEST_NODE_COUNT";
pub const ENV_OWNER_LABEL: &str = "SPANNER_TEST_OWNER_LABEL";
pub const ENV_STALE_AFTER_SECS: &str = "SPANNER_TEST_STALE_AFTER_SECS";
pub const ENV_POLL_INTERVAL_MS: &str = "SPANNER_TEST_POLL_INTERVAL_MS";
pub const ENV_SHORT: &str = "SPANNER_TEST_SHORT";
pub const ENV_EMULATOR_HOST: &str = "SPANNER_EMULATOR_HOST";
pub const ENV_ACCESS_TOKEN: &str = "SPANNER_ACCESS_TOKEN";
pub const ENV_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Exported to child processes started by the command line.
pub const ENV_TEST_DSN: &str = "SPANNER_TEST_DSN";
pub const ENV_BENCHMARK_PROJECT: &str = "BENCHMARK_PROJECT_ID";
pub const ENV_BENCHMARK_INSTANCE: &str = "BENCHMARK_INSTANCE_ID";
pub const ENV_BENCHMARK_DATABASE: &str = "BENCHMARK_DATABASE_ID";

/// Placement used when the emulator is the target.
pub const EMULATOR_INSTANCE_CONFIG: &str = "emulator-config";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File system error: {0}")]
    IO(#[from] std::io::Error),
    #[error("YAML parsing error: {0}")]
    YAMLError(#[from] serde_yaml::Error),
    #[error("Missing {0}")]
    Missing(String),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TestEnvConfig {
    pub project_id: String,
    pub instance_id: String,
    pub database_prefix: String,
    pub instance_config: String,
    pub node_count: u32,
    pub owner_label: String,
    pub stale_after_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for TestEnvConfig {
    fn default() -> Self {
        Self {
            project_id: "test-project".to_string(),
            instance_id: "test-instance".to_string(),
            database_prefix: "gotest".to_string(),
            instance_config: "regional-us-east1".to_string(),
            node_count: 1,
            owner_label: "gogormtestinstance".to_string(),
            stale_after_secs: 2 * 60 * 60,
            poll_interval_ms: 500,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key} must be a number, got '{value}'")))
}

impl TestEnvConfig {
    /// Defaults, then `path` (when given), then the process environment.
    #[instrument(skip(path))]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`TestEnvConfig::load`] with an explicit environment lookup.
    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                serde_yaml::from_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup(ENV_PROJECT) {
            self.project_id = v;
        }
        if let Some(v) = lookup(ENV_INSTANCE) {
            self.instance_id = v;
        }
        if let Some(v) = lookup(ENV_DATABASE_PREFIX) {
            self.database_prefix = v;
        }
        if let Some(v) = lookup(ENV_OWNER_LABEL) {
            self.owner_label = v;
        }
        if let Some(v) = lookup(ENV_NODE_COUNT) {
            self.node_count = parse_number(ENV_NODE_COUNT, &v)?;
        }
        if let Some(v) = lookup(ENV_STALE_AFTER_SECS) {
            self.stale_after_secs = parse_number(ENV_STALE_AFTER_SECS, &v)?;
        }
        if let Some(v) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = parse_number(ENV_POLL_INTERVAL_MS, &v)?;
        }
        if lookup(ENV_EMULATOR_HOST).is_some() {
            self.instance_config = EMULATOR_INSTANCE_CONFIG.to_string();
        }
        Ok(())
    }

    /// Checks that every identifier needed to name resources is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (&self.project_id, "project identifier", ENV_PROJECT),
            (&self.instance_id, "instance identifier", ENV_INSTANCE),
            (&self.database_prefix, "database identifier", ENV_DATABASE_PREFIX),
            (&self.owner_label, "ownership label", ENV_OWNER_LABEL),
            (&self.instance_config, "instance config", "instance_config"),
        ];
        for (value, what, key) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(format!("{what} ({key})")));
            }
        }
        if self.node_count == 0 {
            return Err(ConfigError::Invalid(
                "node_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn instance_name(&self) -> InstanceName {
        InstanceName::new(&self.project_id, &self.instance_id)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sweep(&self, dry_run: bool) -> Sweep {
        Sweep {
            project: self.project_id.clone(),
            owner_label: self.owner_label.clone(),
            stale_after: self.stale_after(),
            dry_run,
        }
    }
}

/// Fixed database used by benchmarks. Every identifier is required.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkConfig {
    pub project_id: String,
    pub instance_id: String,
    pub database_id: String,
}

impl BenchmarkConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::Missing(key.to_string()))
        };
        Ok(Self {
            project_id: required(ENV_BENCHMARK_PROJECT)?,
            instance_id: required(ENV_BENCHMARK_INSTANCE)?,
            database_id: required(ENV_BENCHMARK_DATABASE)?,
        })
    }

    pub fn database_name(&self) -> DatabaseName {
        DatabaseName::new(&self.project_id, &self.instance_id, &self.database_id)
    }
}

/// Whether integration tests can run in this environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationGate {
    Run,
    Skip(String),
}

impl IntegrationGate {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        if lookup(ENV_SHORT).is_some() {
            return IntegrationGate::Skip("Integration tests skipped in short mode".to_string());
        }
        let has_credentials =
            lookup(ENV_ACCESS_TOKEN).is_some() || lookup(ENV_CREDENTIALS).is_some();
        let has_emulator = lookup(ENV_EMULATOR_HOST).is_some();
        if !(has_credentials || has_emulator) {
            return IntegrationGate::Skip(
                "Skipping integration tests as no credentials and no emulator host has been set"
                    .to_string(),
            );
        }
        IntegrationGate::Run
    }
}
