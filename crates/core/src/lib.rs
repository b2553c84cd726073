//! Disposable instances and databases for integration tests.
//!
//! [`lifecycle::TestEnv`] is the entry point: it probes for the test
//! instance, creates it when missing, creates a fresh database for the run
//! and hands back a [`lifecycle::TestContext`] whose teardown removes
//! everything again, sweeping up instances abandoned by earlier runs on the
//! way out.
pub mod admin;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod naming;
pub mod probe;
pub mod provision;
pub mod reap;
pub mod resource;
pub mod scan;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::admin::{AdminError, AdminService};
pub use crate::config::{BenchmarkConfig, ConfigError, IntegrationGate, TestEnvConfig};
pub use crate::error::TestEnvError;
pub use crate::lifecycle::{TestContext, TestDatabase, TestEnv};
