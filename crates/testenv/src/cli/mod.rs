//! spanner-testenv cli definition and entrypoint.
mod db;
mod reap;
mod run;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spanner_testenv_core::{AdminService, BenchmarkConfig, IntegrationGate, TestEnvConfig};
use spanner_testenv_rest::{RestAdminClient, RestAdminConfig};

use crate::ux::present_warning;

/// spanner-testenv - disposable instances and databases for integration tests.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// YAML file with test environment settings.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Show verbose logs.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run COMMAND against a fresh database, exported as SPANNER_TEST_DSN.
    /// The database (and the instance, if it had to be created) is removed
    /// when COMMAND exits.
    Run {
        /// Schema applied when the database is created.
        #[arg(long)]
        ddl_file: Option<PathBuf>,
        /// Command and arguments to run, after `--`.
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Delete test instances older than the configured threshold.
    Reap {
        /// Only list what would be deleted.
        #[arg(long)]
        dry_run: bool,
    },
    /// Create the benchmark database unless it already exists.
    EnsureDb,
    /// Create a database from a full database path.
    CreateDb {
        /// projects/<project>/instances/<instance>/databases/<database>
        database: String,
        /// Schema statements separated by `;`.
        #[arg(long)]
        ddl_file: Option<PathBuf>,
        /// Serialized FileDescriptorSet for proto columns.
        #[arg(long)]
        proto_descriptors: Option<PathBuf>,
    },
    /// Apply schema statements to an existing database.
    UpdateDdl {
        /// projects/<project>/instances/<instance>/databases/<database>
        database: String,
        /// Schema statements separated by `;`.
        #[arg(long)]
        ddl_file: PathBuf,
        /// Serialized FileDescriptorSet for proto columns.
        #[arg(long)]
        proto_descriptors: Option<PathBuf>,
    },
}

/// Runs the parsed cli and returns the process exit code. Logging must
/// already be set up.
pub async fn run_app(cli: Cli) -> Result<i32> {
    let config = TestEnvConfig::load(cli.config.as_deref())
        .context("Failed to load test environment configuration")?;

    match &cli.command {
        Commands::Run { ddl_file, command } => {
            if let IntegrationGate::Skip(reason) = IntegrationGate::from_env() {
                present_warning(&reason);
                return run::run_child(command, None).await;
            }
            let service = admin_service(&config)?;
            run::execute(service, config, command, ddl_file.as_deref()).await
        }
        Commands::Reap { dry_run } => {
            let service = admin_service(&config)?;
            reap::execute(service.as_ref(), &config, *dry_run).await
        }
        Commands::EnsureDb => {
            let benchmark =
                BenchmarkConfig::from_env().context("Benchmark database is not configured")?;
            let service = admin_service(&config)?;
            db::ensure_db(service.as_ref(), &benchmark).await
        }
        Commands::CreateDb {
            database,
            ddl_file,
            proto_descriptors,
        } => {
            let service = admin_service(&config)?;
            db::create_db(
                service.as_ref(),
                database,
                ddl_file.as_deref(),
                proto_descriptors.as_deref(),
            )
            .await
        }
        Commands::UpdateDdl {
            database,
            ddl_file,
            proto_descriptors,
        } => {
            let service = admin_service(&config)?;
            db::update_ddl(
                service.as_ref(),
                database,
                ddl_file,
                proto_descriptors.as_deref(),
            )
            .await
        }
    }
}

fn admin_service(config: &TestEnvConfig) -> Result<Arc<dyn AdminService>> {
    let client = RestAdminClient::new(&RestAdminConfig::from_env(config.poll_interval()))
        .context("Failed to create admin client")?;
    Ok(Arc::new(client))
}
