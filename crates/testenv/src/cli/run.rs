use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use spanner_testenv_core::config::ENV_TEST_DSN;
use spanner_testenv_core::{AdminService, TestEnv, TestEnvConfig};
use tokio::process::Command;
use tracing::{info, warn};

use super::db::read_statements;

/// Runs `command` inside a full setup/teardown cycle and returns its exit
/// code.
pub async fn execute(
    service: Arc<dyn AdminService>,
    config: TestEnvConfig,
    command: &[String],
    ddl_file: Option<&Path>,
) -> Result<i32> {
    let statements = match ddl_file {
        Some(path) => read_statements(path)?,
        None => Vec::new(),
    };
    let env = TestEnv::new(service, config);
    env.run(&statements, |db| async move {
        let dsn = db.dsn();
        eprintln!("{ENV_TEST_DSN}={dsn}");
        run_child(command, Some(&dsn)).await
    })
    .await
    .context("Failed to set up test database")?
}

/// Spawns `command`, optionally with the DSN exported, and waits for it.
/// An interrupt is left to the child; the wait continues so that teardown
/// can run afterwards.
pub async fn run_child(command: &[String], dsn: Option<&str>) -> Result<i32> {
    let (program, args) = command.split_first().context("No command given")?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    match dsn {
        Some(dsn) => cmd.env(ENV_TEST_DSN, dsn),
        None => cmd.env_remove(ENV_TEST_DSN),
    };

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to start {program}"))?;
    let status = tokio::select! {
        status = child.wait() => status,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, waiting for {program} to exit");
            child.wait().await
        }
    }
    .with_context(|| format!("Failed to wait for {program}"))?;

    info!("{program} exited with {status}");
    // Killed by a signal.
    Ok(status.code().unwrap_or(1))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use spanner_testenv_core::testing::{Call, FakeAdmin};
    use std::io::Write;

    fn config() -> TestEnvConfig {
        TestEnvConfig {
            project_id: "p".to_string(),
            instance_id: "i".to_string(),
            ..Default::default()
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_run_child_returns_exit_code() {
        assert_eq!(run_child(&sh("exit 3"), None).await.unwrap(), 3);
        assert_eq!(run_child(&sh("true"), None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_child_without_dsn_clears_inherited_value() {
        unsafe {
            std::env::set_var(ENV_TEST_DSN, "projects/p/instances/i/databases/stale");
        }

        let code = run_child(&sh(r#"test -z "$SPANNER_TEST_DSN" || exit 9"#), None).await;

        unsafe {
            std::env::remove_var(ENV_TEST_DSN);
        }
        assert_eq!(code.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_child_missing_program() {
        let err = run_child(&["definitely-not-a-real-program".to_string()], None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to start"));
    }

    #[tokio::test]
    async fn test_execute_exports_dsn_and_tears_down() {
        let fake = Arc::new(FakeAdmin::new());

        let code = execute(
            fake.clone(),
            config(),
            &sh(r#"case "$SPANNER_TEST_DSN" in projects/p/instances/i/databases/gotest-*) exit 0;; *) exit 7;; esac"#),
            None,
        )
        .await
        .unwrap();

        assert_eq!(code, 0);
        assert_eq!(fake.count(Call::CreateDatabase), 1);
        assert!(fake.database_names().is_empty());
        assert!(!fake.has_instance("projects/p/instances/i"));
    }

    #[tokio::test]
    async fn test_execute_applies_ddl_file_and_passes_failure_through() {
        let fake = Arc::new(FakeAdmin::new());
        fake.insert_instance("projects/p/instances/i", Default::default());
        let mut ddl = tempfile::NamedTempFile::new().unwrap();
        writeln!(ddl, "CREATE TABLE a (id INT64) PRIMARY KEY (id);").unwrap();

        let code = execute(fake.clone(), config(), &sh("exit 2"), Some(ddl.path()))
            .await
            .unwrap();

        assert_eq!(code, 2);
        assert_eq!(fake.count(Call::DropDatabase), 1);
        assert!(fake.has_instance("projects/p/instances/i"));
    }
}
