//! Standalone database commands.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use spanner_testenv_core::provision::{
    DatabaseSpec, Provisioned, ensure_database, provision_database, update_database_ddl,
};
use spanner_testenv_core::resource::DatabaseName;
use spanner_testenv_core::{AdminService, BenchmarkConfig};

use crate::ux::OperationSpinner;

/// Splits a schema file into statements. `--` comment lines are dropped and
/// statements are separated by `;`.
pub fn split_statements(content: &str) -> Vec<String> {
    let without_comments = content
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    without_comments
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn read_statements(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read DDL file {}", path.display()))?;
    Ok(split_statements(&content))
}

fn read_descriptors(path: Option<&Path>) -> Result<Option<Vec<u8>>> {
    path.map(|p| {
        fs::read(p).with_context(|| format!("Failed to read proto descriptors {}", p.display()))
    })
    .transpose()
}

fn parse_database(path: &str) -> Result<DatabaseName> {
    DatabaseName::parse(path)
        .context("Expected projects/<project>/instances/<instance>/databases/<database>")
}

/// Creates the benchmark database unless it exists.
pub async fn ensure_db(service: &dyn AdminService, benchmark: &BenchmarkConfig) -> Result<i32> {
    let name = benchmark.database_name();
    let spinner = OperationSpinner::new(format!("Checking {name}"));
    let outcome = ensure_database(service, &DatabaseSpec::new(name.clone())).await;
    match &outcome {
        Ok(Provisioned::Created) => spinner.finish(format!("Created {name}")),
        Ok(Provisioned::AlreadyExisted) => spinner.finish(format!("{name} already exists")),
        Err(_) => spinner.clear(),
    }
    outcome?;
    println!("{name}");
    Ok(0)
}

pub async fn create_db(
    service: &dyn AdminService,
    database: &str,
    ddl_file: Option<&Path>,
    proto_descriptors: Option<&Path>,
) -> Result<i32> {
    let name = parse_database(database)?;
    let mut spec = DatabaseSpec::new(name.clone());
    if let Some(path) = ddl_file {
        spec = spec.with_statements(read_statements(path)?);
    }
    if let Some(descriptors) = read_descriptors(proto_descriptors)? {
        spec = spec.with_proto_descriptors(descriptors);
    }

    let spinner = OperationSpinner::new(format!("Creating {name}"));
    let outcome = provision_database(service, &spec).await;
    spinner.clear();
    match outcome? {
        Provisioned::Created => {
            println!("{name}");
            Ok(0)
        }
        Provisioned::AlreadyExisted => Err(anyhow::anyhow!("Database {name} already exists")),
    }
}

pub async fn update_ddl(
    service: &dyn AdminService,
    database: &str,
    ddl_file: &Path,
    proto_descriptors: Option<&Path>,
) -> Result<i32> {
    let name = parse_database(database)?;
    let statements = read_statements(ddl_file)?;
    let descriptors = read_descriptors(proto_descriptors)?;
    if statements.is_empty() {
        anyhow::bail!("No statements found in {}", ddl_file.display());
    }

    let spinner = OperationSpinner::new(format!("Updating schema of {name}"));
    let outcome = update_database_ddl(service, &name, statements, descriptors).await;
    spinner.clear();
    outcome?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spanner_testenv_core::AdminError;
    use spanner_testenv_core::testing::{Call, FakeAdmin};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file
    }

    #[test]
    fn test_split_statements() {
        let ddl = r#"
-- singers
CREATE TABLE Singers (
  SingerId INT64 NOT NULL,
) PRIMARY KEY (SingerId);

CREATE INDEX SingersById ON Singers(SingerId);
;
"#;
        let statements = split_statements(ddl);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE Singers ("));
        assert!(statements[0].ends_with("PRIMARY KEY (SingerId)"));
        assert_eq!(statements[1], "CREATE INDEX SingersById ON Singers(SingerId)");
    }

    #[test]
    fn test_split_statements_empty() {
        assert!(split_statements("  \n-- nothing here\n").is_empty());
    }

    #[test]
    fn test_parse_database_rejects_short_path() {
        let err = parse_database("projects/p/instances/i").unwrap_err();
        assert!(format!("{err:#}").contains("Invalid database id"));
    }

    fn benchmark() -> BenchmarkConfig {
        BenchmarkConfig {
            project_id: "p".to_string(),
            instance_id: "i".to_string(),
            database_id: "bench".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ensure_db_creates_missing_database() {
        let fake = FakeAdmin::new();
        fake.insert_instance("projects/p/instances/i", Default::default());

        ensure_db(&fake, &benchmark()).await.unwrap();

        assert!(fake.has_database("projects/p/instances/i/databases/bench"));
        assert_eq!(fake.count(Call::CreateDatabase), 1);
    }

    #[tokio::test]
    async fn test_ensure_db_keeps_existing_database() {
        let fake = FakeAdmin::new();
        fake.insert_instance("projects/p/instances/i", Default::default());
        fake.insert_database("projects/p/instances/i/databases/bench");

        ensure_db(&fake, &benchmark()).await.unwrap();

        assert_eq!(fake.count(Call::CreateDatabase), 0);
    }

    #[tokio::test]
    async fn test_create_db_with_ddl_and_descriptors() {
        let fake = FakeAdmin::new();
        fake.insert_instance("projects/p/instances/i", Default::default());
        let ddl = file_with(b"CREATE TABLE t (id INT64) PRIMARY KEY (id);");
        let descriptors = file_with(&[0x0a, 0x01]);

        let code = create_db(
            &fake,
            "projects/p/instances/i/databases/d",
            Some(ddl.path()),
            Some(descriptors.path()),
        )
        .await
        .unwrap();

        assert_eq!(code, 0);
        assert!(fake.has_database("projects/p/instances/i/databases/d"));
        assert_eq!(
            fake.ddl("projects/p/instances/i/databases/d"),
            vec!["CREATE TABLE t (id INT64) PRIMARY KEY (id)".to_string()]
        );
    }

    #[tokio::test]
    async fn test_create_db_fails_when_database_exists() {
        let fake = FakeAdmin::new();
        fake.insert_instance("projects/p/instances/i", Default::default());
        fake.insert_database("projects/p/instances/i/databases/d");

        let result = create_db(&fake, "projects/p/instances/i/databases/d", None, None).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_update_ddl_applies_statements() {
        let fake = FakeAdmin::new();
        fake.insert_database("projects/p/instances/i/databases/d");
        let ddl = file_with(b"ALTER TABLE t ADD COLUMN name STRING(MAX);");

        update_ddl(&fake, "projects/p/instances/i/databases/d", ddl.path(), None)
            .await
            .unwrap();

        assert_eq!(fake.count(Call::UpdateDdl), 1);
        assert_eq!(
            fake.ddl("projects/p/instances/i/databases/d"),
            vec!["ALTER TABLE t ADD COLUMN name STRING(MAX)".to_string()]
        );
    }

    #[tokio::test]
    async fn test_update_ddl_rejects_empty_file() {
        let fake = FakeAdmin::new();
        let ddl = file_with(b"-- nothing\n");

        let result = update_ddl(&fake, "projects/p/instances/i/databases/d", ddl.path(), None).await;

        assert!(result.is_err());
        assert_eq!(fake.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_ddl_reports_service_error() {
        let fake = FakeAdmin::new();
        fake.insert_database("projects/p/instances/i/databases/d");
        fake.fail_next(
            Call::UpdateDdl,
            AdminError::Status {
                code: "FAILED_PRECONDITION".to_string(),
                message: "table exists".to_string(),
            },
        );
        let ddl = file_with(b"CREATE TABLE t (id INT64) PRIMARY KEY (id)");

        let err = update_ddl(&fake, "projects/p/instances/i/databases/d", ddl.path(), None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Could not update schema"));
    }
}
