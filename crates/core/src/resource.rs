//! Resource paths and the resource model shared by the admin service contract.
use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ConfigError;

static DATABASE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^projects/([^/]+)/instances/([^/]+)/databases/([^/]+)$")
        .expect("database path pattern is valid")
});

static INSTANCE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^projects/([^/]+)/instances/([^/]+)$").expect("instance path pattern is valid")
});

/// Fully-qualified name of an instance: `projects/<project>/instances/<instance>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceName {
    project: String,
    instance: String,
}

impl InstanceName {
    pub fn new(project: &str, instance: &str) -> Self {
        Self {
            project: project.to_string(),
            instance: instance.to_string(),
        }
    }

    /// Parses `projects/<p>/instances/<i>`.
    pub fn parse(path: &str) -> Result<Self, ConfigError> {
        let caps = INSTANCE_PATH
            .captures(path)
            .ok_or_else(|| ConfigError::Invalid(format!("Invalid instance path {path}")))?;
        Ok(Self::new(&caps[1], &caps[2]))
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// The scope instances of this project are listed and created under.
    pub fn parent(&self) -> String {
        format!("projects/{}", self.project)
    }

    pub fn database(&self, database: &str) -> DatabaseName {
        DatabaseName {
            instance: self.clone(),
            database: database.to_string(),
        }
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/instances/{}", self.project, self.instance)
    }
}

/// Fully-qualified name of a database inside an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatabaseName {
    instance: InstanceName,
    database: String,
}

impl DatabaseName {
    pub fn new(project: &str, instance: &str, database: &str) -> Self {
        InstanceName::new(project, instance).database(database)
    }

    /// Parses `projects/<p>/instances/<i>/databases/<d>`.
    ///
    /// ```
    /// use spanner_testenv_core::resource::DatabaseName;
    ///
    /// let db = DatabaseName::parse("projects/p/instances/i/databases/d").unwrap();
    /// assert_eq!(db.database(), "d");
    /// assert_eq!(db.instance().to_string(), "projects/p/instances/i");
    /// ```
    pub fn parse(path: &str) -> Result<Self, ConfigError> {
        let caps = DATABASE_PATH
            .captures(path)
            .ok_or_else(|| ConfigError::Invalid(format!("Invalid database id {path}")))?;
        Ok(Self::new(&caps[1], &caps[2], &caps[3]))
    }

    pub fn instance(&self) -> &InstanceName {
        &self.instance
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Statement used to create this database.
    pub fn create_statement(&self) -> String {
        format!("CREATE DATABASE `{}`", self.database)
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/databases/{}", self.instance, self.database)
    }
}

/// A resource as reported by the admin service.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManagedResource {
    pub name: String,
    pub labels: HashMap<String, String>,
}

impl ManagedResource {
    pub fn new(name: &str, labels: HashMap<String, String>) -> Self {
        Self {
            name: name.to_string(),
            labels,
        }
    }

    /// Path of the scope the resource lives in (everything before the last
    /// two path segments).
    pub fn parent(&self) -> &str {
        let mut cut = self.name.len();
        for _ in 0..2 {
            match self.name[..cut].rfind('/') {
                Some(idx) => cut = idx,
                None => return "",
            }
        }
        &self.name[..cut]
    }
}

/// Handle to a long-running operation returned by create/update calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    /// Some services report completion inline for quick operations.
    pub done: bool,
}

impl Operation {
    pub fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            done: false,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` signals the end of the sequence.
    pub next_page_token: Option<String>,
}

/// Request body for creating an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateInstance {
    pub name: InstanceName,
    /// Fully-qualified placement, `projects/<p>/instanceConfigs/<config>`.
    pub config: String,
    pub display_name: String,
    pub node_count: u32,
    pub labels: HashMap<String, String>,
}

/// Request body for creating a database.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateDatabase {
    pub create_statement: String,
    pub extra_statements: Vec<String>,
    pub proto_descriptors: Option<Vec<u8>>,
}

/// Request body for a schema update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateDdl {
    pub statements: Vec<String>,
    pub proto_descriptors: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_name_display_and_parent() {
        let name = InstanceName::new("p1", "inst");
        assert_eq!(name.to_string(), "projects/p1/instances/inst");
        assert_eq!(name.parent(), "projects/p1");
    }

    #[test]
    fn test_database_name_parse_valid() {
        let db = DatabaseName::parse("projects/p/instances/i/databases/gotest-1").unwrap();
        assert_eq!(db.instance().project(), "p");
        assert_eq!(db.instance().instance(), "i");
        assert_eq!(db.database(), "gotest-1");
        assert_eq!(db.to_string(), "projects/p/instances/i/databases/gotest-1");
        assert_eq!(db.create_statement(), "CREATE DATABASE `gotest-1`");
    }

    #[test]
    fn test_database_name_parse_invalid() {
        let err = DatabaseName::parse("projects/p/instances/i").unwrap_err();
        assert!(err.to_string().contains("Invalid database id projects/p/instances/i"));
    }

    #[test]
    fn test_instance_name_parse() {
        let name = InstanceName::parse("projects/p/instances/i").unwrap();
        assert_eq!(name, InstanceName::new("p", "i"));
        assert!(InstanceName::parse("projects/p").is_err());
    }

    #[test]
    fn test_managed_resource_parent() {
        let res = ManagedResource::new("projects/p/instances/i", HashMap::new());
        assert_eq!(res.parent(), "projects/p");
        let db = ManagedResource::new("projects/p/instances/i/databases/d", HashMap::new());
        assert_eq!(db.parent(), "projects/p/instances/i");
        let bare = ManagedResource::new("orphan", HashMap::new());
        assert_eq!(bare.parent(), "");
    }
}
