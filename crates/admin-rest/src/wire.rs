//! JSON shapes of the admin REST API and how its errors map onto
//! [`AdminError`].
use std::collections::HashMap;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use spanner_testenv_core::AdminError;
use spanner_testenv_core::resource::ManagedResource;

/// gRPC status codes carried in operation errors.
const CODE_NOT_FOUND: i32 = 5;
const CODE_ALREADY_EXISTS: i32 = 6;

#[derive(Deserialize, Debug)]
pub(crate) struct ResourceJson {
    name: String,
    #[serde(default)]
    labels: HashMap<String, String>,
}

impl From<ResourceJson> for ManagedResource {
    fn from(r: ResourceJson) -> Self {
        ManagedResource {
            name: r.name,
            labels: r.labels,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListInstancesResponse {
    #[serde(default)]
    pub instances: Vec<ResourceJson>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstanceBody<'a> {
    pub name: String,
    pub config: &'a str,
    pub display_name: &'a str,
    pub node_count: u32,
    pub labels: &'a HashMap<String, String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateInstanceBody<'a> {
    pub instance_id: &'a str,
    pub instance: InstanceBody<'a>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateDatabaseBody<'a> {
    pub create_statement: &'a str,
    #[serde(skip_serializing_if = "no_statements")]
    pub extra_statements: &'a [String],
    /// Serialized `FileDescriptorSet`, base64 encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proto_descriptors: Option<String>,
}

fn no_statements(statements: &&[String]) -> bool {
    statements.is_empty()
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateDdlBody<'a> {
    pub statements: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proto_descriptors: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct StatusJson {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct OperationJson {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<StatusJson>,
}

impl OperationJson {
    /// `Ok(done)` for a running or successful operation, the mapped error
    /// for a failed one.
    pub fn outcome(self) -> Result<bool, AdminError> {
        match self.error {
            Some(status) if self.done => Err(operation_error(&self.name, status)),
            _ => Ok(self.done),
        }
    }
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: StatusJson,
}

fn operation_error(name: &str, status: StatusJson) -> AdminError {
    match status.code {
        CODE_NOT_FOUND => AdminError::NotFound(status.message),
        CODE_ALREADY_EXISTS => AdminError::AlreadyExists(status.message),
        code => AdminError::OperationFailed {
            name: name.to_string(),
            code,
            message: status.message,
        },
    }
}

/// Maps a non-success HTTP response onto an [`AdminError`].
pub(crate) fn status_error(http: StatusCode, body: &str) -> AdminError {
    let status = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| StatusJson {
            code: i32::from(http.as_u16()),
            message: body.to_string(),
            status: None,
        });
    let code = status
        .status
        .clone()
        .unwrap_or_else(|| http.as_u16().to_string());
    match (http, code.as_str()) {
        (StatusCode::NOT_FOUND, _) | (_, "NOT_FOUND") => AdminError::NotFound(status.message),
        (StatusCode::CONFLICT, _) | (_, "ALREADY_EXISTS") => {
            AdminError::AlreadyExists(status.message)
        }
        _ => AdminError::Status {
            code,
            message: status.message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_error_not_found() {
        let body = json!({
            "error": {"code": 404, "message": "Instance not found: projects/p/instances/i", "status": "NOT_FOUND"}
        })
        .to_string();
        let err = status_error(StatusCode::NOT_FOUND, &body);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_status_error_already_exists_by_status_field() {
        let body = json!({
            "error": {"code": 409, "message": "exists", "status": "ALREADY_EXISTS"}
        })
        .to_string();
        assert!(status_error(StatusCode::CONFLICT, &body).is_already_exists());
    }

    #[test]
    fn test_status_error_plain_body() {
        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        assert_eq!(
            err,
            AdminError::Status {
                code: "500".to_string(),
                message: "Internal Server Error".to_string()
            }
        );
    }

    #[test]
    fn test_operation_outcome() {
        let running: OperationJson =
            serde_json::from_value(json!({"name": "op/1"})).unwrap();
        assert_eq!(running.outcome(), Ok(false));

        let failed: OperationJson = serde_json::from_value(json!({
            "name": "op/1", "done": true, "error": {"code": 8, "message": "quota"}
        }))
        .unwrap();
        assert_eq!(
            failed.outcome(),
            Err(AdminError::OperationFailed {
                name: "op/1".to_string(),
                code: 8,
                message: "quota".to_string()
            })
        );

        let raced: OperationJson = serde_json::from_value(json!({
            "name": "op/1", "done": true, "error": {"code": 6, "message": "exists"}
        }))
        .unwrap();
        assert!(raced.outcome().unwrap_err().is_already_exists());
    }

    #[test]
    fn test_create_database_body_omits_empty_fields() {
        let body = CreateDatabaseBody {
            create_statement: "CREATE DATABASE `d`",
            extra_statements: &[],
            proto_descriptors: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"createStatement": "CREATE DATABASE `d`"})
        );
    }
}
