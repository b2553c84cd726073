//! [`AdminService`] over the instance/database admin REST API.
//!
//! Talks to the production endpoint or, when `SPANNER_EMULATOR_HOST` is set,
//! to the emulator's REST gateway.
mod wire;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use spanner_testenv_core::config::{ENV_ACCESS_TOKEN, ENV_EMULATOR_HOST};
use spanner_testenv_core::resource::{
    CreateDatabase, CreateInstance, DatabaseName, InstanceName, ManagedResource, Operation, Page,
    UpdateDdl,
};
use spanner_testenv_core::{AdminError, AdminService};
use tracing::debug;
use url::Url;

use crate::wire::{
    CreateDatabaseBody, CreateInstanceBody, InstanceBody, ListInstancesResponse, OperationJson,
    ResourceJson, UpdateDdlBody, status_error,
};

pub const DEFAULT_ENDPOINT: &str = "https://spanner.googleapis.com/";

#[derive(Debug, Clone, PartialEq)]
pub struct RestAdminConfig {
    /// Scheme and host; the `v1/` prefix is added per request.
    pub endpoint: String,
    pub access_token: Option<String>,
    pub poll_interval: Duration,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
}

impl Default for RestAdminConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_token: None,
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RestAdminConfig {
    pub fn from_env(poll_interval: Duration) -> Self {
        Self::from_lookup(poll_interval, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(poll_interval: Duration, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let endpoint = match lookup(ENV_EMULATOR_HOST).filter(|h| !h.is_empty()) {
            Some(host) => format!("http://{host}/"),
            None => DEFAULT_ENDPOINT.to_string(),
        };
        Self {
            endpoint,
            access_token: lookup(ENV_ACCESS_TOKEN).filter(|t| !t.is_empty()),
            poll_interval,
            ..Default::default()
        }
    }
}

/// REST implementation of the admin service contract.
#[derive(Debug)]
pub struct RestAdminClient {
    base_url: Url,
    client: Client,
    access_token: Option<String>,
    poll_interval: Duration,
}

impl RestAdminClient {
    pub fn new(config: &RestAdminConfig) -> Result<Self> {
        let mut endpoint = config.endpoint.clone();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        let base_url = Url::parse(&endpoint)
            .with_context(|| format!("Invalid admin endpoint: {}", config.endpoint))?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url,
            client,
            access_token: config.access_token.clone(),
            poll_interval: config.poll_interval,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, AdminError> {
        let url = self
            .base_url
            .join(&format!("v1/{path}"))
            .map_err(|e| AdminError::Transport(format!("Invalid resource path {path}: {e}")))?;
        debug!("{method} {url}");
        let builder = self.client.request(method, url);
        Ok(match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, AdminError> {
        let response = builder
            .send()
            .await
            .map_err(|e| AdminError::Transport(e.to_string()))?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(status_error(status, &body))
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, AdminError> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|e| AdminError::Decode(e.to_string()))
    }

    async fn get_resource(&self, path: &str) -> Result<ManagedResource, AdminError> {
        let resource: ResourceJson = self.json(self.request(Method::GET, path)?).await?;
        Ok(resource.into())
    }

    async fn delete(&self, path: &str) -> Result<(), AdminError> {
        self.send(self.request(Method::DELETE, path)?).await?;
        Ok(())
    }

    async fn operation(&self, builder: RequestBuilder) -> Result<Operation, AdminError> {
        let op: OperationJson = self.json(builder).await?;
        let name = op.name.clone();
        let done = op.outcome()?;
        Ok(Operation { name, done })
    }
}

fn encode_descriptors(descriptors: &Option<Vec<u8>>) -> Option<String> {
    descriptors.as_ref().map(|bytes| STANDARD.encode(bytes))
}

#[async_trait]
impl AdminService for RestAdminClient {
    async fn get_instance(&self, name: &InstanceName) -> Result<ManagedResource, AdminError> {
        self.get_resource(&name.to_string()).await
    }

    async fn create_instance(&self, request: &CreateInstance) -> Result<Operation, AdminError> {
        let body = CreateInstanceBody {
            instance_id: request.name.instance(),
            instance: InstanceBody {
                name: request.name.to_string(),
                config: &request.config,
                display_name: &request.display_name,
                node_count: request.node_count,
                labels: &request.labels,
            },
        };
        let path = format!("{}/instances", request.name.parent());
        self.operation(self.request(Method::POST, &path)?.json(&body))
            .await
    }

    async fn list_instances(
        &self,
        project: &str,
        filter: &str,
        page_token: Option<&str>,
    ) -> Result<Page<ManagedResource>, AdminError> {
        let mut query = vec![("filter", filter)];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        let path = format!("projects/{project}/instances");
        let response: ListInstancesResponse = self
            .json(self.request(Method::GET, &path)?.query(&query))
            .await?;
        Ok(Page {
            items: response.instances.into_iter().map(Into::into).collect(),
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn delete_instance(&self, name: &str) -> Result<(), AdminError> {
        self.delete(name).await
    }

    async fn get_database(&self, name: &DatabaseName) -> Result<ManagedResource, AdminError> {
        self.get_resource(&name.to_string()).await
    }

    async fn create_database(
        &self,
        instance: &InstanceName,
        request: &CreateDatabase,
    ) -> Result<Operation, AdminError> {
        let body = CreateDatabaseBody {
            create_statement: &request.create_statement,
            extra_statements: &request.extra_statements,
            proto_descriptors: encode_descriptors(&request.proto_descriptors),
        };
        let path = format!("{instance}/databases");
        self.operation(self.request(Method::POST, &path)?.json(&body))
            .await
    }

    async fn update_database_ddl(
        &self,
        database: &DatabaseName,
        request: &UpdateDdl,
    ) -> Result<Operation, AdminError> {
        let body = UpdateDdlBody {
            statements: &request.statements,
            proto_descriptors: encode_descriptors(&request.proto_descriptors),
        };
        let path = format!("{database}/ddl");
        self.operation(self.request(Method::PATCH, &path)?.json(&body))
            .await
    }

    async fn drop_database(&self, name: &str) -> Result<(), AdminError> {
        self.delete(name).await
    }

    async fn wait_operation(&self, operation: &Operation) -> Result<(), AdminError> {
        loop {
            let op: OperationJson = self
                .json(self.request(Method::GET, &operation.name)?)
                .await?;
            if op.outcome()? {
                return Ok(());
            }
            debug!("Operation {} still running", operation.name);
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
