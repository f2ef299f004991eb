//! Database capability used by the runner, and its CouchDB HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::{json, Value};

use crate::error::ClientError;
use crate::workload::Document;

/// A logical database on one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseHandle {
    pub name: String,
}

impl DatabaseHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplicateOptions {
    pub create_target: bool,
}

impl Default for ReplicateOptions {
    fn default() -> Self {
        Self {
            create_target: true,
        }
    }
}

/// Operations the benchmark needs from a database node.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn create_database(&self, name: &str) -> Result<DatabaseHandle, ClientError>;

    async fn destroy_database(&self, name: &str) -> Result<(), ClientError>;

    async fn insert_document(
        &self,
        db: &DatabaseHandle,
        document: &Document,
        id: &str,
    ) -> Result<(), ClientError>;

    async fn bulk_insert(
        &self,
        db: &DatabaseHandle,
        documents: &[(String, Document)],
    ) -> Result<(), ClientError>;

    /// One-shot replication of `source` into the database at `target_url`.
    async fn replicate(
        &self,
        source: &DatabaseHandle,
        target_url: &str,
        options: ReplicateOptions,
    ) -> Result<(), ClientError>;
}

/// Address and credentials of a node.
#[derive(Clone, Debug)]
pub struct NodeEndpoint {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl NodeEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    /// URL of `database` on this node with credentials embedded, as a
    /// replicator would need it.
    pub fn database_url(&self, database: &str) -> Result<String, ClientError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| ClientError::Connection(format!("invalid node url {}: {e}", self.url)))?;

        if let Some(user) = &self.username {
            url.set_username(user)
                .map_err(|_| ClientError::Connection(format!("cannot embed user in {}", self.url)))?;
            url.set_password(self.password.as_deref())
                .map_err(|_| ClientError::Connection(format!("cannot embed password in {}", self.url)))?;
        }

        url.path_segments_mut()
            .map_err(|_| ClientError::Connection(format!("{} cannot be a base url", self.url)))?
            .pop_if_empty()
            .push(database);

        Ok(url.to_string())
    }
}

/// [`DatabaseClient`] speaking the CouchDB HTTP API.
pub struct CouchClient {
    http: Client,
    endpoint: NodeEndpoint,
    /// How the node reaches itself when acting as replication source.
    replication_source: NodeEndpoint,
}

impl CouchClient {
    pub fn new(endpoint: NodeEndpoint, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        Ok(Self::with_http(endpoint, http))
    }

    /// Uses a preconfigured `reqwest` client (proxy, TLS or timeout settings).
    pub fn with_http(endpoint: NodeEndpoint, http: Client) -> Self {
        Self {
            http,
            replication_source: endpoint.clone(),
            endpoint,
        }
    }

    /// Overrides the address placed in the `source` field of replications.
    pub fn with_replication_source(mut self, source: NodeEndpoint) -> Self {
        self.replication_source = source;
        self
    }

    pub fn endpoint(&self) -> &NodeEndpoint {
        &self.endpoint
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.endpoint.url).map_err(|e| {
            ClientError::Connection(format!("invalid node url {}: {e}", self.endpoint.url))
        })?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Connection(format!("{} cannot be a base url", self.endpoint.url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let req = self.http.request(method, url);
        match &self.endpoint.username {
            Some(user) => req.basic_auth(user, self.endpoint.password.as_deref()),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Response, ClientError> {
        req.send()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))
    }
}

async fn unexpected(operation: &'static str, response: Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ClientError::UnexpectedStatus {
        operation,
        status,
        body,
    }
}

/// Counts rows of a `_bulk_docs` response that carry an `error` member.
fn rejected_rows(body: &Value) -> usize {
    body.as_array()
        .map(|rows| rows.iter().filter(|row| row.get("error").is_some()).count())
        .unwrap_or(0)
}

/// Builds the `_bulk_docs` request body, stamping each document with its id.
pub fn bulk_docs_body(documents: &[(String, Document)]) -> Value {
    let docs: Vec<Value> = documents
        .iter()
        .map(|(id, doc)| {
            let mut doc = doc.clone();
            if let Value::Object(map) = &mut doc {
                map.insert("_id".to_string(), Value::String(id.clone()));
            }
            doc
        })
        .collect();
    json!({ "docs": docs })
}

#[async_trait]
impl DatabaseClient for CouchClient {
    async fn create_database(&self, name: &str) -> Result<DatabaseHandle, ClientError> {
        let url = self.url(&[name])?;
        let response = self.send(self.request(reqwest::Method::PUT, url)).await?;
        match response.status() {
            StatusCode::CREATED | StatusCode::ACCEPTED => Ok(DatabaseHandle::new(name)),
            StatusCode::PRECONDITION_FAILED => Err(ClientError::AlreadyExists(name.to_string())),
            _ => Err(unexpected("create database", response).await),
        }
    }

    async fn destroy_database(&self, name: &str) -> Result<(), ClientError> {
        let url = self.url(&[name])?;
        let response = self.send(self.request(reqwest::Method::DELETE, url)).await?;
        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED => Ok(()),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(name.to_string())),
            _ => Err(unexpected("destroy database", response).await),
        }
    }

    async fn insert_document(
        &self,
        db: &DatabaseHandle,
        document: &Document,
        id: &str,
    ) -> Result<(), ClientError> {
        let url = self.url(&[&db.name, id])?;
        let response = self
            .send(self.request(reqwest::Method::PUT, url).json(document))
            .await?;
        match response.status() {
            StatusCode::CREATED | StatusCode::ACCEPTED => Ok(()),
            StatusCode::CONFLICT => Err(ClientError::Conflict {
                database: db.name.clone(),
                id: id.to_string(),
            }),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(db.name.clone())),
            _ => Err(unexpected("insert document", response).await),
        }
    }

    async fn bulk_insert(
        &self,
        db: &DatabaseHandle,
        documents: &[(String, Document)],
    ) -> Result<(), ClientError> {
        let url = self.url(&[&db.name, "_bulk_docs"])?;
        let response = self
            .send(
                self.request(reqwest::Method::POST, url)
                    .json(&bulk_docs_body(documents)),
            )
            .await?;
        match response.status() {
            StatusCode::CREATED | StatusCode::ACCEPTED => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| ClientError::Connection(e.to_string()))?;
                match rejected_rows(&body) {
                    0 => Ok(()),
                    rejected => Err(ClientError::PartialFailure {
                        database: db.name.clone(),
                        rejected,
                        total: documents.len(),
                    }),
                }
            }
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(db.name.clone())),
            _ => Err(unexpected("bulk insert", response).await),
        }
    }

    async fn replicate(
        &self,
        source: &DatabaseHandle,
        target_url: &str,
        options: ReplicateOptions,
    ) -> Result<(), ClientError> {
        let url = self.url(&["_replicate"])?;
        let body = json!({
            "source": self.replication_source.database_url(&source.name)?,
            "target": target_url,
            "create_target": options.create_target,
        });
        let response = self
            .send(self.request(reqwest::Method::POST, url).json(&body))
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let reason = response.text().await.unwrap_or_default();
            return Err(ClientError::Replication {
                database: source.name.clone(),
                reason: format!("HTTP {status}: {reason}"),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        if body.get("ok").and_then(Value::as_bool) == Some(true) {
            Ok(())
        } else {
            Err(ClientError::Replication {
                database: source.name.clone(),
                reason: body.to_string(),
            })
        }
    }
}
