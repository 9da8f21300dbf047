//! HTTP client for the task backend.
//!
//! The backend exposes four endpoints:
//! - `GET /api/fields` - field names per data source
//! - `POST /tasks` - create a filter task
//! - `GET /tasks/{id}/status` - task status
//! - `GET /tasks/{id}/data` - records of a completed task

use crate::models::{FilterSpec, Record, TaskStatus};
use futures::future::{BoxFuture, FutureExt};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors talking to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Transport failure: connect, timeout, reset.
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The configured base URL cannot carry endpoint paths.
    #[error("invalid backend URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Non-success HTTP status.
    #[error("backend returned {status} for {url}: {body}")]
    Http {
        url: String,
        status: StatusCode,
        body: String,
    },

    /// Body was not the JSON shape we expected.
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The backend answered with an explicit error payload.
    #[error("backend error: {0}")]
    Backend(String),
}

impl ApiError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network { .. } | ApiError::Decode { .. } => true,
            ApiError::Http { status, .. } => status.is_server_error(),
            ApiError::Client(_) | ApiError::InvalidUrl { .. } | ApiError::Backend(_) => false,
        }
    }
}

/// Field names advertised by the backend for each source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFields {
    #[serde(default)]
    pub source_a: Vec<String>,
    #[serde(default)]
    pub source_b: Vec<String>,
}

impl SourceFields {
    /// Fields of both sources, de-duplicated in first-seen order.
    pub fn merged(&self) -> Vec<String> {
        let mut all: Vec<String> = Vec::new();
        for field in self.source_a.iter().chain(self.source_b.iter()) {
            if !all.contains(field) {
                all.push(field.clone());
            }
        }
        all
    }
}

#[derive(Debug, Deserialize)]
struct FieldsResponse {
    status: String,
    #[serde(default)]
    data: Option<SourceFields>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateTaskRequest<'a> {
    filters: &'a [FilterSpec],
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: TaskStatus,
}

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    #[serde(default)]
    records: Vec<Record>,
}

/// Operations of the task backend.
///
/// Object safe so the poller and submission code can run against the
/// HTTP client or an in-memory double.
pub trait TaskApi: Send + Sync {
    /// `GET /api/fields`
    fn fetch_fields(&self) -> BoxFuture<'_, Result<SourceFields, ApiError>>;

    /// `POST /tasks`, returning the new task id.
    fn create_task<'a>(&'a self, filters: &'a [FilterSpec]) -> BoxFuture<'a, Result<String, ApiError>>;

    /// `GET /tasks/{id}/status`
    fn task_status<'a>(&'a self, task_id: &'a str) -> BoxFuture<'a, Result<TaskStatus, ApiError>>;

    /// `GET /tasks/{id}/data`
    fn task_records<'a>(&'a self, task_id: &'a str) -> BoxFuture<'a, Result<Vec<Record>, ApiError>>;
}

/// `reqwest`-backed [`TaskApi`].
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    base_url: String,
    base: Url,
    http_client: reqwest::Client,
}

impl HttpTaskApi {
    /// Create a client for the backend at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url).map_err(|e| ApiError::InvalidUrl {
            url: base_url.clone(),
            message: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl {
                url: base_url,
                message: "not a hierarchical URL".to_string(),
            });
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self {
            base_url,
            base,
            http_client,
        })
    }

    /// Backend base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint URL below the base, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl {
                url: self.base_url.clone(),
                message: "not a hierarchical URL".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let endpoint = self.endpoint(segments)?;
        let url = endpoint.to_string();
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(endpoint)
            .send()
            .await
            .map_err(|source| ApiError::Network {
                url: url.clone(),
                source,
            })?;

        decode_response(url, response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ApiError> {
        let endpoint = self.endpoint(segments)?;
        let url = endpoint.to_string();
        debug!("POST {}", url);

        let response = self
            .http_client
            .post(endpoint)
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::Network {
                url: url.clone(),
                source,
            })?;

        decode_response(url, response).await
    }
}

async fn decode_response<T: DeserializeOwned>(
    url: String,
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await.map_err(|source| ApiError::Network {
        url: url.clone(),
        source,
    })?;

    if !status.is_success() {
        return Err(ApiError::Http { url, status, body });
    }

    serde_json::from_str(&body).map_err(|e| ApiError::Decode {
        url,
        message: e.to_string(),
    })
}

impl TaskApi for HttpTaskApi {
    fn fetch_fields(&self) -> BoxFuture<'_, Result<SourceFields, ApiError>> {
        async move {
            let response: FieldsResponse = self.get_json(&["api", "fields"]).await?;
            if response.status != "success" {
                return Err(ApiError::Backend(
                    response
                        .message
                        .unwrap_or_else(|| format!("status {}", response.status)),
                ));
            }
            Ok(response.data.unwrap_or_default())
        }
        .boxed()
    }

    fn create_task<'a>(&'a self, filters: &'a [FilterSpec]) -> BoxFuture<'a, Result<String, ApiError>> {
        async move {
            let response: CreateTaskResponse = self
                .post_json(&["tasks"], &CreateTaskRequest { filters })
                .await?;
            Ok(response.task_id)
        }
        .boxed()
    }

    fn task_status<'a>(&'a self, task_id: &'a str) -> BoxFuture<'a, Result<TaskStatus, ApiError>> {
        async move {
            let response: StatusResponse = self
                .get_json(&["tasks", task_id, "status"])
                .await?;
            Ok(response.status)
        }
        .boxed()
    }

    fn task_records<'a>(&'a self, task_id: &'a str) -> BoxFuture<'a, Result<Vec<Record>, ApiError>> {
        async move {
            let response: RecordsResponse = self
                .get_json(&["tasks", task_id, "data"])
                .await?;
            Ok(response.records)
        }
        .boxed()
    }
}
