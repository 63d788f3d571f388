use axum::extract::{Json, Path, Query, State};
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use common::kv::{SecretVersion, WriteOptions, WriteResponse};

use super::{kv_url, KvApiError};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadQuery {
    /// Version to read, latest when absent or zero
    pub version: Option<u64>,
}

/// Read a key. A deleted or destroyed version answers 404 with its
///  metadata in the body.
pub async fn read_handler(
    State(state): State<ServiceState>,
    Path(key): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Response, KvApiError> {
    tracing::debug!(%key, version = ?query.version, "kv read");

    match state.backend().read(&key, query.version).await? {
        Some(secret) if secret.data.is_none() => {
            Ok((StatusCode::NOT_FOUND, Json(secret)).into_response())
        }
        Some(secret) => Ok((StatusCode::OK, Json(secret)).into_response()),
        None => Err(KvApiError::NotFound(key)),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteBody {
    pub data: Map<String, Value>,
    #[serde(default)]
    pub options: WriteOptions,
}

pub async fn write_handler(
    State(state): State<ServiceState>,
    Path(key): Path<String>,
    Json(body): Json<WriteBody>,
) -> Result<impl IntoResponse, KvApiError> {
    tracing::debug!(%key, cas = ?body.options.cas, "kv write");

    let response = state.backend().write(&key, body.data, body.options).await?;
    for warning in &response.warnings {
        tracing::warn!(%key, "{}", warning);
    }
    Ok((StatusCode::OK, Json(response)))
}

pub async fn delete_latest_handler(
    State(state): State<ServiceState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, KvApiError> {
    tracing::debug!(%key, "kv delete latest");

    state.backend().delete_latest(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub key: String,
    pub version: Option<u64>,
}

impl ApiRequest for ReadRequest {
    type Response = SecretVersion;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let url = kv_url(base_url, "data", &self.key)?;
        Ok(client.get(url).query(&ReadQuery {
            version: self.version,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub key: String,
    pub data: Map<String, Value>,
    pub cas: Option<u64>,
}

impl ApiRequest for WriteRequest {
    type Response = WriteResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let url = kv_url(base_url, "data", &self.key)?;
        Ok(client.put(url).json(&WriteBody {
            data: self.data,
            options: WriteOptions { cas: self.cas },
        }))
    }
}

#[derive(Debug, Clone)]
pub struct DeleteLatestRequest {
    pub key: String,
}

impl ApiRequest for DeleteLatestRequest {
    type Response = ();

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        Ok(client.delete(kv_url(base_url, "data", &self.key)?))
    }
}
