use axum::extract::{Json, Path, State};
use axum::response::IntoResponse;
use http::StatusCode;
use reqwest::{Client, RequestBuilder, Url};

use common::kv::{KeyMetadata, MetadataUpdate};

use super::{kv_url, KvApiError};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

pub async fn read_handler(
    State(state): State<ServiceState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, KvApiError> {
    match state.backend().metadata_read(&key).await? {
        Some(metadata) => Ok((StatusCode::OK, Json(metadata))),
        None => Err(KvApiError::NotFound(key)),
    }
}

pub async fn write_handler(
    State(state): State<ServiceState>,
    Path(key): Path<String>,
    Json(update): Json<MetadataUpdate>,
) -> Result<impl IntoResponse, KvApiError> {
    tracing::debug!(%key, ?update, "kv metadata write");
    let metadata = state.backend().metadata_write(&key, &update).await?;
    Ok((StatusCode::OK, Json(metadata)))
}

pub async fn delete_handler(
    State(state): State<ServiceState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, KvApiError> {
    tracing::debug!(%key, "kv metadata delete");
    state.backend().metadata_delete(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Clone)]
pub struct MetadataReadRequest {
    pub key: String,
}

impl ApiRequest for MetadataReadRequest {
    type Response = KeyMetadata;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        Ok(client.get(kv_url(base_url, "metadata", &self.key)?))
    }
}

#[derive(Debug, Clone)]
pub struct MetadataWriteRequest {
    pub key: String,
    pub update: MetadataUpdate,
}

impl ApiRequest for MetadataWriteRequest {
    type Response = KeyMetadata;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        Ok(client
            .post(kv_url(base_url, "metadata", &self.key)?)
            .json(&self.update))
    }
}

#[derive(Debug, Clone)]
pub struct MetadataDeleteRequest {
    pub key: String,
}

impl ApiRequest for MetadataDeleteRequest {
    type Response = ();

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        Ok(client.delete(kv_url(base_url, "metadata", &self.key)?))
    }
}
