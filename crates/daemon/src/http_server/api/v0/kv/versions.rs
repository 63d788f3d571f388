use axum::extract::{Json, Path, State};
use axum::response::IntoResponse;
use http::StatusCode;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::{kv_url, KvApiError};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionsBody {
    pub versions: Vec<u64>,
}

pub async fn delete_handler(
    State(state): State<ServiceState>,
    Path(key): Path<String>,
    Json(body): Json<VersionsBody>,
) -> Result<impl IntoResponse, KvApiError> {
    tracing::debug!(%key, versions = ?body.versions, "kv soft delete");
    state.backend().soft_delete(&key, &body.versions).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn undelete_handler(
    State(state): State<ServiceState>,
    Path(key): Path<String>,
    Json(body): Json<VersionsBody>,
) -> Result<impl IntoResponse, KvApiError> {
    tracing::debug!(%key, versions = ?body.versions, "kv undelete");
    state.backend().undelete(&key, &body.versions).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn destroy_handler(
    State(state): State<ServiceState>,
    Path(key): Path<String>,
    Json(body): Json<VersionsBody>,
) -> Result<impl IntoResponse, KvApiError> {
    tracing::debug!(%key, versions = ?body.versions, "kv destroy");
    state.backend().destroy(&key, &body.versions).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Which per-version transition a [`VersionsRequest`] asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionAction {
    Delete,
    Undelete,
    Destroy,
}

impl VersionAction {
    fn route(&self) -> &'static str {
        match self {
            VersionAction::Delete => "delete",
            VersionAction::Undelete => "undelete",
            VersionAction::Destroy => "destroy",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VersionsRequest {
    pub action: VersionAction,
    pub key: String,
    pub versions: Vec<u64>,
}

impl ApiRequest for VersionsRequest {
    type Response = ();

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let url = kv_url(base_url, self.action.route(), &self.key)?;
        Ok(client.post(url).json(&VersionsBody {
            versions: self.versions,
        }))
    }
}
