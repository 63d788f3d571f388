use axum::extract::{Json, Query, State};
use axum::response::IntoResponse;
use http::StatusCode;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::KvApiError;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRequest {
    /// Directory to list, `""` for the mount root. Directories end in `/`.
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub keys: Vec<String>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Query(req): Query<ListRequest>,
) -> Result<impl IntoResponse, KvApiError> {
    let keys = state.backend().metadata_list(&req.prefix).await?;
    tracing::debug!(prefix = %req.prefix, count = keys.len(), "kv list");
    Ok((StatusCode::OK, Json(ListResponse { keys })))
}

impl ApiRequest for ListRequest {
    type Response = ListResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let url = base_url.join("/api/v0/kv/list")?;
        Ok(client.get(url).query(&self))
    }
}
