use axum::extract::{Json, Path, Query, State};
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::kv::SubkeysResponse;

use super::{kv_url, KvApiError};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubkeysQuery {
    pub version: Option<u64>,
    /// Zero walks the whole document
    #[serde(default)]
    pub depth: u32,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Path(key): Path<String>,
    Query(query): Query<SubkeysQuery>,
) -> Result<Response, KvApiError> {
    match state
        .backend()
        .subkeys(&key, query.version, query.depth)
        .await?
    {
        Some(response) if response.subkeys.is_none() => {
            Ok((StatusCode::NOT_FOUND, Json(response)).into_response())
        }
        Some(response) => Ok((StatusCode::OK, Json(response)).into_response()),
        None => Err(KvApiError::NotFound(key)),
    }
}

#[derive(Debug, Clone)]
pub struct SubkeysRequest {
    pub key: String,
    pub version: Option<u64>,
    pub depth: u32,
}

impl ApiRequest for SubkeysRequest {
    type Response = SubkeysResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let url = kv_url(base_url, "subkeys", &self.key)?;
        Ok(client.get(url).query(&SubkeysQuery {
            version: self.version,
            depth: self.depth,
        }))
    }
}
