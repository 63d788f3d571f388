use axum::extract::{Json, State};
use axum::response::IntoResponse;
use http::StatusCode;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::KvApiError;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotateResponse {
    /// Path key version new paths are encrypted under
    pub version: u32,
}

pub async fn handler(State(state): State<ServiceState>) -> Result<impl IntoResponse, KvApiError> {
    let version = state.backend().rotate_path_key().await?;
    Ok((StatusCode::OK, Json(RotateResponse { version })))
}

#[derive(Debug, Clone)]
pub struct RotateRequest;

impl ApiRequest for RotateRequest {
    type Response = RotateResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        Ok(client.post(base_url.join("/api/v0/kv/rotate")?))
    }
}
