use axum::extract::{Json, State};
use axum::response::IntoResponse;
use http::StatusCode;
use reqwest::{Client, RequestBuilder, Url};

use common::kv::{ConfigUpdate, Configuration};

use super::KvApiError;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

pub async fn read_handler(
    State(state): State<ServiceState>,
) -> Result<impl IntoResponse, KvApiError> {
    let config = state.backend().config_read().await?;
    Ok((StatusCode::OK, Json(config)))
}

pub async fn write_handler(
    State(state): State<ServiceState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<impl IntoResponse, KvApiError> {
    tracing::info!(?update, "kv config write");
    let config = state.backend().config_write(&update).await?;
    Ok((StatusCode::OK, Json(config)))
}

#[derive(Debug, Clone)]
pub struct ConfigReadRequest;

impl ApiRequest for ConfigReadRequest {
    type Response = Configuration;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        Ok(client.get(base_url.join("/api/v0/kv/config")?))
    }
}

#[derive(Debug, Clone)]
pub struct ConfigWriteRequest(pub ConfigUpdate);

impl ApiRequest for ConfigWriteRequest {
    type Response = Configuration;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        Ok(client.post(base_url.join("/api/v0/kv/config")?).json(&self.0))
    }
}
