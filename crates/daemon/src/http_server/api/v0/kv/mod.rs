//! Versioned kv routes for the mount this daemon serves.
//!
//! Keys are taken from the wildcard tail of the route, so `GET data/app/db`
//!  reads the key `app/db`.

use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use url::Url;

use common::kv::{ErrorKind, KvError};

use crate::http_server::api::client::ApiError;
use crate::ServiceState;

pub mod config;
pub mod data;
pub mod list;
pub mod metadata;
pub mod rotate;
pub mod subkeys;
pub mod versions;

// Re-export for convenience
pub use config::{ConfigReadRequest, ConfigWriteRequest};
pub use data::{DeleteLatestRequest, ReadRequest, WriteRequest};
pub use list::{ListRequest, ListResponse};
pub use metadata::{MetadataDeleteRequest, MetadataReadRequest, MetadataWriteRequest};
pub use rotate::{RotateRequest, RotateResponse};
pub use subkeys::SubkeysRequest;
pub use versions::{VersionAction, VersionsBody, VersionsRequest};

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route(
            "/data/*key",
            get(data::read_handler)
                .put(data::write_handler)
                .delete(data::delete_latest_handler),
        )
        .route("/delete/*key", post(versions::delete_handler))
        .route("/undelete/*key", post(versions::undelete_handler))
        .route("/destroy/*key", post(versions::destroy_handler))
        .route(
            "/metadata/*key",
            get(metadata::read_handler)
                .post(metadata::write_handler)
                .delete(metadata::delete_handler),
        )
        .route("/list", get(list::handler))
        .route("/subkeys/*key", get(subkeys::handler))
        .route(
            "/config",
            get(config::read_handler).post(config::write_handler),
        )
        .route("/rotate", post(rotate::handler))
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum KvApiError {
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error("no value found at {0}")]
    NotFound(String),
}

impl KvApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            KvApiError::NotFound(_) => StatusCode::NOT_FOUND,
            KvApiError::Kv(e) => match e.kind() {
                ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
                ErrorKind::InvariantViolation | ErrorKind::Transient => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for KvApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("KV API ERROR: {:?}", self);
        } else {
            tracing::debug!("KV API request rejected: {}", self);
        }
        let msg = serde_json::json!({"errors": [self.to_string()]});
        (status, Json(msg)).into_response()
    }
}

/// Build the url for `route` applied to `key`, one path segment per key segment
pub(crate) fn kv_url(base_url: &Url, route: &str, key: &str) -> Result<Url, ApiError> {
    let mut url = base_url.join(&format!("/api/v0/kv/{}/", route))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::UrlParse(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .extend(key.split('/'));
    Ok(url)
}
