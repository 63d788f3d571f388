use axum::Router;

pub mod kv;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/kv", kv::router(state.clone()))
        .with_state(state)
}
