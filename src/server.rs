// Router assembly: wires the control-plane and data-plane handlers
// onto the HTTP surface spec §6 describes.

use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;
use crate::{control, pipeline};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/init", post(control::init))
        .route("/status", get(control::status))
        .route("/add", post(control::add))
        .route("/rm", post(control::rm))
        .route("/read", post(pipeline::read::read))
        .route("/write", post(pipeline::write::write))
        .with_state(state)
}
