use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum RouterError {
    /// A declared shard ID that doesn't exist in the registry.
    ShardNotFound(String),
    /// A named server that doesn't exist in the registry.
    ServerNotFound(String),
    /// A control-plane count-relation violation (§6); carries the
    /// exact literal message the wire contract requires.
    CountMismatch(String),
    /// The request body didn't decode.
    BadRequest(String),
    /// A worker or supervisor call failed in transit.
    Upstream(String),
    /// A write's replicas disagreed on the resulting index.
    IndexDisagreement(String),
    /// Anything else, from `anyhow`-returning internals.
    Internal(anyhow::Error),
}

impl std::error::Error for RouterError {}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::ShardNotFound(id) => write!(f, "shard not found: {}", id),
            RouterError::ServerNotFound(name) => write!(f, "server not found: {}", name),
            RouterError::CountMismatch(msg) => write!(f, "{}", msg),
            RouterError::BadRequest(msg) => write!(f, "bad request: {}", msg),
            RouterError::Upstream(msg) => write!(f, "upstream error: {}", msg),
            RouterError::IndexDisagreement(msg) => write!(f, "index disagreement: {}", msg),
            RouterError::Internal(err) => write!(f, "internal error: {}", err),
        }
    }
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            RouterError::ShardNotFound(_) | RouterError::ServerNotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            RouterError::CountMismatch(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            RouterError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            RouterError::Upstream(msg) => {
                tracing::error!("upstream failure: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone())
            }
            RouterError::IndexDisagreement(msg) => {
                tracing::error!("write index disagreement: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            RouterError::Internal(err) => {
                tracing::error!("internal error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        let body = Json(json!({"message": message, "status": "failure"}));
        (status, body).into_response()
    }
}

impl From<anyhow::Error> for RouterError {
    fn from(err: anyhow::Error) -> Self {
        RouterError::Internal(err)
    }
}

pub type RouterResult<T> = Result<T, RouterError>;
