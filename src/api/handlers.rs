use crate::dispatch::{lookup, HandlerRequest, RouteTable};
use crate::model::HttpMethod;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Largest request body the dispatch path will buffer.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared serving state: the two live route tables. Built-in discovery owns
/// the first; the reload engine's additive table is consulted second.
pub struct ServeState {
    pub builtin_routes: Arc<dyn RouteTable>,
    pub dynamic_routes: Arc<dyn RouteTable>,
}

pub type AppState = Arc<ServeState>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

/// Route every request not handled by a fixed route through the live route
/// tables and into the resolved handler bean.
pub async fn dispatch(State(state): State<AppState>, req: Request) -> Response {
    let Some(method) = HttpMethod::parse(req.method().as_str()) else {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(ErrorResponse::new("unsupported method")),
        )
            .into_response();
    };
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());

    let hit = lookup(&state.builtin_routes.snapshot(), method, &path)
        .or_else(|| lookup(&state.dynamic_routes.snapshot(), method, &path));
    let Some((entry, params)) = hit else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("no route matches the request")),
        )
            .into_response();
    };

    let bytes = match axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(&format!("unreadable body: {e}"))),
            )
                .into_response();
        }
    };
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(_) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        }
    };

    let request = HandlerRequest {
        method,
        path: path.clone(),
        params,
        query,
        body,
    };
    match entry.handler.call(&entry.operation, request).await {
        Ok(response) => {
            let status =
                StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(response.body)).into_response()
        }
        Err(e) => {
            log::error!(
                "handler for {} {} (module '{}') failed: {:#}",
                method,
                path,
                entry.module,
                e
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(&e.to_string())),
            )
                .into_response()
        }
    }
}
