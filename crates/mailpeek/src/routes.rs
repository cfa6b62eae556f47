//! HTTP routes.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

use mailpeek_core::{ErrorBody, ImapSettings, RetrievalRequest, retrieve_emails};

/// Shared state for the routes.
#[derive(Clone)]
pub struct AppState {
    /// Connection settings resolved at startup.
    pub settings: Arc<ImapSettings>,
}

/// POST /emails
///
/// Body is optional JSON: `{"limit": n}`.
async fn list_emails(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "rejecting request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: "Invalid request body.".to_string(),
                }),
            )
                .into_response();
        }
    };

    match retrieve_emails(&state.settings, request).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            warn!(kind = e.kind(), "retrieval failed");
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(e.to_body())).into_response()
        }
    }
}

fn parse_request(body: &[u8]) -> serde_json::Result<RetrievalRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RetrievalRequest::default());
    }
    serde_json::from_slice(body)
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// Builds the application router.
pub fn router(settings: ImapSettings) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS, Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    // The CORS layer answers every OPTIONS request itself, with no body.
    Router::new()
        .route("/emails", post(list_emails))
        .route("/health", get(health))
        .layer(cors)
        .with_state(AppState {
            settings: Arc::new(settings),
        })
}
