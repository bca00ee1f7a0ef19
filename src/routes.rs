use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::{PipelineError, RelayError};
use crate::pipeline::Pipeline;
use crate::types::{ErrorResponse, HealthResponse, VerifyRequest, VerifyResponse};

/// Shared application state passed to all route handlers.
pub struct AppState {
    pub pipeline: Pipeline,
    pub request_deadline: Duration,
}

fn status_for(error: &RelayError) -> StatusCode {
    match error {
        RelayError::MalformedInput(_) => StatusCode::BAD_REQUEST,
        RelayError::ArtifactProduction { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        RelayError::Submission { .. }
        | RelayError::StatusQuery { .. }
        | RelayError::Protocol(_) => StatusCode::BAD_GATEWAY,
        RelayError::JobFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RelayError::PollTimeout { .. } | RelayError::DeadlineExceeded(_) => {
            StatusCode::GATEWAY_TIMEOUT
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = status_for(&self.source);
        let body = ErrorResponse {
            error: self.to_string(),
            phase: self.phase.to_string(),
            upstream: self.source.upstream_body().cloned(),
            diagnostics: self.source.diagnostics().map(str::to_string),
        };
        (status, Json(body)).into_response()
    }
}

/// POST /verify: prove a data commitment and wait for on-chain finalization.
///
/// Request body: VerifyRequest { dataHash, timestamp }
/// Response: VerifyResponse { commitment, jobId, receipt }
pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, PipelineError> {
    tracing::info!("Verify request: dataHash={} timestamp={}", req.data_hash, req.timestamp);

    match state
        .pipeline
        .verify(&req.data_hash, &req.timestamp, state.request_deadline)
        .await
    {
        Ok(resp) => {
            tracing::info!("Verified commitment={} jobId={}", resp.commitment, resp.job_id);
            Ok(Json(resp))
        }
        Err(e) => {
            tracing::error!("Verify failed: {}", e);
            Err(e)
        }
    }
}

/// GET /health: health check endpoint.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let profile = state.pipeline.profile();
    Json(HealthResponse {
        status: "ok".to_string(),
        proof_type: profile.proof_type.clone(),
        curve: profile.curve.clone(),
    })
}

/// Build the axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> axum::Router {
    use axum::routing::{get, post};
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    axum::Router::new()
        .route("/verify", post(verify_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
