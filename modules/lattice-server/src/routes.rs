//! HTTP surface over the run orchestrator and the two batch jobs.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use lattice_common::{LatticeError, Run, RunStatus};
use lattice_recs::{
    JobSummary, RecommendationJobs, RunFilter, RunOrchestrator, SendRequest, STANDARD_SUBJECT,
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RunOrchestrator>,
    pub jobs: Arc<RecommendationJobs>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/runs", post(create_run).get(list_runs))
        .route("/runs/{id}", get(get_run).delete(delete_run))
        .route("/runs/{id}/more", post(generate_more))
        .route("/runs/{id}/status", patch(update_status))
        .route("/runs/{id}/send", post(send_run))
        .route("/jobs/example/trigger", post(trigger_example))
        .route("/jobs/bimonthly/trigger", post(trigger_bimonthly))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub struct ApiError(LatticeError);

impl From<LatticeError> for ApiError {
    fn from(e: LatticeError) -> Self {
        Self(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(LatticeError::Anyhow(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LatticeError::MemberNotFound(_) | LatticeError::RunNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            LatticeError::InvalidState { .. } => StatusCode::CONFLICT,
            LatticeError::Dispatch(_) => StatusCode::BAD_GATEWAY,
            LatticeError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
struct CreateRunBody {
    target_uid: String,
}

#[derive(Deserialize, Default)]
struct ReviewBody {
    #[serde(default)]
    approved: Vec<Uuid>,
    #[serde(default)]
    rejected: Vec<Uuid>,
}

#[derive(Deserialize)]
struct StatusBody {
    status: RunStatus,
}

#[derive(Deserialize)]
struct SendBody {
    #[serde(default)]
    approved: Vec<Uuid>,
    email: String,
    subject: Option<String>,
    #[serde(default)]
    is_example: bool,
}

#[derive(Deserialize, Default)]
struct ListQuery {
    target_uid: Option<String>,
    status: Option<RunStatus>,
}

async fn create_run(
    State(state): State<AppState>,
    Json(body): Json<CreateRunBody>,
) -> Result<(StatusCode, Json<Run>), ApiError> {
    let run = state.orchestrator.create_run(&body.target_uid).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Run>>, ApiError> {
    let filter = RunFilter {
        target_uid: query.target_uid,
        status: query.status,
    };
    Ok(Json(state.orchestrator.runs(&filter).await?))
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Run>, ApiError> {
    Ok(Json(state.orchestrator.run(id).await?))
}

async fn generate_more(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewBody>,
) -> Result<Json<Run>, ApiError> {
    let run = state
        .orchestrator
        .generate_more(id, &body.approved, &body.rejected)
        .await?;
    Ok(Json(run))
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> Result<Json<Run>, ApiError> {
    Ok(Json(state.orchestrator.update_status(id, body.status).await?))
}

async fn send_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SendBody>,
) -> Result<Json<Run>, ApiError> {
    let req = SendRequest {
        approved: body.approved,
        email: body.email,
        subject: body.subject.unwrap_or_else(|| STANDARD_SUBJECT.to_string()),
        is_example: body.is_example,
    };
    Ok(Json(state.orchestrator.send(id, req).await?))
}

async fn delete_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.delete_run(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn trigger_example(
    State(state): State<AppState>,
) -> Result<Json<JobSummary>, ApiError> {
    Ok(Json(state.jobs.run_example_job().await?))
}

async fn trigger_bimonthly(
    State(state): State<AppState>,
) -> Result<Json<JobSummary>, ApiError> {
    Ok(Json(state.jobs.run_bimonthly_job(chrono::Utc::now()).await?))
}

async fn health() -> &'static str {
    "ok"
}
