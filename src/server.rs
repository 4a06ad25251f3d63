//! REST API over the workflow operations.
//!
//! Stateless: each endpoint runs the relevant workflow piece against the
//! shared solver, so clients own their session progression. Request
//! lifecycles are scoped to a single call; unrelated clients never
//! supersede each other.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::alternatives::{self, Alternative};
use crate::config::Config;
use crate::error::WorkflowError;
use crate::evaluator::{self, EvaluationResult};
use crate::lifecycle::RequestManager;
use crate::nl;
use crate::params::ParameterSet;
use crate::report::{self, ReportFormat, ReportMetadata, ReportPayload};
use crate::solver::{MealPlanSolver, SolverOutcome};

#[derive(Clone)]
struct ApiState {
    config: Config,
    solver: Arc<dyn MealPlanSolver>,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(_) => ApiError::bad_request(err.to_string()),
            // Cancellation is lifecycle coordination, not a server fault.
            // A client that races its own resubmission gets a retryable
            // conflict instead of a 500.
            WorkflowError::Cancelled(_) => ApiError {
                status: StatusCode::CONFLICT,
                message: "request was superseded, retry".to_string(),
            },
            WorkflowError::Operation(_) => ApiError::internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

#[derive(Debug, Deserialize)]
struct AlternativesRequest {
    request: String,
}

#[derive(Debug, Serialize)]
struct AlternativesResponse {
    params: ParameterSet,
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct ParseRequest {
    instruction: String,
    #[serde(default)]
    params: ParameterSet,
}

#[derive(Debug, Serialize)]
struct ParseResponse {
    params: ParameterSet,
    changes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EvaluateRequest {
    request: String,
    params: Option<ParameterSet>,
}

#[derive(Debug, Serialize)]
struct EvaluateResponse {
    params: ParameterSet,
    results: Vec<EvaluationResult>,
}

#[derive(Debug, Deserialize)]
struct OptimizeRequest {
    params: ParameterSet,
    #[serde(default)]
    use_preset: bool,
}

#[derive(Debug, Deserialize)]
struct ReportRequest {
    request: String,
    params: Option<ParameterSet>,
    alternative_id: u32,
    format: ReportFormat,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn run_server(
    config: Config,
    solver: Arc<dyn MealPlanSolver>,
    bind: SocketAddr,
) -> Result<()> {
    let state = ApiState { config, solver };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/v1/alternatives", post(generate))
        .route("/v1/parse", post(parse))
        .route("/v1/evaluate", post(evaluate))
        .route("/v1/optimize", post(optimize))
        .route("/v1/report", post(build_report))
        .route("/v1/config", get(show_config))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn show_config(State(state): State<ApiState>) -> Json<ApiResponse<Config>> {
    ok(state.config)
}

async fn generate(Json(request): Json<AlternativesRequest>) -> ApiResult<AlternativesResponse> {
    let alternatives = alternatives::generate_alternatives(&request.request)?;
    let signals = alternatives::extract_signals(&request.request)?;
    Ok(ok(AlternativesResponse {
        params: signals.into(),
        alternatives,
    }))
}

async fn parse(Json(request): Json<ParseRequest>) -> ApiResult<ParseResponse> {
    let (params, changes) = nl::apply_instruction(&request.instruction, &request.params)?;
    Ok(ok(ParseResponse { params, changes }))
}

async fn evaluate(
    State(state): State<ApiState>,
    Json(request): Json<EvaluateRequest>,
) -> ApiResult<EvaluateResponse> {
    let (params, results) = run_evaluation(&state, &request.request, request.params).await?;
    Ok(ok(EvaluateResponse { params, results }))
}

async fn optimize(
    State(state): State<ApiState>,
    Json(request): Json<OptimizeRequest>,
) -> ApiResult<SolverOutcome> {
    request.params.validate()?;
    let outcome = state
        .solver
        .optimize(&request.params, request.use_preset)
        .await?;
    Ok(ok(outcome))
}

async fn build_report(
    State(state): State<ApiState>,
    Json(request): Json<ReportRequest>,
) -> ApiResult<ReportPayload> {
    let (params, results) = run_evaluation(&state, &request.request, request.params).await?;
    let chosen = results
        .iter()
        .find(|r| r.alternative_id == request.alternative_id)
        .ok_or_else(|| {
            ApiError::bad_request(format!("no alternative with id {}", request.alternative_id))
        })?;
    let metadata = ReportMetadata {
        school_name: state.config.report.school_name.clone(),
        author: state.config.report.author.clone(),
        note: None,
    };
    let payload = report::build_payload(chosen, &params, metadata, request.format)?;
    Ok(ok(payload))
}

async fn run_evaluation(
    state: &ApiState,
    request: &str,
    params: Option<ParameterSet>,
) -> Result<(ParameterSet, Vec<EvaluationResult>), ApiError> {
    let alternatives = alternatives::generate_alternatives(request)?;
    let params = match params {
        Some(params) => {
            params.validate()?;
            params
        }
        None => alternatives::extract_signals(request)?.into(),
    };
    // One manager per call: the lifecycle keys stay private to this
    // evaluation, so concurrent calls cannot cancel each other.
    let manager = RequestManager::new();
    let results =
        evaluator::evaluate_alternatives(&manager, state.solver.as_ref(), &alternatives, &params)
            .await?;
    Ok((params, results))
}
