//! # API REST
//!
//! REST API implementation for the biobank core.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, API key header)
//!
//! Uses `api-shared` for wire types and `biobank-core` for the logic.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Path as AxumPath, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use api_shared::{
    ApiKey, CodeRuleRes, CreateProjectReq, ErrorRes, GenerateSampleCodesReq,
    GenerateSampleCodesRes, HealthRes, HealthService, ListProjectsRes, ProjectRes,
    SaveCodeRuleReq, StabilityQcReq, StabilityQcRes, API_KEY_HEADER,
};
use biobank_core::stability::generate_stability_qc;
use biobank_core::{
    CodeGenerator, CodeIdGenerator, CoreConfig, ErrorClass, ProjectId, ProjectService,
    SampleError,
};

/// Application state for the REST API server
///
/// Contains shared state that needs to be accessible to all request handlers.
#[derive(Clone)]
pub struct AppState {
    projects: ProjectService,
    api_key: ApiKey,
}

impl AppState {
    pub fn new(cfg: Arc<CoreConfig>, api_key: ApiKey) -> Self {
        Self {
            projects: ProjectService::new(cfg),
            api_key,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        create_project,
        list_projects,
        get_sample_code_rule,
        save_sample_code_rule,
        generate_sample_codes,
        generate_stability_qc_codes,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        CreateProjectReq,
        ProjectRes,
        ListProjectsRes,
        CodeRuleRes,
        SaveCodeRuleReq,
        GenerateSampleCodesReq,
        api_shared::ClinicSubjectPairDto,
        api_shared::SeqTimePairDto,
        GenerateSampleCodesRes,
        StabilityQcReq,
        StabilityQcRes,
    ))
)]
pub struct ApiDoc;

type ApiError = (StatusCode, Json<ErrorRes>);

/// Builds the application router.
///
/// `/health` and the Swagger UI stay open; every project route requires the API key when one
/// is configured.
pub fn router(state: AppState) -> Router {
    let projects = Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/:id/sample-code-rule",
            get(get_sample_code_rule).put(save_sample_code_rule),
        )
        .route(
            "/projects/:id/generate-sample-codes",
            post(generate_sample_codes),
        )
        .route(
            "/projects/:id/generate-stability-qc-codes",
            post(generate_stability_qc_codes),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(projects)
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.api_key.validate(provided) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::warn!("rejected request to {}: {}", request.uri().path(), e);
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorRes {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Maps a core error to a status code and body.
///
/// Validation failures carry their message; unexpected failures are logged and reported
/// generically.
fn error_response(context: &str, err: SampleError) -> ApiError {
    let status = match err.class() {
        ErrorClass::Validation => StatusCode::BAD_REQUEST,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("{} error: {:?}", context, err);
        "Internal error".to_string()
    } else {
        err.to_string()
    };
    (status, Json(ErrorRes { error }))
}

fn parse_project_id(id: &str) -> Result<ProjectId, ApiError> {
    ProjectId::parse(id).map_err(|e| error_response("parse project id", e.into()))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/projects",
    request_body = CreateProjectReq,
    responses(
        (status = 201, description = "Project created", body = ProjectRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Create a new project with its sponsor and lab codes.
#[axum::debug_handler]
async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectReq>,
) -> Result<(StatusCode, Json<ProjectRes>), ApiError> {
    let project = state
        .projects
        .create(&req.name, req.codes())
        .map_err(|e| error_response("Create project", e))?;
    Ok((StatusCode::CREATED, Json(ProjectRes::from(&project))))
}

#[utoipa::path(
    get,
    path = "/projects",
    responses(
        (status = 200, description = "List of projects", body = ListProjectsRes)
    )
)]
/// List all projects, oldest first.
#[axum::debug_handler]
async fn list_projects(State(state): State<AppState>) -> Json<ListProjectsRes> {
    let projects = state.projects.list().iter().map(ProjectRes::from).collect();
    Json(ListProjectsRes { projects })
}

#[utoipa::path(
    get,
    path = "/projects/{id}/sample-code-rule",
    params(("id" = String, Path, description = "Project id (32 hex characters)")),
    responses(
        (status = 200, description = "Stored rule; unconfigured if never saved", body = CodeRuleRes),
        (status = 400, description = "Invalid project id", body = ErrorRes),
        (status = 404, description = "Unknown project", body = ErrorRes)
    )
)]
/// Read the sample code rule of a project.
#[axum::debug_handler]
async fn get_sample_code_rule(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<CodeRuleRes>, ApiError> {
    let id = parse_project_id(&id)?;
    let rule = state
        .projects
        .load_rule(&id)
        .map_err(|e| error_response("Load rule", e))?;
    Ok(Json(CodeRuleRes {
        sample_code_rule: rule,
    }))
}

#[utoipa::path(
    put,
    path = "/projects/{id}/sample-code-rule",
    params(("id" = String, Path, description = "Project id (32 hex characters)")),
    request_body = SaveCodeRuleReq,
    responses(
        (status = 200, description = "Rule saved", body = CodeRuleRes),
        (status = 400, description = "Invalid rule or missing audit reason", body = ErrorRes),
        (status = 404, description = "Unknown project", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Replace the sample code rule of a project. An audit reason is mandatory.
#[axum::debug_handler]
async fn save_sample_code_rule(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<SaveCodeRuleReq>,
) -> Result<Json<CodeRuleRes>, ApiError> {
    let id = parse_project_id(&id)?;
    state
        .projects
        .save_rule(&id, &req.sample_code_rule, &req.audit_reason)
        .map_err(|e| error_response("Save rule", e))?;
    Ok(Json(CodeRuleRes {
        sample_code_rule: req.sample_code_rule,
    }))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/generate-sample-codes",
    params(("id" = String, Path, description = "Project id (32 hex characters)")),
    request_body = GenerateSampleCodesReq,
    responses(
        (status = 200, description = "Generated codes in product order", body = GenerateSampleCodesRes),
        (status = 400, description = "Invalid selection or unconfigured rule", body = ErrorRes),
        (status = 404, description = "Unknown project", body = ErrorRes)
    )
)]
/// Generate the Cartesian product of the selected values using the project's rule.
#[axum::debug_handler]
async fn generate_sample_codes(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<GenerateSampleCodesReq>,
) -> Result<Json<GenerateSampleCodesRes>, ApiError> {
    let id = parse_project_id(&id)?;
    let project = state
        .projects
        .load(&id)
        .map_err(|e| error_response("Load project", e))?;
    let rule = state
        .projects
        .load_rule(&id)
        .map_err(|e| error_response("Load rule", e))?;

    let codes = CodeGenerator::new(&rule, &project.codes)
        .generate(&req.into(), &mut CodeIdGenerator::new())
        .map_err(|e| error_response("Generate sample codes", e))?;

    Ok(Json(GenerateSampleCodesRes {
        sample_codes: codes
            .iter()
            .map(|c| c.current_code().to_string())
            .collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/generate-stability-qc-codes",
    params(("id" = String, Path, description = "Project id (32 hex characters)")),
    request_body = StabilityQcReq,
    responses(
        (status = 200, description = "Generated codes", body = StabilityQcRes),
        (status = 400, description = "Invalid category, code or quantity", body = ErrorRes),
        (status = 404, description = "Unknown project", body = ErrorRes)
    )
)]
/// Generate consecutive stability, QC or validation codes.
#[axum::debug_handler]
async fn generate_stability_qc_codes(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<StabilityQcReq>,
) -> Result<Json<StabilityQcRes>, ApiError> {
    let id = parse_project_id(&id)?;
    state
        .projects
        .load(&id)
        .map_err(|e| error_response("Load project", e))?;

    let request = req
        .to_request()
        .map_err(|e| error_response("Stability/QC request", e))?;
    let sample_codes =
        generate_stability_qc(&request).map_err(|e| error_response("Generate stability/QC", e))?;

    Ok(Json(StabilityQcRes {
        count: sample_codes.len(),
        sample_codes,
    }))
}
