mod config;
mod rate_limit;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sanitation_core::{
    ApplicationLetter, Complaint, FiledComplaint, LookupTables, SanitationError, TextSubmission,
};
use sanitation_desk::{ComplaintDesk, ImageOutcome, TextOutcome};
use sanitation_ml::VisionStack;
use sanitation_observability::{AppMetrics, MetricsSnapshot};
use sanitation_storage::Store;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use config::ApiConfig;
pub use rate_limit::IpRateLimiter;

const DEFAULT_LIST_LIMIT: usize = 20;

#[derive(Clone)]
pub struct ApiState {
    pub desk: Arc<ComplaintDesk<Store>>,
    pub metrics: Arc<AppMetrics>,
    pub api_key: String,
    pub limiter: IpRateLimiter,
    pub allowed_origins: Arc<Vec<String>>,
    pub max_upload_bytes: usize,
    pub store_backend: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    model: String,
    store: &'static str,
    metrics: MetricsSnapshot,
}

#[derive(Debug, Deserialize)]
struct LocationRequest {
    location: String,
    #[serde(default)]
    draft_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct LocationResponse {
    status: &'static str,
    draft_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct DraftRequest {
    #[serde(default)]
    draft_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LanguageRequest {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    draft_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

/// Loads the classifier named by `config.vision` and assembles shared state.
pub async fn build_state(config: ApiConfig) -> Result<ApiState> {
    let vision = VisionStack::load(&config.vision).context("image classifier unavailable")?;
    build_state_with_vision(config, vision).await
}

pub async fn build_state_with_vision(config: ApiConfig, vision: VisionStack) -> Result<ApiState> {
    let metrics = AppMetrics::shared();

    let tables = match config.tables_path.as_ref() {
        Some(path) => LookupTables::from_json_file(path)
            .with_context(|| format!("failed to load lookup tables from {}", path.display()))?,
        None => LookupTables::builtin().clone(),
    };

    let store = match config.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url).await?,
        None => Store::memory(),
    };
    let store_backend = store.backend_name();

    let desk = Arc::new(ComplaintDesk::new(
        Arc::new(tables),
        vision,
        Arc::new(store),
        metrics.clone(),
        config.desk.clone(),
    ));

    Ok(ApiState {
        desk,
        metrics,
        api_key: config.api_key,
        limiter: IpRateLimiter::new(config.rate_limit_window, config.rate_limit_max_requests),
        allowed_origins: Arc::new(config.allowed_origins),
        max_upload_bytes: config.max_upload_bytes,
        store_backend,
    })
}

pub async fn build_app(config: ApiConfig) -> Result<Router> {
    Ok(build_router(build_state(config).await?))
}

pub async fn build_app_with_vision(config: ApiConfig, vision: VisionStack) -> Result<Router> {
    Ok(build_router(build_state_with_vision(config, vision).await?))
}

pub fn build_router(state: ApiState) -> Router {
    // Multipart framing adds a little on top of the raw image.
    let body_limit = state.max_upload_bytes + 64 * 1024;

    Router::new()
        .route("/health", get(health))
        .route("/v1/process_text", post(process_text))
        .route("/v1/upload_image", post(upload_image))
        .route("/v1/set_location", post(set_location))
        .route("/v1/generate_application", post(generate_application))
        .route("/v1/set_language", post(set_language))
        .route("/v1/complaints", get(list_complaints))
        .route("/v1/complaints/:id", get(get_complaint))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        model: state.desk.model_name().to_string(),
        store: state.store_backend,
        metrics: state.metrics.snapshot(),
    };
    (StatusCode::OK, Json(payload))
}

async fn process_text(
    State(state): State<ApiState>,
    Json(submission): Json<TextSubmission>,
) -> Result<Json<TextOutcome>, ApiError> {
    Ok(Json(state.desk.process_text(submission).await?))
}

async fn upload_image(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<Json<ImageOutcome>, ApiError> {
    let mut image = None;
    let mut draft_id = None;

    while let Some(field) = multipart.next_field().await.map_err(ApiError::multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let bytes = field.bytes().await.map_err(ApiError::multipart)?;
                image = Some(bytes.to_vec());
            }
            "draft_id" => {
                let value = field.text().await.map_err(ApiError::multipart)?;
                let value = value.trim();
                if !value.is_empty() {
                    draft_id = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    let Some(image) = image else {
        state.metrics.inc_image_rejection();
        return Err(ApiError::bad_request(
            "no_file_uploaded",
            "multipart field `image` is required",
        ));
    };

    Ok(Json(
        state
            .desk
            .analyze_image(image, draft_id.as_deref())
            .await?,
    ))
}

async fn set_location(
    State(state): State<ApiState>,
    Json(request): Json<LocationRequest>,
) -> Result<Json<LocationResponse>, ApiError> {
    let draft_id = state
        .desk
        .set_location(request.draft_id.as_deref(), &request.location)
        .await?;

    Ok(Json(LocationResponse {
        status: "ok",
        draft_id,
    }))
}

async fn generate_application(
    State(state): State<ApiState>,
    Json(request): Json<DraftRequest>,
) -> Result<Json<ApplicationLetter>, ApiError> {
    Ok(Json(
        state
            .desk
            .application_letter(request.draft_id.as_deref())
            .await?,
    ))
}

async fn set_language(
    State(state): State<ApiState>,
    Json(request): Json<LanguageRequest>,
) -> Result<Json<FiledComplaint>, ApiError> {
    let filed = state
        .desk
        .file_complaint(request.draft_id.as_deref(), request.language.as_deref())
        .await?;
    info!(complaint_id = %filed.complaint_id, "complaint filed over http");
    Ok(Json(filed))
}

async fn list_complaints(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Complaint>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Ok(Json(state.desk.recent_complaints(limit).await?))
}

async fn get_complaint(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Complaint>, ApiError> {
    Ok(Json(state.desk.complaint(id.trim()).await?))
}

#[derive(Debug)]
pub enum ApiError {
    Domain(SanitationError),
    BadRequest { code: &'static str, message: String },
}

impl ApiError {
    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    fn multipart(err: MultipartError) -> Self {
        Self::bad_request("invalid_multipart", err.body_text())
    }
}

impl From<SanitationError> for ApiError {
    fn from(err: SanitationError) -> Self {
        Self::Domain(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            Self::Domain(err) => {
                let (status, code) = domain_status(&err);
                if err.is_client_error() {
                    warn!(error = %err, code, "request rejected");
                } else {
                    error!(error = %err, code, "request failed");
                }
                (status, code, err.to_string())
            }
        };

        (
            status,
            Json(serde_json::json!({
                "error": code,
                "message": message
            })),
        )
            .into_response()
    }
}

fn domain_status(err: &SanitationError) -> (StatusCode, &'static str) {
    match err {
        SanitationError::ImageDecode(_) => (StatusCode::BAD_REQUEST, "invalid_image"),
        SanitationError::RecordNotFound(_) => (StatusCode::NOT_FOUND, "complaint_not_found"),
        SanitationError::DraftNotFound(_) => (StatusCode::NOT_FOUND, "draft_not_found"),
        SanitationError::ModelUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "model_unavailable")
        }
        SanitationError::IdSpaceExhausted { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "id_space_exhausted")
        }
        SanitationError::OverlappingBinTables { .. }
        | SanitationError::InvalidReferenceSet(_)
        | SanitationError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:5500")]
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !state.limiter.allow(&ip) {
        warn!(ip = %ip, "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate_limited",
                "message": "rate limit exceeded for this IP"
            })),
        )
            .into_response();
    }

    next.run(request).await
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if header_key != state.api_key {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "unauthorized",
                "message": "missing or invalid x-api-key"
            })),
        )
            .into_response();
    }

    next.run(request).await
}

async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );

    response
}

fn is_public_endpoint(path: &str) -> bool {
    matches!(path, "/health")
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "local".to_string())
}
