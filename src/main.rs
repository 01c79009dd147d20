mod assembler;
mod content;
mod ebay;
mod http;
mod images;
mod jobs;
mod llm;
mod locks;
mod metrics;
mod models;
mod pipeline;
mod pricing;
mod progress;
mod publisher;
mod search;
mod security;
mod signal;
mod store;
mod supabase;
#[cfg(test)]
mod testkit;
mod tokens;

use assembler::ListingAssembler;
use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use content::ContentEngine;
use ebay::EbayClient;
use eyre::eyre;
use images::{ImageHostClient, ImageHostConfig};
use llm::{LlmClient, LlmConfig};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, GenerateRequest, GenerateResponse, ListingDraft, PublishResponse};
use pipeline::{Pipeline, PipelineError, PipelineErrorKind};
use progress::{ProgressState, ProgressTracker};
use publisher::{PublishError, Publisher};
use rand::{Rng, distr::Alphanumeric};
use search::SimilaritySearch;
use security::{AuthContext, AuthState, require_api_auth};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use store::{
    CredentialStore, ListingRepository, MemoryCredentialStore, MemoryListingRepository,
    RedisListingRepository, StoreError,
};
use supabase::SupabaseClient;
use tokens::{AuthenticationError, TokenManager};
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// How long an authorize `state` nonce stays redeemable.
const OAUTH_STATE_TTL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "snaplist.api", "server crashed: {err:#}");
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let ebay = EbayClient::from_env();
    let credentials: Arc<dyn CredentialStore> = match SupabaseClient::from_env() {
        Some(client) => Arc::new(client),
        None => {
            warn!(target = "snaplist.api", "SUPABASE_URL not set; credentials kept in memory");
            Arc::new(MemoryCredentialStore::new())
        }
    };
    let repo: Arc<dyn ListingRepository> = match RedisListingRepository::from_env() {
        Some(redis) => Arc::new(redis),
        None => {
            warn!(target = "snaplist.api", "REDIS_URL not set; drafts kept in memory");
            Arc::new(MemoryListingRepository::new())
        }
    };

    let tokens = TokenManager::new(ebay.clone(), credentials);
    let images = ImageHostClient::new(ImageHostConfig::from_env());
    let llm = LlmClient::new(LlmConfig::from_env());
    if !llm.is_available() {
        info!(target = "snaplist.api", "TENSORZERO_GATEWAY_URL not set; deterministic content only");
    }
    let pipeline = Pipeline::new(
        SimilaritySearch::new(ebay.clone(), tokens.clone()),
        ContentEngine::new(Arc::new(llm)),
        ListingAssembler::new(repo.clone()),
        ProgressTracker::new(),
        images.clone(),
        ebay.config().marketplace.currency(),
        http::env_usize("MAX_IMAGES", 12),
    );
    let publisher = Publisher::new(ebay, tokens.clone(), repo.clone(), images);
    let (queue, _worker) = jobs::JobQueue::spawn(pipeline.clone());
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| eyre!("prometheus recorder: {err}"))?;

    let state = AppState {
        pipeline,
        queue,
        publisher,
        tokens,
        repo,
        oauth_states: Arc::new(Mutex::new(HashMap::new())),
        openapi: Arc::new(openapi_document()),
        prometheus_handle,
    };
    let app = router(state, AuthState::from_env());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "snaplist.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    queue: jobs::JobQueue,
    publisher: Publisher,
    tokens: TokenManager,
    repo: Arc<dyn ListingRepository>,
    /// Authorize `state` nonce -> (owner id, issued at).
    oauth_states: Arc<Mutex<HashMap<String, (String, Instant)>>>,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: PrometheusHandle,
}

fn router(state: AppState, auth_state: AuthState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .route("/auth/ebay/authorize", get(authorize_marketplace))
        .route("/listings/generate", post(generate_listing))
        .route("/listings/{id}", get(get_listing))
        .route("/listings/{id}/publish", post(publish_listing))
        .route("/jobs/listings", post(enqueue_listing_job))
        .route("/progress/{job_id}", get(get_progress))
        .route_layer(middleware::from_fn_with_state(auth_state, require_api_auth));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .route("/auth/ebay/callback", get(marketplace_callback))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(http::env_usize(
            "REQUEST_MAX_BYTES",
            8 * 1024 * 1024,
        )))
}

fn openapi_document() -> serde_json::Value {
    serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or_else(|_| json!({"openapi": "3.0.3"}))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "snaplist-api",
    }))
}

async fn openapi_json(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json((*state.openapi).clone())
}

async fn swagger_ui() -> Response {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Snaplist API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    (
        [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
        .into_response()
}

async fn metrics_endpoint(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> Response {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

/// Marketplace consent URL for the caller.
///
/// - Method: `GET`
/// - Path: `/auth/ebay/authorize`
/// - Response: `{url}`; the embedded `state` is single use and expires after
///   ten minutes.
async fn authorize_marketplace(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
) -> Json<serde_json::Value> {
    crate::metrics::inc_requests("/auth/ebay/authorize");
    let nonce: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    {
        let mut pending = state.oauth_states.lock().await;
        pending.retain(|_, (_, issued)| issued.elapsed() < OAUTH_STATE_TTL);
        pending.insert(nonce.clone(), (context.owner_id.clone(), Instant::now()));
    }
    Json(json!({ "url": state.tokens.authorize_url(&nonce) }))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: String,
    state: String,
}

/// Redirect target of the consent flow; the `state` nonce names the owner.
async fn marketplace_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    crate::metrics::inc_requests("/auth/ebay/callback");
    let pending = state.oauth_states.lock().await.remove(&query.state);
    let Some((owner_id, issued)) = pending.filter(|(_, issued)| issued.elapsed() < OAUTH_STATE_TTL)
    else {
        return Err(AppError::Api(
            StatusCode::BAD_REQUEST,
            ApiError::new("invalid_state", "unknown or expired authorization state"),
        ));
    };
    let credential = state
        .tokens
        .complete_authorization(&owner_id, &query.code)
        .await?;
    info!(target = "snaplist.api", owner_id = %owner_id, waited_ms = issued.elapsed().as_millis() as u64, "marketplace_connected");
    Ok(Json(json!({
        "success": true,
        "owner_id": credential.owner_id,
        "expires_at": credential.expires_at,
    })))
}

/// Run one generation job inline.
///
/// - Method: `POST`
/// - Path: `/listings/generate`
/// - Auth: `Authorization: Bearer <key>` or `X-Snaplist-Key: <key>`
/// - Body: `GenerateRequest`
/// - Response: `GenerateResponse` (draft id + per-stage transcript)
async fn generate_listing(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    crate::metrics::inc_requests("/listings/generate");
    info!(
        target = "snaplist.api",
        owner_id = %context.owner_id,
        api_key = %context.api_key_id,
        images = payload.images.len(),
        "listing generation invoked",
    );
    let job = jobs::job_context(payload, &context);
    let report = state.pipeline.run(job).await?;
    Ok(Json(GenerateResponse {
        success: true,
        listing_id: report.listing_id,
        job_id: report.job_id,
        stages: report.stages,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnqueueResponse {
    job_id: String,
}

async fn enqueue_listing_job(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<EnqueueResponse>, AppError> {
    crate::metrics::inc_requests("/jobs/listings");
    let job_id = state
        .queue
        .enqueue(payload, &context)
        .await
        .map_err(|err| {
            let status = if err.error == "job_id_in_use" {
                StatusCode::CONFLICT
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            AppError::Api(status, err)
        })?;
    Ok(Json(EnqueueResponse { job_id }))
}

/// Jobs of other owners answer 404, same as unknown ids.
async fn get_progress(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path(job_id): Path<String>,
) -> Result<Json<ProgressState>, AppError> {
    state
        .pipeline
        .progress()
        .get(&job_id)
        .await
        .filter(|progress| progress.owner_id == context.owner_id)
        .map(Json)
        .ok_or_else(|| AppError::not_found("job", &job_id))
}

async fn get_listing(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<ListingDraft>, AppError> {
    let draft = state
        .repo
        .get(&id)
        .await?
        .ok_or_else(|| AppError::not_found("listing", &id))?;
    if draft.owner_id != context.owner_id {
        return Err(PublishError::AccessDenied(id).into());
    }
    Ok(Json(draft))
}

/// Push a draft to the marketplace as inventory item + offer.
///
/// - Method: `POST`
/// - Path: `/listings/{id}/publish`
/// - Response: `PublishResponse`; repeat calls return the recorded offer id
async fn publish_listing(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<PublishResponse>, AppError> {
    crate::metrics::inc_requests("/listings/publish");
    let outcome = state.publisher.publish(&context.owner_id, &id).await?;
    Ok(Json(PublishResponse {
        success: true,
        listing: outcome.listing,
        warnings: outcome.warnings,
    }))
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
    Publish(PublishError),
    Authentication(AuthenticationError),
    Store(StoreError),
    Api(StatusCode, ApiError),
}

impl AppError {
    fn not_found(what: &str, id: &str) -> Self {
        AppError::Api(
            StatusCode::NOT_FOUND,
            ApiError::new("not_found", format!("{what} `{id}` not found")),
        )
    }
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl From<PublishError> for AppError {
    fn from(value: PublishError) -> Self {
        Self::Publish(value)
    }
}

impl From<AuthenticationError> for AppError {
    fn from(value: AuthenticationError) -> Self {
        Self::Authentication(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

fn publish_error_body(err: PublishError) -> (StatusCode, ApiError) {
    let detail = err.to_string();
    match err {
        PublishError::NotFound(_) => (StatusCode::NOT_FOUND, ApiError::new("not_found", detail)),
        PublishError::AccessDenied(_) => {
            (StatusCode::FORBIDDEN, ApiError::new("access_denied", detail))
        }
        PublishError::InProgress(_) => {
            (StatusCode::CONFLICT, ApiError::new("publish_in_progress", detail))
        }
        PublishError::Validation(violations) => {
            let mut body = ApiError::new("validation_failed", "listing failed validation");
            body.violations = Some(violations);
            (StatusCode::UNPROCESSABLE_ENTITY, body)
        }
        PublishError::Authentication(_) => (
            StatusCode::UNAUTHORIZED,
            ApiError::new("marketplace_auth_failed", detail),
        ),
        PublishError::Inventory { payload, .. } => {
            let mut body = ApiError::new("inventory_rejected", detail);
            body.payload = Some(payload);
            (StatusCode::BAD_GATEWAY, body)
        }
        PublishError::Offer {
            payload,
            inventory_rolled_back,
            ..
        } => {
            let mut body = ApiError::new(
                "offer_rejected",
                format!("{detail} (inventory rolled back: {inventory_rolled_back})"),
            );
            body.payload = Some(payload);
            (StatusCode::BAD_GATEWAY, body)
        }
        PublishError::Storage(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::new("storage_failed", detail),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, payload) = match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, ApiError::new(err.stage(), err.detail()))
            }
            AppError::Publish(err) => publish_error_body(err),
            AppError::Authentication(err) => (
                StatusCode::UNAUTHORIZED,
                ApiError::new("marketplace_auth_failed", err.to_string()),
            ),
            AppError::Store(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("storage_failed", err.to_string()),
            ),
            AppError::Api(status, body) => (status, body),
        };
        if status.is_server_error() {
            warn!(target = "snaplist.api", status = status.as_u16(), error = %payload.error, "request_failed");
        }
        (status, Json(payload)).into_response()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
