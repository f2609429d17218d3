//! HTTP API for the journal
//!
//! ## Endpoint Map
//!
//! | Method | Path                          | Description                    |
//! |--------|-------------------------------|--------------------------------|
//! | GET    | `/health`                     | Liveness probe                 |
//! | GET    | `/api/v1/status`              | Provider, store and counts     |
//! | POST   | `/api/v1/sources`             | Create a record                |
//! | GET    | `/api/v1/sources/:id`         | Fetch a record                 |
//! | PATCH  | `/api/v1/sources/:id`         | Partially update a record      |
//! | DELETE | `/api/v1/sources/:id`         | Release a record and its vector|
//! | POST   | `/api/v1/search`              | Filtered / semantic search     |
//! | POST   | `/api/v1/embeddings/reembed`  | Re-embed every live record     |
//!
//! Errors are `{"error": {"code": "...", "message": "..."}}`.

use crate::config::ServerConfig;
use crate::error::Error;
use crate::journal::Journal;
use crate::record::{CreateRecord, RecordUpdate};
use crate::search::SearchRequest;
use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub journal: Arc<Journal>,
    /// Cancelled on shutdown; long-running batch requests stop early
    pub shutdown: CancellationToken,
}

/// Build the complete HTTP application
pub fn build_app(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/status", get(status))
        .route("/api/v1/sources", post(create_source))
        .route(
            "/api/v1/sources/:id",
            get(get_source).patch(update_source).delete(delete_source),
        )
        .route("/api/v1/search", post(search))
        .route("/api/v1/embeddings/reembed", post(reembed))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors(cors_origins))
}

/// Bind and serve until `shutdown` is cancelled.
pub async fn serve(
    journal: Arc<Journal>,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> crate::Result<()> {
    let state = AppState {
        journal,
        shutdown: shutdown.clone(),
    };
    let app = build_app(state, &config.cors_origins);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Journal API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

// =============================================================================
// Errors
// =============================================================================

/// API error body
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
    #[serde(skip)]
    status: StatusCode,
}

/// API error detail
#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.to_string(),
                message: message.into(),
            },
            status,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_) | Error::InvalidQuality { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::AlreadyReleased { .. } => StatusCode::GONE,
            Error::Schema { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::ProviderUnavailable(_) | Error::StoreUnavailable(_) | Error::Http(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Config(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", err);
        }
        let code = match err.code() {
            "CONFIG_ERROR" => "INTERNAL_ERROR",
            code => code,
        };
        Self::new(status, code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Decode a JSON body, reporting shape and taxonomy problems as validation
/// errors rather than extractor rejections.
fn decode<T: DeserializeOwned>(body: Value) -> ApiResult<T> {
    serde_json::from_value(body).map_err(|e| ApiError::validation(e.to_string()))
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/v1/status
async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.journal.status().await)
}

/// POST /api/v1/sources
async fn create_source(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let request: CreateRecord = decode(body)?;
    let outcome = state.journal.create(request).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/v1/sources/:id
async fn get_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.journal.get(&id).await?))
}

/// PATCH /api/v1/sources/:id
async fn update_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let changes: RecordUpdate = decode(body)?;
    if changes.is_empty() {
        return Err(ApiError::validation("no fields to update"));
    }
    Ok(Json(state.journal.update(&id, changes).await?))
}

/// DELETE /api/v1/sources/:id
async fn delete_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let record = state.journal.delete(&id).await?;
    Ok(Json(serde_json::json!({ "id": record.id, "released": true })))
}

/// POST /api/v1/search
async fn search(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let request: SearchRequest = decode(body)?;
    Ok(Json(state.journal.search(&request).await?))
}

/// POST /api/v1/embeddings/reembed
async fn reembed(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let options = state
        .journal
        .batch_options()
        .with_cancel(state.shutdown.child_token());
    Ok(Json(state.journal.reembed_all(options).await?))
}

// =============================================================================
// CORS
// =============================================================================

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JournalConfig;
    use crate::embedding::registry::tests::ready_registry;
    use crate::record::RecordStore;
    use crate::vector::FlatVectorStore;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    async fn make_app() -> Router {
        let journal = Journal::new(
            RecordStore::in_memory(),
            ready_registry(26).await,
            Arc::new(FlatVectorStore::in_memory()),
            &JournalConfig::default(),
        );
        let state = AppState {
            journal: Arc::new(journal),
            shutdown: CancellationToken::new(),
        };
        build_app(state, &[])
    }

    async fn body_json(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 64)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let resp = health_check().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_source_lifecycle() {
        let app = make_app().await;

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/sources",
                json!({
                    "content": "anxious about tomorrow",
                    "who": "Ava",
                    "qualities": {"mood": "tight", "time": "future"}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = body_json(resp).await;
        assert_eq!(created["embedded"], true);
        let id = created["record"]["id"].as_str().unwrap().to_string();
        assert!(id.starts_with("src-"));
        assert_eq!(created["record"]["qualities"]["time.future"], true);

        let resp = app
            .clone()
            .oneshot(empty_request("GET", &format!("/api/v1/sources/{}", id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["who"], "Ava");

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/search",
                json!({"filters": {"who": ["Ava"]}}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let found = body_json(resp).await;
        assert_eq!(found["total"], 1);
        assert_eq!(found["results"][0]["record"]["id"], id.as_str());

        let resp = app
            .clone()
            .oneshot(empty_request("DELETE", &format!("/api/v1/sources/{}", id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(empty_request("DELETE", &format!("/api/v1/sources/{}", id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::GONE);
        assert_eq!(body_json(resp).await["error"]["code"], "ALREADY_RELEASED");
    }

    #[tokio::test]
    async fn test_unknown_quality_is_validation_error() {
        let app = make_app().await;
        let resp = app
            .oneshot(json_request(
                "POST",
                "/api/v1/sources",
                json!({"content": "x", "qualities": {"embodied.feeling": "odd"}}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("embodied.feeling"));
    }

    #[tokio::test]
    async fn test_get_unknown_source() {
        let app = make_app().await;
        let resp = app
            .oneshot(empty_request("GET", "/api/v1/sources/src-nope"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_empty_patch_rejected() {
        let app = make_app().await;
        let resp = app
            .oneshot(json_request("PATCH", "/api/v1/sources/src-any", json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_time_bound() {
        let app = make_app().await;
        let resp = app
            .oneshot(json_request(
                "POST",
                "/api/v1/search",
                json!({"filters": {"timeRange": {"start": "last tuesday"}}}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_status_and_reembed() {
        let app = make_app().await;
        app.clone()
            .oneshot(json_request("POST", "/api/v1/sources", json!({"content": "one"})))
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(empty_request("GET", "/api/v1/status"))
            .await
            .unwrap();
        let status = body_json(resp).await;
        assert_eq!(status["records"], 1);
        assert_eq!(status["provider"], "static");
        assert_eq!(status["vectors"], 1);

        let resp = app
            .oneshot(empty_request("POST", "/api/v1/embeddings/reembed"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let report = body_json(resp).await;
        assert_eq!(report["total"], 1);
        assert_eq!(report["embedded"], 1);
    }

    #[test]
    fn test_error_mapping() {
        let err = ApiError::from(Error::Schema {
            expected: 3,
            actual: 2,
        });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.error.code, "SCHEMA_ERROR");

        let err = ApiError::from(Error::StoreUnavailable("down".into()));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error.code, "UNAVAILABLE");

        let json = serde_json::to_string(&ApiError::validation("bad")).unwrap();
        assert!(json.contains("\"code\":\"VALIDATION_ERROR\""));
        assert!(!json.contains("status"));
    }

    #[test]
    fn test_build_cors_with_origins() {
        let _cors = build_cors(&["http://localhost:1420".to_string()]);
    }
}
