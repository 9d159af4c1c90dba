#![cfg(not(tarpaulin_include))]

use axum::{
    Extension, Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    middleware,
    routing::{delete, get, post, put},
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use uuid::Uuid;

use crate::admin;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingest::{self, Discard, IngestLimits, Ingested, PersistUpload, UploadedFile};
use crate::insights::{self, InsightReport, InsightRequest};
use crate::login::{self, Identity, SessionStore, UserStore};
use crate::normalizer::NormalizedPayload;
use crate::saving::{DocumentStore, FileStore, StoreError, StoredUpload, UploadDir};

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;
/// Analysis requests carry a whole normalized payload as JSON
const ANALYZE_BODY_LIMIT: usize = 64 * 1024 * 1024;
const UPLOAD_FIELD: &str = "file";

pub struct AppState {
    pub config: Config,
    pub limits: IngestLimits,
    pub store: Box<dyn DocumentStore>,
    pub uploads: UploadDir,
    pub users: UserStore,
    pub sessions: SessionStore,
}

impl AppState {
    /// State backed by the directories named in `config`
    pub fn open(config: Config) -> std::result::Result<Self, StoreError> {
        let store = FileStore::open(config.uploads_db_dir())?;
        let users = UserStore::open(config.users_file())?;
        Self::with_backends(config, Box::new(store), users)
    }

    /// State with caller-supplied document and user stores
    pub fn with_backends(
        config: Config,
        store: Box<dyn DocumentStore>,
        users: UserStore,
    ) -> std::result::Result<Self, StoreError> {
        let uploads = UploadDir::open(&config.upload_dir)?;
        Ok(AppState {
            limits: IngestLimits {
                max_bytes: config.max_upload_bytes,
            },
            sessions: SessionStore::new(config.session_ttl),
            config,
            store,
            uploads,
            users,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    message: String,
    #[serde(flatten)]
    payload: NormalizedPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_id: Option<Uuid>,
}

impl From<Ingested> for UploadResponse {
    fn from(ingested: Ingested) -> Self {
        UploadResponse {
            message: "File uploaded successfully".to_string(),
            file_id: ingested.stored.map(|s| s.id),
            payload: ingested.payload,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let authed = Router::new()
        .route("/api/upload", post(upload_file).layer(upload_limit(&state.limits)))
        .route("/api/upload/history", get(upload_history))
        .route("/api/auth/logout", post(login::handle_logout))
        .route("/api/auth/me", get(login::handle_me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_auth,
        ));

    let admin = Router::new()
        .route("/api/admin/users", get(admin::list_users))
        .route(
            "/api/admin/users/:username",
            put(admin::update_user).delete(admin::delete_user),
        )
        .route("/api/admin/files", get(admin::list_files))
        .route("/api/admin/files/:id", delete(admin::delete_file))
        .route("/api/admin/stats", get(admin::stats))
        .route_layer(middleware::from_fn(login::require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_auth,
        ));

    let public = Router::new()
        .route("/", get(serve_banner))
        .route("/api/health", get(health))
        .route("/api/auth/register", post(login::handle_register))
        .route("/api/auth/login", post(login::handle_login))
        .route("/api/upload/simple", post(upload_simple).layer(upload_limit(&state.limits)))
        .route(
            "/api/ai/analyze-simple",
            post(analyze_simple).layer(DefaultBodyLimit::max(ANALYZE_BODY_LIMIT)),
        );

    let static_dir = state.config.static_dir.clone();
    let app = Router::new()
        .merge(public)
        .merge(authed)
        .merge(admin)
        .layer(CorsLayer::permissive())
        .with_state(state);

    match static_dir.filter(|dir| dir.is_dir()) {
        Some(dir) => {
            log::info!("serving frontend from {}", dir.display());
            let index = ServeFile::new(dir.join("index.html"));
            app.fallback_service(ServeDir::new(dir).not_found_service(index))
        }
        None => app,
    }
}

fn upload_limit(limits: &IngestLimits) -> DefaultBodyLimit {
    DefaultBodyLimit::max(limits.max_bytes.saturating_add(MULTIPART_OVERHEAD))
}

pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::open(config.clone())?);
    let app = router(state);

    let listener = bind_with_fallback(&config.host, config.port, config.port_attempts).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Bind `host:port`, moving on to the next port while the current one is taken
pub async fn bind_with_fallback(
    host: &str,
    port: u16,
    attempts: u16,
) -> std::io::Result<TcpListener> {
    let mut port = port;
    let mut attempts_left = attempts;
    loop {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && attempts_left > 0 => {
                let Some(next) = port.checked_add(1) else {
                    return Err(e);
                };
                log::warn!("Port {} in use, trying {}...", port, next);
                port = next;
                attempts_left -= 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn serve_banner() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Excel Analytics API is running!" }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let config = &state.config;
    Json(serde_json::json!({
        "status": "OK",
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": {
            "port": config.port,
            "uploadDir": config.upload_dir,
            "databaseDir": config.database_dir,
            "maxUploadBytes": config.max_upload_bytes,
            "staticDir": if config.static_dir.is_some() { "SET" } else { "NOT SET" },
            "activeSessions": state.sessions.len(),
        }
    }))
}

type MultipartBody = std::result::Result<Multipart, MultipartRejection>;

/// Pull the `file` field out of a multipart body
///
/// A request that is not multipart at all counts as carrying no file.
async fn read_upload(multipart: MultipartBody, limits: &IngestLimits) -> Result<Option<UploadedFile>> {
    let Ok(mut multipart) = multipart else {
        return Ok(None);
    };
    let to_error = |err: MultipartError| {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::Validation(format!(
                "File too large: uploads are limited to {} bytes",
                limits.max_bytes
            ))
        } else {
            Error::Validation(format!("Malformed upload: {}", err.body_text()))
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(to_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(to_error)?;
        log::debug!("received upload field '{}' ({} bytes)", name, bytes.len());
        return Ok(Some(UploadedFile::new(name, bytes.to_vec())));
    }
    Ok(None)
}

/// Run CPU-bound work (decoding, password hashing) off the async executor
pub(crate) async fn run_blocking<T, F>(job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job).await.map_err(|e| {
        log::error!("blocking task failed: {}", e);
        Error::Persistence("Request processing was interrupted".to_string())
    })?
}

async fn upload_simple(
    State(state): State<Arc<AppState>>,
    multipart: MultipartBody,
) -> Result<Json<UploadResponse>> {
    let file = read_upload(multipart, &state.limits).await?;
    let limits = state.limits;
    let ingested = run_blocking(move || ingest::ingest(file, &limits, &Discard)).await?;
    Ok(Json(ingested.into()))
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    multipart: MultipartBody,
) -> Result<Json<UploadResponse>> {
    let file = read_upload(multipart, &state.limits).await?;
    let worker_state = state.clone();
    let ingested = run_blocking(move || {
        let sink = PersistUpload {
            store: worker_state.store.as_ref(),
            uploads: &worker_state.uploads,
            owner: &identity.username,
        };
        ingest::ingest(file, &worker_state.limits, &sink)
    })
    .await?;
    Ok(Json(ingested.into()))
}

async fn upload_history(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<StoredUpload>>> {
    Ok(Json(state.store.history(&identity.username)?))
}

async fn analyze_simple(
    request: std::result::Result<Json<InsightRequest>, JsonRejection>,
) -> Result<Json<InsightReport>> {
    let Json(request) = request.map_err(|rejection| {
        log::debug!("rejected analysis body: {}", rejection.body_text());
        Error::Validation("Invalid data provided".to_string())
    })?;
    let payload = request.into_payload()?;
    Ok(Json(insights::summarize(&payload)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_the_next_free_port() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let listener = bind_with_fallback("127.0.0.1", port, 5).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), port);
    }

    #[test]
    fn upload_limit_saturates_for_huge_settings() {
        let _ = upload_limit(&IngestLimits {
            max_bytes: usize::MAX,
        });
        let _ = upload_limit(&IngestLimits {
            max_bytes: usize::MAX - 1,
        });
    }

    #[tokio::test]
    async fn gives_up_without_attempts() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = bind_with_fallback("127.0.0.1", port, 0).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AddrInUse);
    }
}
