use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    config::WizardConfig,
    controller::WizardController,
    models::{Category, DesignFile, SelectCategoryRequest, ToggleThumbnailRequest},
    screen::Screen,
    services::MockupBackend,
    wizard::WizardError,
};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct Session {
    pub controller: WizardController,
    pub created_at: DateTime<Utc>,
    pub last_active: Arc<Mutex<DateTime<Utc>>>,
}

impl Session {
    pub fn new(controller: WizardController) -> Self {
        let now = Utc::now();
        Self { controller, created_at: now, last_active: Arc::new(Mutex::new(now)) }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    pub backend: Arc<dyn MockupBackend>,
    pub config: Arc<WizardConfig>,
}

impl AppState {
    pub fn new(backend: Arc<dyn MockupBackend>, config: WizardConfig) -> Self {
        Self { sessions: Arc::default(), backend, config: Arc::new(config) }
    }

    /// Looks a session up and marks it as active.
    fn session(&self, id: Uuid) -> Result<Session, ApiError> {
        let session = self.sessions.read().get(&id).cloned().ok_or(ApiError::UnknownSession(id))?;
        *session.last_active.lock() = Utc::now();
        Ok(session)
    }

    /// Drops every session idle for longer than the configured TTL, returns how many went.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        let ttl = chrono::Duration::from_std(self.config.session_ttl).unwrap_or_else(|_| chrono::Duration::weeks(52));
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| now - *s.last_active.lock() <= ttl);
        before - sessions.len()
    }
}

/// Periodically discards idle sessions for the lifetime of the server.
pub fn spawn_session_sweeper(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = state.sweep_idle(Utc::now());
            if removed > 0 {
                tracing::info!("🧹 Discarded {} idle wizard sessions", removed);
            }
        }
    })
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no wizard session {0}")] UnknownSession(Uuid),
    #[error("{0}")] Wizard(#[from] WizardError),
    #[error("invalid upload: {0}")] BadUpload(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownSession(_) => StatusCode::NOT_FOUND,
            ApiError::Wizard(WizardError::NoFiles | WizardError::NothingToGenerate) => StatusCode::BAD_REQUEST,
            ApiError::Wizard(_) => StatusCode::CONFLICT,
            ApiError::BadUpload(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub screen: Screen,
}

fn view(id: Uuid, session: &Session) -> Json<SessionView> {
    Json(SessionView {
        id,
        created_at: session.created_at,
        last_active: *session.last_active.lock(),
        screen: session.controller.screen(),
    })
}

pub fn router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/api/categories", get(list_categories))
        .route("/api/wizard", post(create_session))
        .route("/api/wizard/:id", get(get_session).delete(delete_session))
        .route("/api/wizard/:id/category", post(select_category))
        .route("/api/wizard/:id/thumbnails/toggle", post(toggle_thumbnail))
        .route("/api/wizard/:id/designs", post(upload_designs).layer(DefaultBodyLimit::max(upload_limit)))
        .route("/api/wizard/:id/generate", post(generate_mockups))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

pub async fn list_categories() -> Json<Vec<Category>> {
    Json(Category::ALL.to_vec())
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let id = Uuid::new_v4();
    let session = Session::new(WizardController::new(state.backend.clone(), state.config.clone()));
    state.sessions.write().insert(id, session.clone());
    tracing::info!("🆕 Created wizard session {}", id);
    (StatusCode::CREATED, view(id, &session))
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(id)?;
    Ok(view(id, &session))
}

pub async fn delete_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> StatusCode {
    if state.sessions.write().remove(&id).is_some() { StatusCode::NO_CONTENT } else { StatusCode::NOT_FOUND }
}

/// The step change is visible in the response; the thumbnail list arrives in the background.
pub async fn select_category(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<SelectCategoryRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(id)?;
    tracing::info!("🎯 Session {} selected category '{}'", id, body.category);

    let ticket = session.controller.begin_category(body.category.clone());
    let controller = session.controller.clone();
    tokio::spawn(async move { controller.load_thumbnails(body.category, ticket).await });

    Ok(view(id, &session))
}

pub async fn toggle_thumbnail(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ToggleThumbnailRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(id)?;
    session.controller.toggle_thumbnail(&body.thumbnail);
    Ok(view(id, &session))
}

pub async fn upload_designs(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(id)?;

    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::BadUpload(e.to_string()))? {
        let name = field
            .file_name()
            .or_else(|| field.name())
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadUpload("file part without a name".into()))?;
        let bytes = field.bytes().await.map_err(|e| ApiError::BadUpload(e.to_string()))?;
        files.push(DesignFile::new(name, bytes));
    }

    tracing::info!("📤 Session {} uploading {} designs", id, files.len());
    session.controller.upload_files(files).await?;
    Ok(view(id, &session))
}

/// Responds as soon as the generation slot is reserved; poll the session for the results.
pub async fn generate_mockups(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let session = state.session(id)?;
    let (ticket, request) = session.controller.begin_generation()?;
    tracing::info!("🚀 Session {} generating mockups", id);

    let controller = session.controller.clone();
    tokio::spawn(async move { controller.run_generation(ticket, request).await });

    Ok((StatusCode::ACCEPTED, view(id, &session)))
}
