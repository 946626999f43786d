use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use image::ImageFormat;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{io::Cursor, path::PathBuf, sync::Arc};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    config::{write_config, ConfigStore},
    controller::GenerationController,
    error::{ErrorKind, SubmitError},
    events::{EventFeed, FeedEntry},
    imagerouter::mask_key,
    models::{
        GenerateBody, ImageModel, JobHandle, JobSnapshot, UpdateSettingsBody, DEFAULT_HEIGHT, DEFAULT_WIDTH,
        DIMENSION_STEP, MAX_DIMENSION, MIN_DIMENSION,
    },
    transport::HttpTransport,
};

const DEFAULT_PREVIEW_EDGE: u32 = 512;

pub struct AppState<T: HttpTransport> {
    pub controller: GenerationController<T>,
    pub config: Arc<RwLock<ConfigStore>>,
    pub feed: Arc<RwLock<EventFeed>>,
}

impl<T: HttpTransport> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            config: Arc::clone(&self.config),
            feed: Arc::clone(&self.feed),
        }
    }
}

pub fn router<T: HttpTransport>(state: AppState<T>) -> Router {
    Router::new()
        .route("/api/models", get(list_models))
        .route("/api/generate", post(generate::<T>))
        .route("/api/status", get(status::<T>))
        .route("/api/events", get(events::<T>))
        .route("/api/image", get(download_image::<T>))
        .route("/api/image/preview", get(preview_image::<T>))
        .route("/api/settings", get(get_settings::<T>).put(update_settings::<T>))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: Option<ErrorKind>,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: Option<ErrorKind>, message: impl Into<String>) -> Self {
        Self { status, kind, message: message.into() }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, None, message)
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        let status = match err {
            SubmitError::Validation(_) => StatusCode::BAD_REQUEST,
            SubmitError::Configuration(_) => StatusCode::PRECONDITION_FAILED,
            SubmitError::Busy => StatusCode::CONFLICT,
        };
        ApiError::new(status, Some(err.kind()), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message, "kind": self.kind }))).into_response()
    }
}

pub async fn list_models() -> Json<serde_json::Value> {
    Json(json!({
        "models": ImageModel::ALL,
        "default_model": ImageModel::default(),
        "width": { "min": MIN_DIMENSION, "max": MAX_DIMENSION, "step": DIMENSION_STEP, "default": DEFAULT_WIDTH },
        "height": { "min": MIN_DIMENSION, "max": MAX_DIMENSION, "step": DIMENSION_STEP, "default": DEFAULT_HEIGHT },
    }))
}

pub async fn generate<T: HttpTransport>(
    State(state): State<AppState<T>>,
    Json(body): Json<GenerateBody>,
) -> Result<(StatusCode, Json<JobHandle>), ApiError> {
    let request = body.into_request()?;
    let api_key = state.config.read().api_key().to_string();
    let preview: String = request.prompt().chars().take(80).collect();
    tracing::info!("🎨 Generate requested: {}", preview);
    let handle = state.controller.submit(request, &api_key)?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

pub async fn status<T: HttpTransport>(State(state): State<AppState<T>>) -> Json<JobSnapshot> {
    Json(state.controller.snapshot())
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub after: Option<u64>,
}

pub async fn events<T: HttpTransport>(
    State(state): State<AppState<T>>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<FeedEntry>> {
    Json(state.feed.read().since(query.after.unwrap_or(0)))
}

// "Save as": hands the latest artifact to the client as a download.
pub async fn download_image<T: HttpTransport>(State(state): State<AppState<T>>) -> Result<Response, ApiError> {
    let result = state
        .controller
        .last_result()
        .ok_or_else(|| ApiError::not_found("no image has been generated yet"))?;

    let bytes = tokio::fs::read(&result.path)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, Some(ErrorKind::Storage), format!("{}: {}", result.path.display(), e)))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    let disposition = format!("attachment; filename=\"{}\"", result.file_name());
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok((StatusCode::OK, headers, bytes).into_response())
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    #[serde(default)]
    pub max: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct Preview {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub data_url: String,
}

pub async fn preview_image<T: HttpTransport>(
    State(state): State<AppState<T>>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<Preview>, ApiError> {
    let result = state
        .controller
        .last_result()
        .ok_or_else(|| ApiError::not_found("no image has been generated yet"))?;
    let edge = query.max.unwrap_or(DEFAULT_PREVIEW_EDGE).clamp(16, MAX_DIMENSION);
    let file_name = result.file_name();
    let path: PathBuf = result.path;

    let preview = tokio::task::spawn_blocking(move || -> Result<Preview, String> {
        let thumb = image::open(&path).map_err(|e| e.to_string())?.thumbnail(edge, edge);
        let mut buf = Cursor::new(Vec::new());
        thumb.write_to(&mut buf, ImageFormat::Png).map_err(|e| e.to_string())?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(buf.into_inner());
        Ok(Preview {
            file_name,
            width: thumb.width(),
            height: thumb.height(),
            data_url: format!("data:image/png;base64,{encoded}"),
        })
    })
    .await
    .map_err(|e| e.to_string())
    .and_then(|r| r)
    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, Some(ErrorKind::Storage), e))?;

    Ok(Json(preview))
}

#[derive(Debug, Serialize)]
pub struct SettingsView {
    pub has_api_key: bool,
    pub key_hint: Option<String>,
    pub config_path: String,
}

fn settings_view(store: &ConfigStore) -> SettingsView {
    SettingsView {
        has_api_key: store.has_api_key(),
        key_hint: store.has_api_key().then(|| mask_key(store.api_key())),
        config_path: store.path().display().to_string(),
    }
}

pub async fn get_settings<T: HttpTransport>(State(state): State<AppState<T>>) -> Json<SettingsView> {
    Json(settings_view(&state.config.read()))
}

pub async fn update_settings<T: HttpTransport>(
    State(state): State<AppState<T>>,
    Json(body): Json<UpdateSettingsBody>,
) -> Result<Json<SettingsView>, ApiError> {
    let (path, next) = {
        let store = state.config.read();
        (store.path().to_path_buf(), store.with_api_key(&body.api_key))
    };

    let saved = next.clone();
    let target = path.clone();
    tokio::task::spawn_blocking(move || write_config(&target, &saved))
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r.map_err(|e| e.to_string()))
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, Some(ErrorKind::Configuration), e))?;
    tracing::info!("🔑 API key saved to {}", path.display());

    let mut store = state.config.write();
    store.commit(next);
    Ok(Json(settings_view(&store)))
}
