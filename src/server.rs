use crate::buffer::BufferGuard;
use crate::config::Config;
use crate::document::{DocumentHandle, DocumentInfo, PageInfo};
use crate::edit;
use crate::engines;
use crate::error::ApiError;
use crate::ocr::{supported_languages, OcrResult, OcrService, OcrWorkerManager, OcrWorkerState};
use crate::raster::{self, Preset};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Upper bound on `file` parts in one request (merge inputs).
const MAX_UPLOAD_FILES: usize = 16;

/// Render scale when the request gives none.
const DEFAULT_RENDER_SCALE: f32 = 1.0;

/// Largest render scale a caller may ask for.
const MAX_RENDER_SCALE: f32 = 8.0;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ocr: OcrService,
    pub config: Arc<Config>,
}

impl AppState {
    fn guard(&self) -> BufferGuard {
        BufferGuard::with_max_len(self.config.max_file_size)
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub supported_languages: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub version: String,
    pub engine: EngineInfo,
    pub default_language: String,
    pub max_file_size_bytes: usize,
    pub ocr_scale: f32,
    pub ocr_timeout_secs: u64,
    pub preprocess: String,
    pub worker: OcrWorkerState,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageEntry {
    pub code: &'static str,
    pub name: &'static str,
    /// Whether the running engine can be allocated for this language
    pub available: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguagesResponse {
    pub default_language: String,
    pub languages: Vec<LanguageEntry>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResponse {
    pub page_count: u32,
    pub version: String,
    pub size_bytes: usize,
    pub pages: Vec<PageInfo>,
    pub info: DocumentInfo,
}

/// A produced PDF, base64 encoded.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedDocument {
    pub page_count: u32,
    pub data: String,
}

impl EncodedDocument {
    fn new(bytes: &[u8], page_count: u32) -> Self {
        Self {
            page_count,
            data: STANDARD.encode(bytes),
        }
    }

    fn from_handle(doc: &DocumentHandle) -> Self {
        Self::new(doc.bytes(), doc.page_count())
    }
}

#[derive(Serialize)]
pub struct SplitResponse {
    pub first: EncodedDocument,
    pub second: EncodedDocument,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResponse {
    #[serde(flatten)]
    pub result: OcrResult,
    pub processing_time_ms: u64,
}

/// Build the HTTP router over `state`.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_file_size.saturating_mul(MAX_UPLOAD_FILES);

    Router::new()
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .route("/languages", get(handle_languages))
        .route("/documents/inspect", post(handle_inspect))
        .route("/documents/merge", post(handle_merge))
        .route("/documents/split", post(handle_split))
        .route("/documents/rotate", post(handle_rotate))
        .route("/documents/extract", post(handle_extract))
        .route("/documents/remove", post(handle_remove))
        .route("/documents/render", post(handle_render))
        .route("/ocr", post(handle_ocr))
        .route("/ocr/terminate", post(handle_terminate))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP server until interrupted, then release the OCR engine.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let factory = engines::select(&config)?;
    let manager = Arc::new(OcrWorkerManager::new(factory, config.ocr_settings()));
    let ocr = OcrService::new(manager, config.ocr_timeout());
    let addr = format!("{}:{}", config.host, config.port);

    let state = AppState {
        ocr: ocr.clone(),
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let worker = ocr.terminate().await?;
    tracing::info!("Server shutdown complete (OCR worker {})", worker);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

/// Parts of a multipart upload. `file` parts keep their order.
#[derive(Default)]
struct Upload {
    files: Vec<Bytes>,
    fields: HashMap<String, String>,
}

impl Upload {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut upload = Upload::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" {
                if upload.files.len() == MAX_UPLOAD_FILES {
                    return Err(ApiError::InvalidRequest(format!(
                        "At most {} files per request",
                        MAX_UPLOAD_FILES
                    )));
                }
                let data = field.bytes().await.map_err(|e| {
                    ApiError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?;
                upload.files.push(data);
            } else {
                let value = field.text().await.map_err(|e| {
                    ApiError::InvalidRequest(format!("Invalid field {}: {}", name, e))
                })?;
                upload.fields.insert(name, value.trim().to_string());
            }
        }

        Ok(upload)
    }

    fn file(&self) -> Result<Bytes, ApiError> {
        self.files.first().cloned().ok_or(ApiError::MissingFile)
    }

    fn optional<T: FromStr>(&self, name: &str) -> Result<Option<T>, ApiError> {
        self.fields
            .get(name)
            .filter(|value| !value.is_empty())
            .map(|value| {
                value.parse::<T>().map_err(|_| {
                    ApiError::InvalidRequest(format!("Invalid value for {}: {}", name, value))
                })
            })
            .transpose()
    }

    fn required<T: FromStr>(&self, name: &str) -> Result<T, ApiError> {
        self.optional(name)?
            .ok_or_else(|| ApiError::InvalidRequest(format!("Missing field: {}", name)))
    }

    /// Comma-separated page numbers, e.g. "3,1,2".
    fn pages(&self, name: &str) -> Result<Vec<u32>, ApiError> {
        let value = self.required::<String>(name)?;
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u32>().map_err(|_| {
                    ApiError::InvalidRequest(format!("Invalid page number: {}", part))
                })
            })
            .collect()
    }
}

/// Guard and load uploaded bytes.
fn load(guard: BufferGuard, bytes: &[u8]) -> Result<DocumentHandle, ApiError> {
    let buffer = guard.guard(bytes)?;
    Ok(DocumentHandle::load(buffer)?)
}

/// Run parsing and editing work off the async runtime.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("Worker task failed: {}", e)))?
}

async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    let manager = state.ocr.manager();
    let settings = manager.settings();

    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: EngineInfo {
            name: manager.engine_name(),
            description: manager.engine_description(),
            supported_languages: manager.engine_languages(),
        },
        default_language: state.config.default_language.clone(),
        max_file_size_bytes: state.config.max_file_size,
        ocr_scale: settings.scale,
        ocr_timeout_secs: state.ocr.timeout().as_secs(),
        preprocess: settings.preset.to_string(),
        worker: state.ocr.state(),
    })
}

async fn handle_languages(State(state): State<AppState>) -> impl IntoResponse {
    let engine_languages = state.ocr.manager().engine_languages();

    let languages = supported_languages()
        .iter()
        .map(|language| LanguageEntry {
            code: language.code,
            name: language.name,
            available: engine_languages.iter().any(|code| code == language.code),
        })
        .collect();

    Json(LanguagesResponse {
        default_language: state.config.default_language.clone(),
        languages,
    })
}

async fn handle_inspect(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<InspectResponse>, ApiError> {
    let upload = Upload::read(multipart).await?;
    let data = upload.file()?;
    let guard = state.guard();

    let doc = blocking(move || load(guard, &data)).await?;

    Ok(Json(InspectResponse {
        page_count: doc.page_count(),
        version: doc.version().to_string(),
        size_bytes: doc.bytes().len(),
        pages: doc.pages().to_vec(),
        info: doc.info().clone(),
    }))
}

async fn handle_merge(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<EncodedDocument>, ApiError> {
    let upload = Upload::read(multipart).await?;
    let guard = state.guard();

    let merged = blocking(move || {
        let docs = upload
            .files
            .iter()
            .map(|data| load(guard, data))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edit::merge(&docs)?)
    })
    .await?;

    Ok(Json(EncodedDocument::new(&merged.buffer, merged.page_count)))
}

async fn handle_split(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SplitResponse>, ApiError> {
    let upload = Upload::read(multipart).await?;
    let data = upload.file()?;
    let at = upload.required::<u32>("at")?;
    let guard = state.guard();

    let halves = blocking(move || Ok(edit::split(&load(guard, &data)?, at)?)).await?;

    Ok(Json(SplitResponse {
        first: EncodedDocument::new(&halves.first, halves.first_page_count),
        second: EncodedDocument::new(&halves.second, halves.second_page_count),
    }))
}

async fn handle_rotate(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<EncodedDocument>, ApiError> {
    let upload = Upload::read(multipart).await?;
    let data = upload.file()?;
    let page = upload.required::<u32>("page")?;
    let degrees = upload.required::<i32>("degrees")?;
    let guard = state.guard();

    let rotated = blocking(move || Ok(edit::rotate(&load(guard, &data)?, page, degrees)?)).await?;

    Ok(Json(EncodedDocument::from_handle(&rotated)))
}

async fn handle_extract(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<EncodedDocument>, ApiError> {
    let upload = Upload::read(multipart).await?;
    let data = upload.file()?;
    let pages = upload.pages("pages")?;
    let guard = state.guard();

    let extracted =
        blocking(move || Ok(edit::extract_pages(&load(guard, &data)?, &pages)?)).await?;

    Ok(Json(EncodedDocument::from_handle(&extracted)))
}

async fn handle_remove(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<EncodedDocument>, ApiError> {
    let upload = Upload::read(multipart).await?;
    let data = upload.file()?;
    let pages = upload.pages("pages")?;
    let guard = state.guard();

    let remaining =
        blocking(move || Ok(edit::remove_pages(&load(guard, &data)?, &pages)?)).await?;

    Ok(Json(EncodedDocument::from_handle(&remaining)))
}

async fn handle_render(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = Upload::read(multipart).await?;
    let data = upload.file()?;
    let page = upload.optional::<u32>("page")?.unwrap_or(1);
    let scale = upload
        .optional::<f32>("scale")?
        .unwrap_or(DEFAULT_RENDER_SCALE);
    if !(scale > 0.0 && scale <= MAX_RENDER_SCALE) {
        return Err(ApiError::InvalidRequest(format!(
            "scale must be in (0, {}], got {}",
            MAX_RENDER_SCALE, scale
        )));
    }
    let preset = upload.optional::<Preset>("preprocess")?.unwrap_or(Preset::None);
    let guard = state.guard();

    let png = blocking(move || {
        let doc = load(guard, &data)?;
        let raster = raster::rasterize(&doc, page, scale)?.preprocess(preset);
        Ok(raster.to_png()?)
    })
    .await?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn handle_ocr(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<OcrResponse>, ApiError> {
    let start = Instant::now();

    let upload = Upload::read(multipart).await?;
    let data = upload.file()?;
    let page = upload.optional::<u32>("page")?.unwrap_or(1);
    let language = upload
        .optional::<String>("language")?
        .unwrap_or_else(|| state.config.default_language.clone());
    let guard = state.guard();

    let doc = blocking(move || load(guard, &data)).await?;
    let result = state
        .ocr
        .recognize_page(Arc::new(doc), page, language)
        .await?;

    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        "OCR completed in {}ms, confidence: {:.2}, text length: {}",
        processing_time_ms,
        result.confidence,
        result.text.len()
    );

    Ok(Json(OcrResponse {
        result,
        processing_time_ms,
    }))
}

async fn handle_terminate(
    State(state): State<AppState>,
) -> Result<Json<OcrWorkerState>, ApiError> {
    Ok(Json(state.ocr.terminate().await?))
}
