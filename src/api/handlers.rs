//! Axum request handlers for the studio HTTP API.
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::routes::AppState;
use crate::error::{AppError, AppResult};
use crate::index::MissingAsset;
use crate::pipeline::{GenerateOptions, GeneratedAsset, Generator};
use crate::prompt::style::KNOWN_CHECKPOINTS;
use crate::prompt::{all_presets, PresetInfo, PromptPair, Style};
use crate::specs::{ExpandedIndexView, IndexSummary, SpecRecord};
use crate::workflow::JobDocument;

pub async fn root() -> &'static str {
    "assetgen studio"
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

impl PathQuery {
    fn required(&self) -> AppResult<&str> {
        self.path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::configuration("missing path"))
    }
}

fn resolve(state: &AppState, path: &str) -> PathBuf {
    state.config.project_root.join(path)
}

pub async fn list_indexes(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let indexes: Vec<IndexSummary> = state.specs.list_indexes()?;
    Ok(Json(json!({ "indexes": indexes })))
}

pub async fn get_index(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> AppResult<Json<ExpandedIndexView>> {
    state.specs.expanded_index(&id).map(Json)
}

pub async fn get_index_lists(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> AppResult<Json<Value>> {
    let index = state.specs.load_index(&id)?;
    Ok(Json(json!({ "id": id, "lists": index.lists, "root": index.root })))
}

pub async fn list_specs(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let specs = state.specs.list_specs()?;
    Ok(Json(json!({ "specs": specs })))
}

pub async fn save_spec(
    State(state): State<Arc<AppState>>,
    Json(record): Json<SpecRecord>,
) -> AppResult<Json<SpecRecord>> {
    state.specs.save_spec(record).map(Json)
}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
    pub path: String,
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> AppResult<Json<Value>> {
    let target = resolve(&state, query.path.as_deref().unwrap_or("."));
    if !target.is_dir() {
        return Err(AppError::NotFound(format!("path {}", target.display())));
    }

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(&target).await?;
    while let Some(entry) = entries.next_entry().await? {
        files.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: entry.file_type().await?.is_dir(),
            path: entry.path().to_string_lossy().into_owned(),
        });
    }
    files.sort_by_key(|f| (!f.is_dir, f.name.to_lowercase()));
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        let up = FileEntry {
            name: "..".to_string(),
            is_dir: true,
            path: parent.to_string_lossy().into_owned(),
        };
        files.insert(0, up);
    }
    Ok(Json(json!({ "files": files, "current_path": target.to_string_lossy() })))
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

pub async fn serve_image(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> AppResult<impl IntoResponse> {
    let path = resolve(&state, query.required()?);
    if !path.is_file() {
        return Err(AppError::NotFound(format!("image {}", path.display())));
    }
    let bytes = tokio::fs::read(&path).await?;
    Ok(([(header::CONTENT_TYPE, content_type(&path))], bytes))
}

pub async fn read_caption(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> AppResult<Json<Value>> {
    let caption = resolve(&state, query.required()?).with_extension("txt");
    let content = match tokio::fs::read_to_string(&caption).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    Ok(Json(json!({ "content": content, "path": caption.to_string_lossy() })))
}

#[derive(Debug, Deserialize)]
pub struct SaveCaption {
    pub path: Option<String>,
    #[serde(default)]
    pub content: String,
}

pub async fn save_caption(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SaveCaption>,
) -> AppResult<Json<Value>> {
    let path = body
        .path
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::configuration("missing path"))?;
    let target = resolve(&state, path);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&target, body.content).await?;
    Ok(Json(json!({ "status": "saved" })))
}

pub async fn presets() -> Json<Vec<PresetInfo>> {
    Json(all_presets())
}

/// ComfyUI's checkpoint list, or the built-in list when it cannot be reached.
pub async fn checkpoints(State(state): State<Arc<AppState>>) -> Json<Value> {
    match state.comfyui_client.get_checkpoints().await {
        Ok(list) => Json(json!({ "checkpoints": list, "source": "comfyui" })),
        Err(e) => {
            tracing::warn!("falling back to built-in checkpoints: {}", e);
            Json(json!({ "checkpoints": KNOWN_CHECKPOINTS, "source": "builtin" }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub path: String,
    pub style: Option<Style>,
    pub checkpoint: Option<String>,
}

fn pick_style(style: Option<Style>, checkpoint: Option<&str>) -> Style {
    style.unwrap_or_else(|| checkpoint.map(Style::for_checkpoint).unwrap_or_default())
}

pub async fn classify(Json(body): Json<ClassifyRequest>) -> AppResult<Json<PromptPair>> {
    let style = pick_style(body.style, body.checkpoint.as_deref());
    crate::prompt::classify(&body.path, style)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no prompt mapping for {}", body.path)))
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Asset path as the classifier sees it, e.g. `sprites/astro-duck/...`.
    pub path: String,
    /// Directory under the project root the asset is written to.
    #[serde(default)]
    pub root: String,
    pub width: u32,
    pub height: u32,
    pub style: Option<Style>,
    pub checkpoint: Option<String>,
    pub seed: Option<i64>,
    #[serde(default)]
    pub auto_alpha: bool,
    /// Render this many frames and stitch them into a horizontal sheet.
    pub frames: Option<u32>,
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateRequest>,
) -> AppResult<Json<GeneratedAsset>> {
    if body.width == 0 || body.height == 0 {
        return Err(AppError::configuration("width and height must be positive"));
    }
    let style = pick_style(body.style, body.checkpoint.as_deref());
    let workflow = JobDocument::load(&state.config.workflow_path)?;
    let options = GenerateOptions {
        style,
        checkpoint: body.checkpoint.clone(),
        seed: body.seed,
        sampler: style.sampler().into(),
        auto_alpha: body.auto_alpha,
        ..Default::default()
    };
    tracing::info!("Generating {} with preset {}", body.path, style.name());

    let generator = Generator::new(&state.comfyui_client, workflow, options);
    let item = MissingAsset {
        rel_path: body.path.clone(),
        full_path: Some(state.config.project_root.join(&body.root).join(&body.path)),
        status: None,
        format: None,
        expected_size: Some([body.width, body.height]),
    };
    let asset = match body.frames {
        Some(frames) if frames > 1 => {
            let frame_width = body.width / frames;
            if frame_width == 0 {
                return Err(AppError::configuration(format!(
                    "{} frames do not fit in width {}",
                    frames, body.width
                )));
            }
            generator.generate_sheet(&item, frame_width, body.height, frames).await?
        }
        _ => generator.generate_one(&item, body.width, body.height).await?,
    };
    Ok(Json(asset))
}
