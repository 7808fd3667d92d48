//! Asset generation helper for ComfyUI.
//!
//! Modules:
//! - `index`: Asset index model, pattern expansion and missing-asset reports.
//! - `prompt`: Style presets and the path classifier that turns asset paths into prompts.
//! - `workflow`: API-format workflow documents and the per-asset mutator.
//! - `comfyui`: Client for the ComfyUI queue/history/view protocol.
//! - `postprocess`: Fit-to-budget sizing, background removal, upscaling, sheet stitching.
//! - `pipeline`: Batch generation over a worklist.
//! - `specs`: Persisted spec records and index discovery.
//! - `api`: Axum router and handlers for the studio server.
//! - `config`: Env-driven configuration loader.
//! - `error`: Common error type and alias.
pub mod api;
pub mod comfyui;
pub mod config;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod postprocess;
pub mod prompt;
pub mod specs;
pub mod workflow;

pub use comfyui::client::ComfyUIClient;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use pipeline::{GenerateOptions, Generator, RunSummary};
pub use prompt::Style;
pub use workflow::JobDocument;
