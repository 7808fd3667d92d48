//! Batch generation over a missing-asset worklist.
//!
//! Assets are handled one at a time: classify, mutate a copy of the base
//! workflow, queue it, wait for the history entry, download, post-process
//! and save. Per-asset failures are logged and counted; only errors that
//! would fail every remaining asset abort the run.
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use crate::comfyui::{first_output_image, ComfyUIClient};
use crate::error::{AppError, AppResult};
use crate::index::{AssetIndex, MissingAsset, StatusFilter, ValidationReport};
use crate::postprocess::{self, fit_size, AlphaSettings, PostProcess};
use crate::prompt::{classify, PromptPair, Style};
use crate::workflow::{mutate, JobDocument, MutationTarget, SamplerOverrides};
use crate::workflow::mutate::set_vae_inputs;

static UNSAFE_STEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]+").expect("stem regex is valid"));

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub style: Style,
    pub checkpoint: Option<String>,
    pub vae: Option<String>,
    pub seed: Option<i64>,
    pub sampler: SamplerOverrides,
    /// Stop after this many assets; 0 means no limit.
    pub limit: usize,
    /// Only assets whose `rel_path` contains a match.
    pub only: Option<Regex>,
    pub dry_run: bool,
    /// Write under this root instead of each item's `full_path`.
    pub output_root: Option<PathBuf>,
    pub fit_vram: bool,
    pub max_render_dim: u32,
    pub auto_alpha: bool,
    pub alpha: AlphaSettings,
    pub timeout: Duration,
    /// Raw `node.inputs.key` overrides applied to the base workflow.
    pub overrides: Vec<(Vec<String>, Value)>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        GenerateOptions {
            style: Style::default(),
            checkpoint: None,
            vae: None,
            seed: None,
            sampler: SamplerOverrides::default(),
            limit: 0,
            only: None,
            dry_run: false,
            output_root: None,
            fit_vram: false,
            max_render_dim: 768,
            auto_alpha: false,
            alpha: AlphaSettings::default(),
            timeout: Duration::from_secs(1800),
            overrides: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedAsset {
    pub rel_path: String,
    pub path: PathBuf,
    pub prompt_id: String,
    pub render_size: [u32; 2],
    pub alpha_applied: bool,
    pub upscaled: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub expansion_errors: usize,
    pub assets: Vec<GeneratedAsset>,
}

/// `assetgen_<nonce>_<stem>` with the stem reduced to `[A-Za-z0-9_-]`.
pub fn filename_prefix(nonce: &str, rel_path: &str) -> String {
    let stem = Path::new(rel_path).file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    format!("assetgen_{}_{}", nonce, UNSAFE_STEM.replace_all(stem, "_"))
}

pub fn new_run_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Missing assets of an index plus how many entries failed to expand.
pub fn worklist_from_index(index: &AssetIndex, filter: StatusFilter) -> (Vec<MissingAsset>, usize) {
    let report = ValidationReport::build(index, filter);
    let errors = report.expansion_errors.len();
    (report.missing, errors)
}

pub struct Generator<'a> {
    client: &'a ComfyUIClient,
    base: JobDocument,
    options: GenerateOptions,
    nonce: String,
}

impl<'a> Generator<'a> {
    pub fn new(client: &'a ComfyUIClient, mut base: JobDocument, options: GenerateOptions) -> Self {
        for (path, value) in &options.overrides {
            if !base.set_path(path, value.clone()) {
                tracing::warn!("override {} matched nothing in the workflow", path.join("."));
            }
        }
        if let Some(vae) = options.vae.as_deref() {
            if !set_vae_inputs(&mut base, vae) {
                tracing::warn!(
                    "--vae {} was given but the workflow has no VAELoader/VAELoaderSimple node; \
                     the checkpoint's own VAE will be used",
                    vae
                );
            }
        }
        Generator { client, base, options, nonce: new_run_nonce() }
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    fn output_path(&self, item: &MissingAsset) -> AppResult<PathBuf> {
        match (&self.options.output_root, &item.full_path) {
            (Some(root), _) => Ok(root.join(&item.rel_path)),
            (None, Some(full)) => Ok(full.clone()),
            (None, None) => Err(AppError::configuration(format!(
                "report item {} has no full_path and no output root was given",
                item.rel_path
            ))),
        }
    }

    pub async fn run(&self, items: &[MissingAsset]) -> AppResult<RunSummary> {
        let mut summary = RunSummary::default();
        for item in items {
            if self.options.limit > 0 && summary.generated >= self.options.limit {
                break;
            }
            if item.rel_path.is_empty() {
                continue;
            }
            if let Some(only) = &self.options.only {
                if !only.is_match(&item.rel_path) {
                    summary.skipped += 1;
                    continue;
                }
            }
            let Some([width, height]) = item.expected_size.filter(|[w, h]| *w > 0 && *h > 0) else {
                tracing::info!("SKIP (no expected_size): {}", item.rel_path);
                summary.skipped += 1;
                continue;
            };
            if classify(&item.rel_path, self.options.style).is_none() {
                tracing::info!("SKIP (no prompt mapping yet): {}", item.rel_path);
                summary.skipped += 1;
                continue;
            }

            if self.options.dry_run {
                let target =
                    self.output_path(item).unwrap_or_else(|_| PathBuf::from(&item.rel_path));
                tracing::info!(
                    "WOULD GENERATE: {} ({}x{}) -> {}",
                    item.rel_path,
                    width,
                    height,
                    target.display()
                );
                summary.generated += 1;
                continue;
            }

            match self.generate_one(item, width, height).await {
                Ok(asset) => {
                    let mut notes = Vec::new();
                    if asset.upscaled {
                        notes.push(format!(
                            "rendered {}x{} -> upscaled {}x{}",
                            asset.render_size[0], asset.render_size[1], width, height
                        ));
                    }
                    if asset.alpha_applied {
                        notes.push("auto-alpha".to_string());
                    }
                    if notes.is_empty() {
                        tracing::info!("WROTE: {} -> {}", asset.rel_path, asset.path.display());
                    } else {
                        tracing::info!(
                            "WROTE: {} -> {} ({})",
                            asset.rel_path,
                            asset.path.display(),
                            notes.join(", ")
                        );
                    }
                    summary.generated += 1;
                    summary.assets.push(asset);
                }
                Err(e) if e.is_fatal_to_run() => return Err(e),
                Err(e) => {
                    tracing::error!("FAILED: {}: {}", item.rel_path, e);
                    summary.failed += 1;
                    summary.errors.push(format!("{}: {}", item.rel_path, e));
                }
            }
        }
        tracing::info!(
            "Done. Generated: {}, skipped: {}, failed: {}",
            summary.generated,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    /// Generate and save a single asset at `width`x`height`.
    pub async fn generate_one(
        &self,
        item: &MissingAsset,
        width: u32,
        height: u32,
    ) -> AppResult<GeneratedAsset> {
        let prompts = classify(&item.rel_path, self.options.style)
            .ok_or_else(|| AppError::NotFound(format!("no prompt mapping for {}", item.rel_path)))?;
        let out_path = self.output_path(item)?;

        let (render_w, render_h) = if self.options.fit_vram {
            fit_size(width, height, self.options.max_render_dim)
        } else {
            (width, height)
        };
        let plan = PostProcess {
            auto_alpha: self.options.auto_alpha.then_some(self.options.alpha),
            upscale_to: ((render_w, render_h) != (width, height)).then_some((width, height)),
        };
        if !plan.is_noop() {
            postprocess::ensure_available()?;
        }

        let prefix = filename_prefix(&self.nonce, &item.rel_path);
        let (prompt_id, bytes) = self
            .render(&prompts, render_w, render_h, self.options.seed, prefix)
            .await?;
        let processed = plan.apply(bytes)?;

        if let Some(parent) = out_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&out_path, &processed.bytes).await?;

        Ok(GeneratedAsset {
            rel_path: item.rel_path.clone(),
            path: out_path,
            prompt_id,
            render_size: [render_w, render_h],
            alpha_applied: processed.alpha_applied,
            upscaled: processed.upscaled,
        })
    }

    /// Mutate a copy of the base workflow, run it and download the first image.
    async fn render(
        &self,
        prompts: &PromptPair,
        width: u32,
        height: u32,
        seed: Option<i64>,
        prefix: String,
    ) -> AppResult<(String, Vec<u8>)> {
        let mut document = self.base.clone();
        let mut target = MutationTarget::new(prompts, width, height);
        target.seed = seed;
        target.checkpoint = self.options.checkpoint.clone();
        target.filename_prefix = Some(prefix);
        target.sampler = self.options.sampler.clone();
        mutate(&mut document, &target);

        let prompt_id = self.client.queue_prompt(&document).await?;
        let history = self.client.await_history(&prompt_id, self.options.timeout).await?;
        let image = first_output_image(&history).ok_or_else(|| {
            AppError::protocol(format!(
                "no output image found in history for prompt_id={}",
                prompt_id
            ))
        })?;
        let bytes = self.client.fetch_image(&image).await?;
        Ok((prompt_id, bytes))
    }

    /// Render `frames` separate frames and stitch them into one horizontal sheet.
    ///
    /// Each frame gets its own seed (offset from the fixed seed when one is set,
    /// wrapping to zero past `i64::MAX`).
    pub async fn generate_sheet(
        &self,
        item: &MissingAsset,
        frame_width: u32,
        frame_height: u32,
        frames: u32,
    ) -> AppResult<GeneratedAsset> {
        postprocess::ensure_available()?;
        let prompts = classify(&item.rel_path, self.options.style)
            .ok_or_else(|| AppError::NotFound(format!("no prompt mapping for {}", item.rel_path)))?;
        let out_path = self.output_path(item)?;
        let prefix = filename_prefix(&self.nonce, &item.rel_path);

        let mut rendered = Vec::with_capacity(frames as usize);
        let mut last_prompt_id = String::new();
        for frame in 0..frames {
            tracing::info!("  Frame {}/{} of {}", frame + 1, frames, item.rel_path);
            let seed = match self.options.seed {
                Some(seed) => frame_seed(seed, frame),
                None => random_seed(),
            };
            let frame_prefix = format!("{}_f{}", prefix, frame);
            let (prompt_id, bytes) = self
                .render(&prompts, frame_width, frame_height, Some(seed), frame_prefix)
                .await?;
            last_prompt_id = prompt_id;
            rendered.push(bytes);
        }

        let auto_alpha = self.options.auto_alpha.then_some(self.options.alpha);
        let sheet = postprocess::stitch_png_frames(&rendered, auto_alpha)?.ok_or_else(|| {
            AppError::configuration(format!("no frames requested for {}", item.rel_path))
        })?;
        if let Some(parent) = out_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&out_path, &sheet).await?;
        tracing::info!("WROTE: {} -> {} ({} frames)", item.rel_path, out_path.display(), frames);

        Ok(GeneratedAsset {
            rel_path: item.rel_path.clone(),
            path: out_path,
            prompt_id: last_prompt_id,
            render_size: [frame_width, frame_height],
            alpha_applied: auto_alpha.is_some(),
            upscaled: false,
        })
    }
}

/// `seed + frame`, wrapping past `i64::MAX` back to zero.
fn frame_seed(seed: i64, frame: u32) -> i64 {
    let offset = i64::from(frame);
    match seed.checked_add(offset) {
        Some(next) => next,
        None => offset - (i64::MAX - seed) - 1,
    }
}

fn random_seed() -> i64 {
    (uuid::Uuid::new_v4().as_u128() % 999_999_999) as i64 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow() -> JobDocument {
        JobDocument::from_value(json!({
            "1": {"class_type": "EmptyLatentImage", "inputs": {"width": 1024, "height": 1024}},
            "2": {"class_type": "VAEDecode", "inputs": {"vae": ["9", 2]}}
        }))
        .unwrap()
    }

    fn item(rel_path: &str, size: Option<[u32; 2]>) -> MissingAsset {
        MissingAsset {
            rel_path: rel_path.to_string(),
            full_path: Some(PathBuf::from("/tmp/out").join(rel_path)),
            status: None,
            format: None,
            expected_size: size,
        }
    }

    #[test]
    fn prefix_sanitizes_stem() {
        assert_eq!(
            filename_prefix("abcd1234", "sprites/astro duck/base/astro-duck base+front.png"),
            "assetgen_abcd1234_astro-duck_base_front"
        );
        assert_eq!(new_run_nonce().len(), 8);
    }

    #[test]
    fn frame_seeds_wrap_instead_of_overflowing() {
        assert_eq!(frame_seed(10, 3), 13);
        assert_eq!(frame_seed(-5, 2), -3);
        assert_eq!(frame_seed(i64::MAX, 0), i64::MAX);
        assert_eq!(frame_seed(i64::MAX, 1), 0);
        assert_eq!(frame_seed(i64::MAX - 1, 3), 1);
        assert_eq!(frame_seed(i64::MAX, u32::MAX), i64::from(u32::MAX) - 1);
    }

    #[tokio::test]
    async fn dry_run_counts_without_contacting_comfyui() {
        let client = ComfyUIClient::new("http://127.0.0.1:9");
        let options = GenerateOptions { dry_run: true, ..Default::default() };
        let generator = Generator::new(&client, workflow(), options);
        let items = vec![
            item("sprites/astro-duck/base/astro-duck-base-front.png", Some([512, 512])),
            item("sprites/astro-duck/base/astro-duck-base-side.png", None),
            item("docs/readme.png", Some([64, 64])),
        ];
        let summary = generator.run(&items).await.unwrap();
        assert_eq!(summary.generated, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn only_filter_and_limit_bound_the_run() {
        let client = ComfyUIClient::new("http://127.0.0.1:9");
        let options = GenerateOptions {
            dry_run: true,
            only: Some(Regex::new("side|three-quarter").unwrap()),
            limit: 1,
            ..Default::default()
        };
        let generator = Generator::new(&client, workflow(), options);
        let items = vec![
            item("sprites/astro-duck/base/astro-duck-base-front.png", Some([512, 512])),
            item("sprites/astro-duck/base/astro-duck-base-side.png", Some([512, 512])),
            item("sprites/astro-duck/base/astro-duck-base-three-quarter.png", Some([512, 512])),
        ];
        let summary = generator.run(&items).await.unwrap();
        assert_eq!(summary.generated, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn output_root_wins_over_full_path() {
        let client = ComfyUIClient::new("http://127.0.0.1:9");
        let options = GenerateOptions {
            output_root: Some(PathBuf::from("/variants/a")),
            ..Default::default()
        };
        let generator = Generator::new(&client, workflow(), options);
        let path = generator.output_path(&item("x/y.png", None)).unwrap();
        assert_eq!(path, PathBuf::from("/variants/a/x/y.png"));

        let bare = Generator::new(&client, workflow(), GenerateOptions::default());
        let mut orphan = item("x/y.png", None);
        orphan.full_path = None;
        assert!(bare.output_path(&orphan).is_err());
    }

    #[test]
    fn overrides_apply_to_the_base_workflow() {
        let client = ComfyUIClient::new("http://127.0.0.1:9");
        let options = GenerateOptions {
            overrides: vec![(vec!["1".into(), "inputs".into(), "batch_size".into()], json!(2))],
            vae: Some("sdxl_vae.safetensors".into()),
            ..Default::default()
        };
        let generator = Generator::new(&client, workflow(), options);
        assert_eq!(generator.base.node("1").unwrap()["inputs"]["batch_size"], 2);
        assert_eq!(generator.base.node("2").unwrap()["inputs"]["vae"], json!(["9", 2]));
    }
}
