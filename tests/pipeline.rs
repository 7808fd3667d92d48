mod common;

use assetgen::comfyui::ComfyUIClient;
use assetgen::index::MissingAsset;
use assetgen::pipeline::{GenerateOptions, Generator};
use assetgen::workflow::JobDocument;
use common::{spawn, workflow_json, FakeComfy};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const FRONT: &str = "sprites/astro-duck/base/astro-duck-base-front.png";
#[cfg(feature = "imaging")]
const IDLE_SHEET: &str = "sprites/astro-duck/base/astro-duck-base-idle-sheet.png";

fn missing(root: &Path, rel_path: &str, size: [u32; 2]) -> MissingAsset {
    MissingAsset {
        rel_path: rel_path.to_string(),
        full_path: Some(root.join(rel_path)),
        status: None,
        format: Some("png".to_string()),
        expected_size: Some(size),
    }
}

async fn serve(fake: FakeComfy) -> (Arc<FakeComfy>, ComfyUIClient) {
    let fake = Arc::new(fake);
    let base = spawn(fake.clone()).await;
    (fake, ComfyUIClient::new(&base))
}

#[tokio::test]
async fn run_writes_downloaded_bytes_to_full_path() {
    let (fake, client) = serve(FakeComfy::default()).await;
    let tmp = TempDir::new().unwrap();
    let base = JobDocument::from_value(workflow_json()).unwrap();
    let options = GenerateOptions { seed: Some(42), ..Default::default() };
    let generator = Generator::new(&client, base, options);

    let summary = generator.run(&[missing(tmp.path(), FRONT, [512, 384])]).await.unwrap();
    assert_eq!(summary.generated, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.assets[0].prompt_id, "job-1");
    assert!(!summary.assets[0].upscaled);

    let written = std::fs::read(tmp.path().join(FRONT)).unwrap();
    assert_eq!(written, b"fake image bytes");

    let queued = fake.queued();
    assert_eq!(queued.len(), 1);
    let graph = &queued[0]["prompt"];
    assert!(graph["6"]["inputs"]["text"].as_str().unwrap().contains("front view"));
    assert!(graph["7"]["inputs"]["text"].as_str().unwrap().contains("blurry"));
    assert_eq!(graph["5"]["inputs"]["width"], 512);
    assert_eq!(graph["5"]["inputs"]["height"], 384);
    assert_eq!(graph["3"]["inputs"]["seed"], 42);
    assert_eq!(graph["3"]["inputs"]["model"], serde_json::json!(["4", 0]));
    assert_eq!(
        graph["9"]["inputs"]["filename_prefix"],
        format!("assetgen_{}_astro-duck-base-front", generator.nonce())
    );
}

#[tokio::test]
async fn per_asset_failures_are_counted_not_raised() {
    let (_fake, client) = serve(FakeComfy { omit_prompt_id: true, ..Default::default() }).await;
    let tmp = TempDir::new().unwrap();
    let base = JobDocument::from_value(workflow_json()).unwrap();
    let generator = Generator::new(&client, base, GenerateOptions::default());

    let items = vec![
        missing(tmp.path(), FRONT, [512, 512]),
        missing(tmp.path(), "sprites/astro-duck/base/astro-duck-base-side.png", [512, 512]),
    ];
    let summary = generator.run(&items).await.unwrap();
    assert_eq!(summary.generated, 0);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.errors.len(), 2);
    assert!(summary.errors[0].starts_with(FRONT));
    assert!(!tmp.path().join(FRONT).exists());
}

#[cfg(feature = "imaging")]
mod imaging {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    /// White canvas with a red block in the middle.
    fn sprite_png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_fn(width, height, |x, y| {
            let inside_x = x >= width / 4 && x < width * 3 / 4;
            let inside_y = y >= height / 4 && y < height * 3 / 4;
            let inside = inside_x && inside_y;
            if inside {
                Rgba([200, 30, 30, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn reduced_render_is_cleared_and_upscaled() {
        let fake = FakeComfy { image: sprite_png(128, 64), ..Default::default() };
        let (fake, client) = serve(fake).await;
        let tmp = TempDir::new().unwrap();
        let base = JobDocument::from_value(workflow_json()).unwrap();
        let options = GenerateOptions {
            fit_vram: true,
            max_render_dim: 128,
            auto_alpha: true,
            ..Default::default()
        };
        let generator = Generator::new(&client, base, options);

        let summary = generator.run(&[missing(tmp.path(), FRONT, [256, 128])]).await.unwrap();
        assert_eq!(summary.generated, 1, "errors: {:?}", summary.errors);
        let asset = &summary.assets[0];
        assert_eq!(asset.render_size, [128, 64]);
        assert!(asset.upscaled);
        assert!(asset.alpha_applied);

        let graph = &fake.queued()[0]["prompt"];
        assert_eq!(graph["5"]["inputs"]["width"], 128);
        assert_eq!(graph["5"]["inputs"]["height"], 64);

        let saved = image::open(tmp.path().join(FRONT)).unwrap().to_rgba8();
        assert_eq!(saved.dimensions(), (256, 128));
        assert_eq!(saved.get_pixel(0, 0)[3], 0);
        assert!(saved.get_pixel(128, 64)[3] > 200);
    }

    #[tokio::test]
    async fn sheet_renders_each_frame_and_stitches() {
        let fake = FakeComfy { image: sprite_png(64, 64), ..Default::default() };
        let (fake, client) = serve(fake).await;
        let tmp = TempDir::new().unwrap();
        let base = JobDocument::from_value(workflow_json()).unwrap();
        let options = GenerateOptions { seed: Some(10), ..Default::default() };
        let generator = Generator::new(&client, base, options);

        let item = missing(tmp.path(), IDLE_SHEET, [256, 64]);
        let asset = generator.generate_sheet(&item, 64, 64, 4).await.unwrap();
        assert_eq!(asset.render_size, [64, 64]);

        let queued = fake.queued();
        assert_eq!(queued.len(), 4);
        let seeds: Vec<_> =
            queued.iter().map(|q| q["prompt"]["3"]["inputs"]["seed"].as_i64().unwrap()).collect();
        assert_eq!(seeds, vec![10, 11, 12, 13]);
        let last_prefix = queued[3]["prompt"]["9"]["inputs"]["filename_prefix"].as_str().unwrap();
        assert!(last_prefix.ends_with("_f3"));

        let sheet = image::open(&asset.path).unwrap().to_rgba8();
        assert_eq!(sheet.dimensions(), (256, 64));
    }

    #[tokio::test]
    async fn sheet_seeds_wrap_at_the_top_of_the_range() {
        let fake = FakeComfy { image: sprite_png(32, 32), ..Default::default() };
        let (fake, client) = serve(fake).await;
        let tmp = TempDir::new().unwrap();
        let base = JobDocument::from_value(workflow_json()).unwrap();
        let options = GenerateOptions { seed: Some(i64::MAX), ..Default::default() };
        let generator = Generator::new(&client, base, options);

        let item = missing(tmp.path(), IDLE_SHEET, [64, 32]);
        generator.generate_sheet(&item, 32, 32, 2).await.unwrap();

        let seeds: Vec<_> = fake
            .queued()
            .iter()
            .map(|q| q["prompt"]["3"]["inputs"]["seed"].as_i64().unwrap())
            .collect();
        assert_eq!(seeds, vec![i64::MAX, 0]);
    }
}
