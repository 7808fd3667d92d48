//! Post-processing of generated images.
//!
//! Sizing is plain arithmetic and always available. Pixel work needs the
//! `imaging` feature; without it the same entry points fail with
//! `AppError::DependencyMissing` the first time they are actually needed.
use crate::error::AppResult;

/// Colors closer than this on every channel count as one background candidate.
pub const MERGE_TOLERANCE: u8 = 12;
pub const MIN_RENDER_SIDE: u32 = 64;

/// Shrink `(width, height)` to fit within `max_dim`, keeping the aspect ratio.
///
/// Results are multiples of 8 and never below 64. A `max_dim` of 0 disables
/// the budget.
pub fn fit_size(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    if max_dim == 0 || (width <= max_dim && height <= max_dim) {
        return (width, height);
    }
    let scale = (max_dim as f64 / width as f64).min(max_dim as f64 / height as f64);
    let shrink = |side: u32| {
        let scaled = ((side as f64 * scale).round() as u32).max(MIN_RENDER_SIDE);
        ((scaled / 8) * 8).max(MIN_RENDER_SIDE)
    };
    (shrink(width), shrink(height))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphaSettings {
    pub tolerance: u8,
    pub samples_per_edge: u32,
}

impl Default for AlphaSettings {
    fn default() -> Self {
        AlphaSettings { tolerance: 24, samples_per_edge: 12 }
    }
}

/// What to do to one downloaded image before it is saved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostProcess {
    pub auto_alpha: Option<AlphaSettings>,
    /// Final size when the render happened at a reduced resolution.
    pub upscale_to: Option<(u32, u32)>,
}

#[derive(Debug, Clone)]
pub struct Processed {
    pub bytes: Vec<u8>,
    pub alpha_applied: bool,
    pub upscaled: bool,
}

impl PostProcess {
    pub fn is_noop(&self) -> bool {
        self.auto_alpha.is_none() && self.upscale_to.is_none()
    }

    /// Apply the plan; untouched input is passed through byte for byte.
    pub fn apply(&self, bytes: Vec<u8>) -> AppResult<Processed> {
        if self.is_noop() {
            return Ok(Processed { bytes, alpha_applied: false, upscaled: false });
        }
        self.apply_pixels(&bytes)
    }

    #[cfg(feature = "imaging")]
    fn apply_pixels(&self, bytes: &[u8]) -> AppResult<Processed> {
        let mut image = decode(bytes)?;
        let alpha_applied = match self.auto_alpha {
            Some(settings) => {
                remove_background(&mut image, settings.tolerance, settings.samples_per_edge)
            }
            None => false,
        };
        let mut upscaled = false;
        if let Some((width, height)) = self.upscale_to {
            if image.dimensions() != (width, height) {
                image = upscale(&image, width, height);
                upscaled = true;
            }
        }
        Ok(Processed { bytes: encode_png(&image)?, alpha_applied, upscaled })
    }

    #[cfg(not(feature = "imaging"))]
    fn apply_pixels(&self, _bytes: &[u8]) -> AppResult<Processed> {
        Err(missing_imaging())
    }
}

#[cfg(not(feature = "imaging"))]
fn missing_imaging() -> crate::error::AppError {
    crate::error::AppError::DependencyMissing(
        "image post-processing needs the `imaging` feature; rebuild with `--features imaging` \
         or drop --auto-alpha/--fit-vram"
            .to_string(),
    )
}

/// Decode frames, clear their backgrounds if asked and lay them out left to
/// right as one PNG. `None` when there are no frames.
pub fn stitch_png_frames(
    frames: &[Vec<u8>],
    auto_alpha: Option<AlphaSettings>,
) -> AppResult<Option<Vec<u8>>> {
    #[cfg(feature = "imaging")]
    {
        let mut decoded = Vec::with_capacity(frames.len());
        for bytes in frames {
            let mut frame = decode(bytes)?;
            if let Some(settings) = auto_alpha {
                remove_background(&mut frame, settings.tolerance, settings.samples_per_edge);
            }
            decoded.push(frame);
        }
        stitch_horizontal(&decoded).map(|sheet| encode_png(&sheet)).transpose()
    }
    #[cfg(not(feature = "imaging"))]
    {
        let _ = (frames, auto_alpha);
        Err(missing_imaging())
    }
}

/// Check up front that pixel work is possible.
pub fn ensure_available() -> AppResult<()> {
    #[cfg(feature = "imaging")]
    {
        Ok(())
    }
    #[cfg(not(feature = "imaging"))]
    {
        Err(missing_imaging())
    }
}

#[cfg(feature = "imaging")]
pub use pixels::*;

#[cfg(feature = "imaging")]
mod pixels {
    use image::{imageops, ImageFormat, Rgba, RgbaImage};
    use std::collections::VecDeque;
    use std::io::Cursor;

    use super::MERGE_TOLERANCE;
    use crate::error::AppResult;

    type Rgb = [u8; 3];

    fn rgb_close(a: Rgb, b: Rgb, tolerance: u8) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| x.abs_diff(*y) <= tolerance)
    }

    fn rgb_at(image: &RgbaImage, x: u32, y: u32) -> Rgb {
        let Rgba([r, g, b, _]) = *image.get_pixel(x, y);
        [r, g, b]
    }

    pub fn decode(bytes: &[u8]) -> AppResult<RgbaImage> {
        Ok(image::load_from_memory(bytes)?.to_rgba8())
    }

    pub fn encode_png(image: &RgbaImage) -> AppResult<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    /// Candidate background colors sampled along the border.
    ///
    /// Corners plus `samples_per_edge` evenly spaced points on each edge,
    /// merged so no two candidates are within `MERGE_TOLERANCE`.
    pub fn edge_colors(image: &RgbaImage, samples_per_edge: u32) -> Vec<Rgb> {
        let (width, height) = image.dimensions();
        if width <= 1 || height <= 1 {
            return Vec::new();
        }
        let samples = samples_per_edge.max(2);
        let mut points = vec![(0, 0), (width - 1, 0), (0, height - 1), (width - 1, height - 1)];
        for i in 0..samples {
            let t = i as f64 / (samples - 1) as f64;
            let x = ((width - 1) as f64 * t).round() as u32;
            let y = ((height - 1) as f64 * t).round() as u32;
            points.extend([(x, 0), (x, height - 1), (0, y), (width - 1, y)]);
        }

        let mut merged: Vec<Rgb> = Vec::new();
        for (x, y) in points {
            let color = rgb_at(image, x, y);
            if !merged.iter().any(|seen| rgb_close(color, *seen, MERGE_TOLERANCE)) {
                merged.push(color);
            }
        }
        merged
    }

    /// Clear the alpha of background-like pixels reachable from the border.
    ///
    /// Flood fill with 4-connectivity; enclosed regions are never touched even
    /// when they match a background color. Returns whether any pixel changed.
    pub fn remove_background(image: &mut RgbaImage, tolerance: u8, samples_per_edge: u32) -> bool {
        let (width, height) = image.dimensions();
        if width <= 2 || height <= 2 {
            return false;
        }
        let background = edge_colors(image, samples_per_edge);
        if background.is_empty() {
            return false;
        }
        let is_background = |image: &RgbaImage, x: u32, y: u32| {
            let rgb = rgb_at(image, x, y);
            background.iter().any(|bg| rgb_close(rgb, *bg, tolerance))
        };

        let mut queue = VecDeque::new();
        for x in 0..width {
            for y in [0, height - 1] {
                if is_background(&*image, x, y) {
                    queue.push_back((x, y));
                }
            }
        }
        for y in 0..height {
            for x in [0, width - 1] {
                if is_background(&*image, x, y) {
                    queue.push_back((x, y));
                }
            }
        }

        let mut visited = vec![false; (width * height) as usize];
        let mut cleared = 0usize;
        while let Some((x, y)) = queue.pop_front() {
            let index = (y * width + x) as usize;
            if visited[index] {
                continue;
            }
            visited[index] = true;
            if !is_background(&*image, x, y) {
                continue;
            }
            let pixel = image.get_pixel_mut(x, y);
            if pixel[3] != 0 {
                pixel[3] = 0;
                cleared += 1;
            }
            if x > 0 {
                queue.push_back((x - 1, y));
            }
            if x + 1 < width {
                queue.push_back((x + 1, y));
            }
            if y > 0 {
                queue.push_back((x, y - 1));
            }
            if y + 1 < height {
                queue.push_back((x, y + 1));
            }
        }
        cleared > 0
    }

    pub fn upscale(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
        imageops::resize(image, width, height, imageops::FilterType::Lanczos3)
    }

    /// Paste frames left to right; every frame takes the first frame's size.
    pub fn stitch_horizontal(frames: &[RgbaImage]) -> Option<RgbaImage> {
        let first = frames.first()?;
        let (width, height) = first.dimensions();
        let mut sheet = RgbaImage::new(width * frames.len() as u32, height);
        for (i, frame) in frames.iter().enumerate() {
            imageops::replace(&mut sheet, frame, (i as u32 * width) as i64, 0);
        }
        Some(sheet)
    }
}
