//! Validation reports: which expanded assets are still missing on disk.
//!
//! The `missing` list is the worklist a generation run consumes.
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::index::expand::{expand_index, ExpansionError};
use crate::index::model::{AssetIndex, AssetStatus};
use crate::index::sheets::SheetEntry;

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingAsset {
    pub rel_path: String,
    #[serde(default)]
    pub full_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AssetStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub expected_size: Option<[u32; 2]>,
}

/// A file whose PNG header disagrees with its declared size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeMismatch {
    pub rel_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_path: Option<PathBuf>,
    pub expected_size: [u32; 2],
    /// `None` when the file is not a readable PNG.
    pub actual_size: Option<[u32; 2]>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub checked: usize,
    #[serde(default)]
    pub present: usize,
    #[serde(default)]
    pub missing: Vec<MissingAsset>,
    #[serde(default)]
    pub size_mismatches: Vec<SizeMismatch>,
    #[serde(default)]
    pub expansion_errors: Vec<ExpansionError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spritesheet_spec: Option<String>,
    #[serde(default)]
    pub spritesheet_entries: Vec<SheetEntry>,
    #[serde(default)]
    pub spritesheet_checked: usize,
    #[serde(default)]
    pub spritesheet_missing: Vec<String>,
    #[serde(default)]
    pub spritesheet_size_mismatches: Vec<SizeMismatch>,
}

/// Width and height from a PNG's IHDR chunk, or `None` for anything else.
pub fn png_size(path: &Path) -> Option<[u32; 2]> {
    let mut header = [0u8; 24];
    std::fs::File::open(path).ok()?.read_exact(&mut header).ok()?;
    if &header[..8] != PNG_SIGNATURE {
        return None;
    }
    let width = u32::from_be_bytes([header[16], header[17], header[18], header[19]]);
    let height = u32::from_be_bytes([header[20], header[21], header[22], header[23]]);
    Some([width, height])
}

fn is_png(rel_path: &str, format: Option<&str>) -> bool {
    format.is_some_and(|f| f.eq_ignore_ascii_case("png"))
        || rel_path.to_ascii_lowercase().ends_with(".png")
}

/// Which statuses take part in validation. `required` always does.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusFilter {
    pub include_planned: bool,
    pub include_optional: bool,
}

impl StatusFilter {
    pub fn allows(&self, status: AssetStatus) -> bool {
        match status {
            AssetStatus::Required => true,
            AssetStatus::Planned => self.include_planned,
            AssetStatus::Optional => self.include_optional,
            AssetStatus::Other => false,
        }
    }
}

impl ValidationReport {
    /// Expand `index` and check each allowed asset for existence on disk.
    pub fn build(index: &AssetIndex, filter: StatusFilter) -> Self {
        Self::build_with(index, filter, false)
    }

    /// Like `build`; with `check_size`, present PNGs that declare a size are
    /// compared against their header dimensions.
    pub fn build_with(index: &AssetIndex, filter: StatusFilter, check_size: bool) -> Self {
        let expansion = expand_index(index);
        let mut report = ValidationReport {
            root: index.root.clone(),
            expansion_errors: expansion.errors,
            ..Default::default()
        };
        for asset in expansion.assets.into_iter().filter(|a| filter.allows(a.status)) {
            report.checked += 1;
            if asset.full_path.exists() {
                report.present += 1;
                let Some(expected) = asset.size.map(|s| s.to_pair()) else {
                    continue;
                };
                if check_size && is_png(&asset.rel_path, asset.format.as_deref()) {
                    match png_size(&asset.full_path) {
                        Some(actual) if actual != expected => {
                            report.size_mismatches.push(SizeMismatch {
                                rel_path: asset.rel_path,
                                full_path: Some(asset.full_path),
                                expected_size: expected,
                                actual_size: Some(actual),
                            })
                        }
                        _ => {}
                    }
                }
                continue;
            }
            report.missing.push(MissingAsset {
                rel_path: asset.rel_path,
                full_path: Some(asset.full_path),
                status: Some(asset.status),
                format: asset.format,
                expected_size: asset.size.map(|s| s.to_pair()),
            });
        }
        report
    }

    /// Check sprite-sheet table rows against the files under `self.root`.
    ///
    /// Missing files are listed; present ones must be PNGs of the expected size.
    pub fn check_spritesheets(&mut self, spec: &str, entries: Vec<SheetEntry>) {
        let root = PathBuf::from(&self.root);
        for entry in &entries {
            let full_path = root.join(&entry.rel_path);
            if !full_path.exists() {
                self.spritesheet_missing.push(entry.rel_path.clone());
                continue;
            }
            self.spritesheet_checked += 1;
            let actual = png_size(&full_path);
            if actual != Some(entry.expected_size) {
                self.spritesheet_size_mismatches.push(SizeMismatch {
                    rel_path: entry.rel_path.clone(),
                    full_path: Some(full_path),
                    expected_size: entry.expected_size,
                    actual_size: actual,
                });
            }
        }
        self.spritesheet_spec = Some(spec.to_string());
        self.spritesheet_entries = entries;
    }

    /// Whether the report should fail a validation run.
    pub fn has_failures(&self, strict_spritesheets: bool) -> bool {
        !self.missing.is_empty()
            || !self.size_mismatches.is_empty()
            || !self.spritesheet_size_mismatches.is_empty()
            || (strict_spritesheets && !self.spritesheet_missing.is_empty())
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::configuration(format!("cannot read report {}: {}", path.display(), e))
        })?;
        serde_json::from_str(raw.trim_start_matches('\u{feff}')).map_err(|e| {
            AppError::configuration(format!("malformed report {}: {}", path.display(), e))
        })
    }

    pub fn write(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
