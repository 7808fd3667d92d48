//! Persisted per-asset spec records and asset index discovery.
//!
//! Specs live as JSON files under the specs directory. Their `status` is
//! recomputed from the filesystem on every read.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::index::{expand_index, AssetIndex, AssetSize, AssetStatus, ExpansionError};
use crate::prompt::{PathClassifier, Style};

const INDEX_SUFFIX: &str = "-index.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecStatus {
    #[default]
    Planned,
    Generated,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecParams {
    /// Positive prompt per preset name, plus `default`.
    #[serde(default)]
    pub prompts: BTreeMap<String, String>,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Asset path relative to the project root.
    #[serde(default)]
    pub path: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub params: SpecParams,
    #[serde(default)]
    pub status: SpecStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_kind() -> String {
    "image".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub id: String,
    pub root: String,
    pub entries: usize,
    pub assets: usize,
    pub present: usize,
    pub expansion_errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexAssetView {
    pub rel_path: String,
    pub full_path: String,
    pub size: Option<AssetSize>,
    pub format: Option<String>,
    pub status: AssetStatus,
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpandedIndexView {
    pub id: String,
    pub root: String,
    pub lists: BTreeMap<String, Vec<String>>,
    pub assets: Vec<IndexAssetView>,
    pub errors: Vec<ExpansionError>,
}

#[derive(Debug, Clone)]
pub struct SpecStore {
    project_root: PathBuf,
    specs_dir: PathBuf,
}

fn json_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> AppResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                json_files(&path, true, out)?;
            }
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}

fn is_index_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(INDEX_SUFFIX))
}

impl SpecStore {
    pub fn new(project_root: impl Into<PathBuf>, specs_dir: impl Into<PathBuf>) -> Self {
        SpecStore { project_root: project_root.into(), specs_dir: specs_dir.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.project_root.clone(), config.specs_dir.clone())
    }

    pub fn specs_dir(&self) -> &Path {
        &self.specs_dir
    }

    pub fn status_of(&self, record: &SpecRecord) -> SpecStatus {
        if !record.path.is_empty() && self.project_root.join(&record.path).exists() {
            SpecStatus::Generated
        } else {
            SpecStatus::Planned
        }
    }

    /// Every spec under the specs directory, sorted by asset path.
    pub fn list_specs(&self) -> AppResult<Vec<SpecRecord>> {
        if !self.specs_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        json_files(&self.specs_dir, true, &mut files)?;

        let mut specs = Vec::new();
        for file in files.iter().filter(|f| !is_index_file(f)) {
            let parsed = std::fs::read_to_string(file).map_err(AppError::from).and_then(|raw| {
                Ok(serde_json::from_str::<SpecRecord>(raw.trim_start_matches('\u{feff}'))?)
            });
            match parsed {
                Ok(mut record) => {
                    record.status = self.status_of(&record);
                    specs.push(record);
                }
                Err(e) => tracing::warn!("Error loading spec {}: {}", file.display(), e),
            }
        }
        specs.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.id.cmp(&b.id)));
        Ok(specs)
    }

    /// Write `record` to `<specs>/<id>.json`, assigning a random id if needed.
    pub fn save_spec(&self, mut record: SpecRecord) -> AppResult<SpecRecord> {
        if record.id.is_empty() {
            record.id = uuid::Uuid::new_v4().to_string();
        }
        std::fs::create_dir_all(&self.specs_dir)?;
        let path = self.specs_dir.join(format!("{}.json", record.id));
        record.status = self.status_of(&record);
        std::fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        tracing::info!("saved spec {} -> {}", record.id, path.display());
        Ok(record)
    }

    /// One spec per classifiable asset of `index`, under `<specs>/<kit>/`.
    ///
    /// Ids are name-based so re-running overwrites the same files.
    pub fn create_from_index(&self, index: &AssetIndex, kit: &str) -> AppResult<usize> {
        let classifier = PathClassifier::new();
        let expansion = expand_index(index);
        let root = index.root.trim_end_matches('/');
        let mut created = 0;

        for asset in &expansion.assets {
            let mut prompts = BTreeMap::new();
            let mut negative = String::new();
            for style in Style::ALL {
                let Some(pair) = classifier.classify(&asset.rel_path, style) else {
                    continue;
                };
                if style == Style::default() {
                    prompts.insert("default".to_string(), pair.positive.clone());
                    negative = pair.negative;
                }
                prompts.insert(style.name().to_string(), pair.positive);
            }
            if prompts.is_empty() {
                tracing::debug!("no prompt mapping for {}, no spec written", asset.rel_path);
                continue;
            }

            let full_rel = if root.is_empty() {
                asset.rel_path.clone()
            } else {
                format!("{}/{}", root, asset.rel_path)
            };
            let rel = Path::new(&asset.rel_path);
            let record = SpecRecord {
                id: uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, full_rel.as_bytes()).to_string(),
                name: rel.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string(),
                path: full_rel,
                kind: default_kind(),
                kit: Some(kit.to_string()),
                params: SpecParams { prompts, negative_prompt: negative, extra: Map::new() },
                ..Default::default()
            };

            let target = self.specs_dir.join(kit).join(rel.with_extension("json"));
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, serde_json::to_string_pretty(&record)?)?;
            created += 1;
        }
        tracing::info!("Created {} specs for kit {}", created, kit);
        Ok(created)
    }

    /// `*-index.json` files directly inside the specs directory.
    pub fn index_paths(&self) -> AppResult<Vec<PathBuf>> {
        if !self.specs_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        json_files(&self.specs_dir, false, &mut files)?;
        files.retain(|f| is_index_file(f));
        files.sort();
        Ok(files)
    }

    fn index_id(path: &Path) -> String {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.trim_end_matches(INDEX_SUFFIX).to_string())
            .unwrap_or_default()
    }

    pub fn load_index(&self, id: &str) -> AppResult<AssetIndex> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(AppError::configuration(format!("invalid index id '{}'", id)));
        }
        let path = self.specs_dir.join(format!("{}{}", id, INDEX_SUFFIX));
        if !path.is_file() {
            return Err(AppError::NotFound(format!("index '{}'", id)));
        }
        AssetIndex::load(&path)
    }

    /// The index with its root resolved against the project root.
    pub fn rooted(&self, index: &AssetIndex) -> AssetIndex {
        let mut rooted = index.clone();
        rooted.root = self.project_root.join(&index.root).to_string_lossy().into_owned();
        rooted
    }

    pub fn list_indexes(&self) -> AppResult<Vec<IndexSummary>> {
        let mut out = Vec::new();
        for path in self.index_paths()? {
            let index = match AssetIndex::load(&path) {
                Ok(index) => index,
                Err(e) => {
                    tracing::warn!("skipping index {}: {}", path.display(), e);
                    continue;
                }
            };
            let expansion = expand_index(&self.rooted(&index));
            out.push(IndexSummary {
                id: Self::index_id(&path),
                root: index.root.clone(),
                entries: index.entries.len(),
                assets: expansion.assets.len(),
                present: expansion.assets.iter().filter(|a| a.full_path.exists()).count(),
                expansion_errors: expansion.errors.len(),
            });
        }
        Ok(out)
    }

    pub fn expanded_index(&self, id: &str) -> AppResult<ExpandedIndexView> {
        let index = self.load_index(id)?;
        let expansion = expand_index(&self.rooted(&index));
        let root = Path::new(&index.root);
        let assets = expansion
            .assets
            .into_iter()
            .map(|asset| IndexAssetView {
                exists: asset.full_path.exists(),
                full_path: root.join(&asset.rel_path).to_string_lossy().into_owned(),
                rel_path: asset.rel_path,
                size: asset.size,
                format: asset.format,
                status: asset.status,
            })
            .collect();
        Ok(ExpandedIndexView {
            id: id.to_string(),
            root: index.root,
            lists: index.lists,
            assets,
            errors: expansion.errors,
        })
    }
}
