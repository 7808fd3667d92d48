//! Declarative asset index documents (`*-index.json`).
//!
//! An index names a `root` directory, a set of named value lists, and an
//! ordered list of entries. Entries are either literal files or `{var}`
//! patterns expanded over the lists.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetIndex {
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub lists: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl AssetIndex {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::configuration(format!("cannot read index {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw).map_err(|e| match e {
            AppError::Configuration(msg) => {
                AppError::configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_json_str(raw: &str) -> AppResult<Self> {
        // Some Windows tooling writes a BOM in front of the document.
        let raw = raw.trim_start_matches('\u{feff}');
        serde_json::from_str(raw)
            .map_err(|e| AppError::configuration(format!("malformed asset index: {}", e)))
    }

    /// Path of an expanded asset on disk, relative to the process cwd.
    pub fn full_path(&self, rel_path: &str) -> PathBuf {
        Path::new(&self.root).join(rel_path)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    #[default]
    Required,
    Planned,
    Optional,
    /// Any status this tool does not know; never selected for validation.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    #[serde(flatten)]
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub status: AssetStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntryKind {
    File {
        path: String,
    },
    Pattern {
        pattern: String,
        #[serde(default)]
        vars: VarBindings,
    },
}

/// Ordered `varName -> listName` bindings of a pattern entry.
///
/// Declaration order is kept: it decides the nesting of the cartesian product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct VarBindings(Vec<(String, String)>);

impl VarBindings {
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        VarBindings(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn list_for(&self, var: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == var).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Map<String, Value>> for VarBindings {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        map.into_iter()
            .map(|(var, list)| match list {
                Value::String(name) => Ok((var, name)),
                other => Err(format!("vars.{} must name a list, got {}", var, other)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(VarBindings)
    }
}

impl From<VarBindings> for Map<String, Value> {
    fn from(bindings: VarBindings) -> Self {
        bindings.0.into_iter().map(|(k, v)| (k, Value::String(v))).collect()
    }
}

/// Declared size of an entry. Index authors write `"256x256"`,
/// `{"width": 256, "height": 256}` or `[256, 256]`.
///
/// Anything else is kept as written and resolves to no size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    Dims { width: u32, height: u32 },
    Pair([u32; 2]),
    Text(String),
    Unrecognized(Value),
}

impl SizeSpec {
    pub fn resolve(&self) -> Option<AssetSize> {
        match self {
            SizeSpec::Dims { width, height } => Some(AssetSize::new(*width, *height)),
            SizeSpec::Pair([width, height]) => Some(AssetSize::new(*width, *height)),
            SizeSpec::Text(text) => parse_size(text),
            SizeSpec::Unrecognized(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSize {
    pub width: u32,
    pub height: u32,
}

impl AssetSize {
    pub fn new(width: u32, height: u32) -> Self {
        AssetSize { width, height }
    }

    pub fn to_pair(self) -> [u32; 2] {
        [self.width, self.height]
    }
}

/// Parse `"WxH"` (case-insensitive, surrounding whitespace ignored).
pub fn parse_size(text: &str) -> Option<AssetSize> {
    let lower = text.trim().to_ascii_lowercase();
    let mut parts = lower.split('x');
    let width = parts.next()?.trim().parse().ok()?;
    let height = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(AssetSize::new(width, height))
}

/// One concrete asset produced by expanding an entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpandedAsset {
    pub rel_path: String,
    pub full_path: PathBuf,
    pub size: Option<AssetSize>,
    pub format: Option<String>,
    pub status: AssetStatus,
    /// Position of the source entry in `AssetIndex::entries`.
    pub entry: usize,
}
