//! Pattern expansion: `{var}` templates over the cartesian product of lists.
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::{AppError, AppResult};
use crate::index::model::{AssetIndex, Entry, EntryKind, ExpandedAsset, SizeSpec, VarBindings};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder regex is valid"));

/// Expand `pattern` over every combination of the bound lists.
///
/// Variables nest in declaration order: the first binding is the outermost
/// loop. There is no cap on the number of combinations.
pub fn expand_pattern(
    pattern: &str,
    vars: &VarBindings,
    lists: &BTreeMap<String, Vec<String>>,
) -> AppResult<Vec<String>> {
    let mut placeholders = PLACEHOLDER.captures_iter(pattern).map(|c| c[1].to_string()).peekable();
    if placeholders.peek().is_none() {
        return Ok(vec![pattern.to_string()]);
    }
    if let Some(unbound) = placeholders.find(|name| vars.list_for(name).is_none()) {
        return Err(AppError::configuration(format!(
            "placeholder {{{}}} in '{}' has no vars binding",
            unbound, pattern
        )));
    }

    let mut columns = Vec::new();
    for (var, list_name) in vars.iter() {
        let values = lists.get(list_name).ok_or_else(|| {
            AppError::configuration(format!("unknown list '{}' for '{}'", list_name, var))
        })?;
        columns.push((format!("{{{}}}", var), values));
    }

    let expanded = columns.iter().fold(vec![pattern.to_string()], |partial, (token, values)| {
        partial
            .iter()
            .flat_map(|prefix| {
                values.iter().map(move |value| prefix.replace(token.as_str(), value))
            })
            .collect()
    });
    Ok(expanded)
}

/// Relative paths named by a single entry.
pub fn expand_entry(
    entry: &Entry,
    lists: &BTreeMap<String, Vec<String>>,
) -> AppResult<Vec<String>> {
    match &entry.kind {
        EntryKind::File { path } if path.is_empty() => {
            Err(AppError::configuration("file entry without a path"))
        }
        EntryKind::File { path } => Ok(vec![path.clone()]),
        EntryKind::Pattern { pattern, vars } => expand_pattern(pattern, vars, lists),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionError {
    pub entry: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Expansion {
    pub assets: Vec<ExpandedAsset>,
    pub errors: Vec<ExpansionError>,
}

impl Expansion {
    pub fn rel_paths(&self) -> Vec<&str> {
        self.assets.iter().map(|a| a.rel_path.as_str()).collect()
    }
}

/// Expand every entry of `index`.
///
/// A broken entry contributes no assets; its error is logged and returned in
/// `Expansion::errors` so callers can surface the count.
pub fn expand_index(index: &AssetIndex) -> Expansion {
    let mut expansion = Expansion::default();
    for (position, entry) in index.entries.iter().enumerate() {
        match expand_entry(entry, &index.lists) {
            Ok(paths) => {
                let size = entry.size.as_ref().and_then(SizeSpec::resolve);
                expansion.assets.extend(paths.into_iter().map(|rel_path| ExpandedAsset {
                    full_path: index.full_path(&rel_path),
                    rel_path,
                    size,
                    format: entry.format.clone(),
                    status: entry.status,
                    entry: position,
                }));
            }
            Err(e) => {
                tracing::warn!("skipping index entry #{}: {}", position, e);
                expansion.errors.push(ExpansionError { entry: position, message: e.to_string() });
            }
        }
    }
    expansion
}
