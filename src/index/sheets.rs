//! Sprite-sheet tables from markdown docs.
//!
//! A table whose header names a file column plus either `frames` or `size`
//! describes sheets. Each row with a backticked path yields the expected
//! sheet size: the explicit `size` cell, else `frame size` times `frames`.
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

use crate::error::{AppError, AppResult};

static SIZE_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*x\s*(\d+)").expect("size cell regex is valid"));
static BACKTICK_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("backtick regex is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetEntry {
    pub rel_path: String,
    pub expected_size: [u32; 2],
}

#[derive(Default)]
struct Columns {
    file: Option<usize>,
    frame_size: Option<usize>,
    frames: Option<usize>,
    size: Option<usize>,
}

impl Columns {
    fn from_header(cells: &[String]) -> Option<Self> {
        let lower: Vec<String> = cells.iter().map(|c| c.to_lowercase()).collect();
        let names_file = lower.iter().any(|c| c.contains("file"));
        let names_dims = lower.iter().any(|c| c.contains("frame") || c == "size");
        if !names_file || !names_dims {
            return None;
        }
        let mut columns = Columns::default();
        for (idx, name) in lower.iter().enumerate() {
            if name.contains("file") && columns.file.is_none() {
                columns.file = Some(idx);
            }
            if name.contains("frame size") && columns.frame_size.is_none() {
                columns.frame_size = Some(idx);
            }
            if name == "frames" && columns.frames.is_none() {
                columns.frames = Some(idx);
            }
            if name == "size" && columns.size.is_none() {
                columns.size = Some(idx);
            }
        }
        Some(columns)
    }
}

fn size_cell(cell: &str) -> Option<[u32; 2]> {
    let caps = SIZE_CELL.captures(cell)?;
    Some([caps[1].parse().ok()?, caps[2].parse().ok()?])
}

fn int_cell(cell: &str) -> Option<u32> {
    let text = cell.trim();
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn row_entry(columns: &Columns, cells: &[String]) -> Option<SheetEntry> {
    let cell = |idx: Option<usize>| idx.and_then(|i| cells.get(i)).map(String::as_str);
    let rel_path = BACKTICK_PATH.captures(cell(columns.file)?)?[1].trim().to_string();
    if rel_path.is_empty() {
        return None;
    }
    let explicit = cell(columns.size).and_then(size_cell);
    let from_frames = || {
        let [width, height] = cell(columns.frame_size).and_then(size_cell)?;
        let frames = cell(columns.frames).and_then(int_cell).filter(|f| *f > 0)?;
        Some([width.checked_mul(frames)?, height])
    };
    let expected_size = explicit.or_else(from_frames)?;
    Some(SheetEntry { rel_path, expected_size })
}

/// Every sheet row of every qualifying table in `markdown`.
pub fn parse_sheet_tables(markdown: &str) -> Vec<SheetEntry> {
    let mut entries = Vec::new();
    let mut columns: Option<Columns> = None;
    for line in markdown.lines() {
        let line = line.trim();
        if !(line.starts_with('|') && line.ends_with('|') && line.len() >= 2) {
            columns = None;
            continue;
        }
        let cells: Vec<String> =
            line[1..line.len() - 1].split('|').map(|c| c.trim().to_string()).collect();
        let Some(current) = &columns else {
            columns = Columns::from_header(&cells);
            continue;
        };
        if cells.iter().all(|c| c.chars().all(|ch| ch == '-')) {
            continue;
        }
        if let Some(entry) = row_entry(current, &cells) {
            entries.push(entry);
        }
    }
    entries
}

/// Read sheet tables from a markdown file; a missing file has no entries.
pub fn load_sheet_spec(path: &Path) -> AppResult<Vec<SheetEntry>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(parse_sheet_tables(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("sprite-sheet spec {} not found", path.display());
            Ok(Vec::new())
        }
        Err(e) => Err(AppError::configuration(format!("cannot read {}: {}", path.display(), e))),
    }
}
