//! API-format workflow documents (node id -> node record).
//!
//! The document stays opaque: callers see nodes through small typed views
//! (`NodeRef`/`NodeMut`) that expose the class type, the `_meta.title` and
//! the `inputs` map, and everything else is carried through untouched.
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobDocument(Map<String, Value>);

pub struct NodeRef<'a> {
    pub id: &'a str,
    pub class_type: &'a str,
    pub title: &'a str,
    pub inputs: &'a Map<String, Value>,
}

pub struct NodeMut<'a> {
    pub id: &'a str,
    pub class_type: String,
    pub inputs: &'a mut Map<String, Value>,
}

pub(crate) fn is_int(v: &Value) -> bool {
    v.is_i64() || v.is_u64()
}

impl NodeRef<'_> {
    pub fn has_str(&self, key: &str) -> bool {
        self.inputs.get(key).is_some_and(Value::is_string)
    }

    pub fn has(&self, key: &str) -> bool {
        self.inputs.contains_key(key)
    }
}

impl NodeMut<'_> {
    pub fn has_int(&self, key: &str) -> bool {
        self.inputs.get(key).is_some_and(is_int)
    }

    pub fn has_str(&self, key: &str) -> bool {
        self.inputs.get(key).is_some_and(Value::is_string)
    }

    pub fn has_number(&self, key: &str) -> bool {
        self.inputs.get(key).is_some_and(Value::is_number)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.inputs.insert(key.to_string(), value.into());
    }
}

impl JobDocument {
    /// Read a workflow exported with "Save (API Format)".
    ///
    /// Accepts the bare graph or a `{"prompt": {...}}` wrapper.
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::configuration(format!("cannot read workflow {}: {}", path.display(), e))
        })?;
        let value: Value = serde_json::from_str(raw.trim_start_matches('\u{feff}')).map_err(|e| {
            AppError::configuration(format!("malformed workflow {}: {}", path.display(), e))
        })?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> AppResult<Self> {
        let graph = match value {
            Value::Object(mut map) if map.get("prompt").is_some_and(Value::is_object) => {
                map.remove("prompt").unwrap_or_default()
            }
            other => other,
        };
        let Value::Object(map) = graph else {
            return Err(AppError::configuration("workflow must be a JSON object of nodes"));
        };
        let document = JobDocument(map);
        if !document.is_probably_graph() {
            return Err(AppError::configuration(
                "workflow has no node with a class_type; export it in API format",
            ));
        }
        Ok(document)
    }

    pub fn is_probably_graph(&self) -> bool {
        self.0
            .values()
            .any(|node| node.get("class_type").and_then(Value::as_str).is_some())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Value> {
        self.0.get(id)
    }

    pub fn inputs_mut(&mut self, id: &str) -> Option<&mut Map<String, Value>> {
        self.0.get_mut(id)?.get_mut("inputs")?.as_object_mut()
    }

    /// Nodes that carry an `inputs` object, in document order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.0.iter().filter_map(|(id, node)| {
            let inputs = node.get("inputs")?.as_object()?;
            Some(NodeRef {
                id,
                class_type: node.get("class_type").and_then(Value::as_str).unwrap_or_default(),
                title: node
                    .get("_meta")
                    .and_then(|m| m.get("title"))
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
                inputs,
            })
        })
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = NodeMut<'_>> {
        self.0.iter_mut().filter_map(|(id, node)| {
            let class_type =
                node.get("class_type").and_then(Value::as_str).unwrap_or_default().to_string();
            let inputs = node.get_mut("inputs")?.as_object_mut()?;
            Some(NodeMut { id, class_type, inputs })
        })
    }

    /// Set a value at a dotted path such as `3.inputs.denoise`.
    ///
    /// Every segment but the last must already exist. The path starts at a
    /// node, so a lone segment never adds a top-level key.
    pub fn set_path(&mut self, path: &[String], new_val: Value) -> bool {
        let Some((last, parents)) = path.split_last() else {
            return false;
        };
        let Some((first, rest)) = parents.split_first() else {
            return false;
        };
        let mut cur = match self.0.get_mut(first) {
            Some(v) => v,
            None => return false,
        };
        for key in rest {
            cur = match cur.as_object_mut().and_then(|map| map.get_mut(key)) {
                Some(next) => next,
                None => return false,
            };
        }
        match cur.as_object_mut() {
            Some(map) => {
                map.insert(last.clone(), new_val);
                true
            }
            None => false,
        }
    }

    /// Body for `POST /prompt`.
    pub fn to_submission(&self) -> Value {
        json!({ "prompt": self.0 })
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Parse `KEY=VALUE` overrides; values are JSON when they parse as JSON.
pub fn parse_set_pairs(items: &[String]) -> AppResult<Vec<(Vec<String>, Value)>> {
    items
        .iter()
        .map(|item| {
            let (key, val) = item.split_once('=').ok_or_else(|| {
                AppError::configuration(format!("invalid override '{}', expected KEY=VALUE", item))
            })?;
            let path: Vec<String> = key.split('.').map(str::to_string).collect();
            if path.len() < 2 || path.iter().any(String::is_empty) {
                return Err(AppError::configuration(format!(
                    "invalid override '{}', expected NODE.KEY[.KEY...]=VALUE",
                    item
                )));
            }
            Ok((path, parse_value(val)))
        })
        .collect()
}

pub fn parse_value(src: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(src) {
        return v;
    }
    match src.to_ascii_lowercase().as_str() {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(src.to_string()),
    }
}
