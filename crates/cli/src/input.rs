//! Reading Kubernetes objects from files

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

/// Read objects from a JSON file holding either an array or a Kubernetes
/// `List` (anything with an `items` array).
pub fn read_objects<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_objects(&content).with_context(|| format!("Invalid objects in {}", path.display()))
}

/// Like [`read_objects`], but a missing path yields no objects
pub fn read_optional<T: DeserializeOwned>(path: Option<&Path>) -> Result<Vec<T>> {
    path.map(read_objects).transpose().map(Option::unwrap_or_default)
}

pub fn parse_objects<T: DeserializeOwned>(content: &str) -> Result<Vec<T>> {
    let value: Value = serde_json::from_str(content).context("File is not valid JSON")?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("items") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) => Vec::new(),
            _ => bail!("expected a JSON array or an object with an 'items' array"),
        },
        _ => bail!("expected a JSON array or an object with an 'items' array"),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| serde_json::from_value(item).with_context(|| format!("item {}", i)))
        .collect()
}
