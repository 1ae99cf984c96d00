//! Reading, merging and writing configuration documents.

use crate::error::{ReconcileError, Result, json_type_name};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;

/// Field holding the tileset mapping.
pub const DATA_FIELD: &str = "data";

/// A JSON configuration document: always an object.
pub type Document = Map<String, Value>;

/// Read and parse a configuration document.
pub fn load(path: &Path) -> Result<Document> {
    let content = std::fs::read_to_string(path).map_err(|e| ReconcileError::read(path, e))?;
    parse(path, &content)
}

/// Parse document text; `path` only labels errors.
pub fn parse(path: &Path, content: &str) -> Result<Document> {
    let value: Value = serde_json::from_str(content).map_err(|source| ReconcileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ReconcileError::NotAnObject {
            path: path.to_path_buf(),
        }),
    }
}

/// Take the `data` mapping out of a runtime document.
///
/// A missing or null `data` yields an empty mapping.
pub fn take_data(document: &mut Document, path: &Path) -> Result<Map<String, Value>> {
    match document.remove(DATA_FIELD) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(data)) => Ok(data),
        Some(other) => Err(ReconcileError::InvalidData {
            path: path.to_path_buf(),
            found: json_type_name(&other),
        }),
    }
}

/// Replace the template's `data` wholesale, keeping every other field and its position.
pub fn merge_data(mut template: Document, data: Map<String, Value>) -> Document {
    template.insert(DATA_FIELD.to_string(), Value::Object(data));
    template
}

/// Serialize with two-space indentation and a trailing newline.
pub fn render(document: &Document) -> Result<String> {
    let mut text = serde_json::to_string_pretty(document).map_err(ReconcileError::Serialize)?;
    text.push('\n');
    Ok(text)
}

/// Replace `path` with `contents` in one step.
///
/// The text goes to a temporary file next to `path` which is then renamed
/// over it, so readers never see a half-written document.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| ReconcileError::write(path, e))?;
    temp.write_all(contents.as_bytes())
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| ReconcileError::write(path, e))?;
    // Keep the mode of the file being replaced; temp files are created 0600
    if let Ok(existing) = std::fs::metadata(path) {
        temp.as_file()
            .set_permissions(existing.permissions())
            .map_err(|e| ReconcileError::write(path, e))?;
    }
    temp.persist(path)
        .map_err(|e| ReconcileError::write(path, e.error))?;
    Ok(())
}
