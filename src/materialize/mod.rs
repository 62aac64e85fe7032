//! # Materializer
//!
//! Format/template rendering, atomic file writes under tight permission
//! constraints, folder projection, and downstream Kubernetes Secret
//! reconciliation.

pub mod k8s_secret;
pub mod render;
pub mod write;

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{AgentError, Result};

/// Sanitize a record title into a filename: `[A-Za-z0-9._-]` is kept,
/// space maps to `-`, every other byte is dropped.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => Some(c),
            _ => None,
        })
        .collect()
}

/// Canonical cacheable payload for a folder reference: a JSON object of
/// sanitized filename to file content. Titles colliding after
/// sanitization keep the last record.
pub fn folder_payload(entries: &[(String, String)]) -> Result<Vec<u8>> {
    let files: BTreeMap<String, &String> = entries
        .iter()
        .map(|(title, content)| (format!("{}.json", sanitize_title(title)), content))
        .collect();
    serde_json::to_vec(&files).map_err(|e| AgentError::Render(e.to_string()))
}

/// Materialize a folder payload into `<dir>/<name>` files.
pub fn write_folder(dir: &Path, payload: &[u8]) -> Result<()> {
    let files: BTreeMap<String, String> =
        serde_json::from_slice(payload).map_err(|e| AgentError::Render(e.to_string()))?;
    write::ensure_dir(dir)?;
    for (name, content) in &files {
        write::write_atomic(&dir.join(name), content.as_bytes())?;
    }
    Ok(())
}
