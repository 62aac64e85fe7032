//! # Reference Resolver
//!
//! Translates declarative references (UIDs, titles, folder-qualified
//! notations, field selectors, file attachments, whole folders) into
//! concrete vault queries and projections.
//!
//! Resolution order: folder-qualified locators resolve the folder path
//! through the [`FolderTree`] first, then match the record inside the
//! folder by title or UID; bare locators classify as UID or title.

pub mod folder_tree;
pub mod notation;

pub use folder_tree::FolderTree;
pub use notation::SelectorKind;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{FolderReference, Reference};
use crate::error::{AgentError, Result};
use crate::vault::record::{FieldValue, Record};
use crate::vault::VaultProvider;

/// Result of resolving one reference.
#[derive(Debug)]
pub struct Resolved {
    /// Raw selector projection, when the reference names one. Rendering is
    /// driven by the fields mapping otherwise.
    pub selected: Option<Vec<u8>>,
    /// External field key -> projected value, after partial projection.
    pub fields: BTreeMap<String, FieldValue>,
    /// The full, unfiltered field mapping. Kubernetes Secret merges work
    /// against this one; the partial projection only shapes file output.
    pub all_fields: BTreeMap<String, FieldValue>,
    /// Fields-and-files JSON projection, after partial projection.
    pub projection: Value,
}

pub struct Resolver {
    provider: Arc<VaultProvider>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(provider: Arc<VaultProvider>) -> Self {
        Self { provider }
    }

    /// Resolve one reference to its payload.
    pub async fn resolve(&self, reference: &Reference) -> Result<Resolved> {
        let parts = self.locator_parts(reference)?;
        let record = self.locate(&parts).await?;

        let selected = match parts.selector {
            None => None,
            Some(kind) => Some(
                self.apply_selector(&record, kind, parts.parameter.as_deref())
                    .await?,
            ),
        };

        let all_fields = record.field_map();
        let mut fields = all_fields.clone();
        if let Some(keys) = &reference.fields {
            fields.retain(|key, _| keys.iter().any(|k| k == key));
        }
        let projection = record.projection(reference.fields.as_deref());

        Ok(Resolved {
            selected,
            fields,
            all_fields,
            projection,
        })
    }

    /// Resolve a folder reference to `(title, fields JSON)` pairs, one per
    /// child record.
    pub async fn resolve_folder(&self, folder: &FolderReference) -> Result<Vec<(String, String)>> {
        let folder_uid = if let Some(uid) = &folder.uid {
            uid.clone()
        } else {
            let path = folder.path.as_deref().unwrap_or_default();
            let segments: Vec<String> = notation::split_segments(path)
                .into_iter()
                .map(str::to_string)
                .collect();
            let tree = FolderTree::build(&self.provider.list_folders().await?);
            tree.resolve_path(&segments)
                .ok_or_else(|| AgentError::NotFound(format!("folder path {path}")))?
                .to_string()
        };

        let records = self.provider.records_in_folder(&folder_uid).await?;
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let json = serde_json::to_string_pretty(&record.fields_json())
                .map_err(|e| AgentError::Render(e.to_string()))?;
            entries.push((record.title, json));
        }
        Ok(entries)
    }

    /// Merge the structured reference fields and any notation string into
    /// one normalized locator.
    fn locator_parts(&self, reference: &Reference) -> Result<LocatorParts> {
        let mut parts = if let Some(input) = &reference.notation {
            let parsed = notation::parse(input)?;
            LocatorParts {
                folder_path: parsed.folder_path,
                record: parsed.record,
                uid_lookup: false,
                selector: parsed.selector,
                parameter: parsed.parameter,
            }
        } else {
            let folder_path: Vec<String> = reference
                .folder_path
                .as_deref()
                .map(|p| {
                    notation::split_segments(p)
                        .into_iter()
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            if let Some(uid) = &reference.uid {
                LocatorParts {
                    folder_path,
                    record: uid.clone(),
                    uid_lookup: true,
                    selector: None,
                    parameter: None,
                }
            } else {
                let record = reference
                    .record_name
                    .clone()
                    .or_else(|| reference.title.clone())
                    .ok_or_else(|| {
                        AgentError::ConfigInvalid(format!(
                            "reference {} has no usable locator",
                            reference.name
                        ))
                    })?;
                LocatorParts {
                    folder_path,
                    record,
                    uid_lookup: false,
                    selector: None,
                    parameter: None,
                }
            }
        };

        // An explicit selector on the reference wins over one embedded in
        // the notation string.
        if let Some(selector) = &reference.field_selector {
            parts.selector = Some(selector.kind);
            parts.parameter = selector.parameter.clone();
        }

        Ok(parts)
    }

    async fn locate(&self, parts: &LocatorParts) -> Result<Record> {
        if !parts.folder_path.is_empty() {
            let tree = FolderTree::build(&self.provider.list_folders().await?);
            let folder_uid = tree
                .resolve_path(&parts.folder_path)
                .ok_or_else(|| {
                    AgentError::NotFound(format!("folder path {}", parts.folder_path.join("/")))
                })?
                .to_string();
            let matches: Vec<Record> = self
                .provider
                .records_in_folder(&folder_uid)
                .await?
                .into_iter()
                .filter(|r| r.uid == parts.record || r.title == parts.record)
                .collect();
            return self.provider.pick_single(&parts.record, matches);
        }

        if parts.uid_lookup || notation::is_uid(&parts.record) {
            self.provider.get_by_uid(&parts.record).await
        } else {
            self.provider.get_by_title(&parts.record).await
        }
    }

    async fn apply_selector(
        &self,
        record: &Record,
        kind: SelectorKind,
        parameter: Option<&str>,
    ) -> Result<Vec<u8>> {
        let named = |what: &str| -> Result<&str> {
            parameter.ok_or_else(|| {
                AgentError::ConfigInvalid(format!("{what} selector on {} needs a name", record.title))
            })
        };

        match kind {
            SelectorKind::Field => {
                let name = named("field")?;
                record
                    .standard_field(name)
                    .ok_or_else(|| {
                        AgentError::NotFound(format!("field {name} on {}", record.title))
                    })?
                    .projected()
                    .to_bytes()
            }
            SelectorKind::CustomField => {
                let name = named("custom_field")?;
                record
                    .custom_field(name)
                    .ok_or_else(|| {
                        AgentError::NotFound(format!("custom field {name} on {}", record.title))
                    })?
                    .projected()
                    .to_bytes()
            }
            SelectorKind::File => {
                let name = named("file")?;
                self.provider.download_from(record, name).await
            }
            SelectorKind::Type => Ok(record.record_type.clone().into_bytes()),
            SelectorKind::Title => Ok(record.title.clone().into_bytes()),
            // Absent notes project to an empty byte string.
            SelectorKind::Notes => Ok(record.notes.clone().unwrap_or_default().into_bytes()),
        }
    }
}

#[derive(Debug)]
struct LocatorParts {
    folder_path: Vec<String>,
    record: String,
    uid_lookup: bool,
    selector: Option<SelectorKind>,
    parameter: Option<String>,
}
