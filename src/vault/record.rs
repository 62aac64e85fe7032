//! # Vault Records
//!
//! Domain types for Keeper vault entities: records, fields, file
//! attachments, and folders.
//!
//! Field values are heterogeneous (scalar string, list, object). They are
//! modelled as a tagged sum with a single projection to bytes: scalars emit
//! their raw string, everything else is JSON-encoded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};

/// A single typed, labelled, possibly multi-valued record attribute.
///
/// Standard and custom fields share this shape. The external key is the
/// label when non-empty, the type otherwise.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Field {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub value: Vec<Value>,
}

impl Field {
    /// External key of this field: `label` if non-empty, else `type`.
    pub fn key(&self) -> &str {
        match self.label.as_deref() {
            Some(label) if !label.is_empty() => label,
            _ => &self.field_type,
        }
    }

    /// Whether `name` addresses this field, by label or by type.
    pub fn matches(&self, name: &str) -> bool {
        self.key() == name || self.field_type == name
    }

    pub fn projected(&self) -> FieldValue {
        FieldValue::from_values(&self.value)
    }
}

/// Projection of a field's value list.
///
/// A one-element value list is unwrapped; longer lists are preserved.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(String),
    Sequence(Vec<Value>),
    Structured(serde_json::Map<String, Value>),
}

impl FieldValue {
    pub fn from_values(values: &[Value]) -> Self {
        match values {
            [] => Self::Scalar(String::new()),
            [Value::String(s)] => Self::Scalar(s.clone()),
            [Value::Object(map)] => Self::Structured(map.clone()),
            [Value::Array(items)] => Self::Sequence(items.clone()),
            [single] => Self::Scalar(single.to_string()),
            many => Self::Sequence(many.to_vec()),
        }
    }

    /// Scalar values emit their raw bytes; everything else is JSON-encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Scalar(s) => Ok(s.clone().into_bytes()),
            other => serde_json::to_vec(&other.as_json())
                .map_err(|e| AgentError::Render(e.to_string())),
        }
    }

    pub fn as_json(&self) -> Value {
        match self {
            Self::Scalar(s) => Value::String(s.clone()),
            Self::Sequence(items) => Value::Array(items.clone()),
            Self::Structured(map) => Value::Object(map.clone()),
        }
    }

    /// The scalar string when this value is one, None otherwise.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

/// Metadata of a file attachment; content is fetched lazily through the
/// vault client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
}

/// A vault record: fields and file attachments under a unique identifier
/// and a human title (titles are not necessarily unique).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub uid: String,
    pub title: String,
    #[serde(rename = "type", default)]
    pub record_type: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub custom: Vec<Field>,
    #[serde(default)]
    pub files: Vec<FileRef>,
    /// Primary folder placement, when shared through a folder.
    #[serde(default)]
    pub folder_uid: Option<String>,
    /// Nested-folder placement inside a shared folder.
    #[serde(default)]
    pub inner_folder_uid: Option<String>,
}

impl Record {
    /// Look up a standard field by external key or type.
    pub fn standard_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.matches(name))
    }

    /// Look up a custom field by external key or type.
    pub fn custom_field(&self, name: &str) -> Option<&Field> {
        self.custom.iter().find(|f| f.matches(name))
    }

    /// Find an attachment by filename or title.
    pub fn find_file(&self, name: &str) -> Option<&FileRef> {
        self.files
            .iter()
            .find(|f| f.name == name || (!f.title.is_empty() && f.title == name))
    }

    /// Whether this record lives in `folder_uid`, either as its primary
    /// folder or through an inner-folder reference.
    pub fn in_folder(&self, folder_uid: &str) -> bool {
        self.folder_uid.as_deref() == Some(folder_uid)
            || self.inner_folder_uid.as_deref() == Some(folder_uid)
    }

    /// Ordered mapping of external field key to projected value, standard
    /// fields first, custom fields after (later keys win on collision).
    pub fn field_map(&self) -> BTreeMap<String, FieldValue> {
        let mut map = BTreeMap::new();
        for field in self.fields.iter().chain(self.custom.iter()) {
            map.insert(field.key().to_string(), field.projected());
        }
        map
    }

    /// JSON object of the fields mapping alone.
    pub fn fields_json(&self) -> Value {
        Value::Object(
            self.field_map()
                .into_iter()
                .map(|(key, value)| (key, value.as_json()))
                .collect(),
        )
    }

    /// JSON projection of the fields mapping (optionally restricted to
    /// `keys`) plus attachment metadata when any attachments exist.
    pub fn projection(&self, keys: Option<&[String]>) -> Value {
        let mut object = serde_json::Map::new();
        for (key, value) in self.field_map() {
            if let Some(wanted) = keys {
                if !wanted.iter().any(|k| k == &key) {
                    continue;
                }
            }
            object.insert(key, value.as_json());
        }
        if !self.files.is_empty() {
            let files: Vec<Value> = self
                .files
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "name": f.name,
                        "title": f.title,
                        "mediaType": f.media_type,
                        "size": f.size,
                    })
                })
                .collect();
            object.insert("files".to_string(), Value::Array(files));
        }
        Value::Object(object)
    }
}

/// A vault folder. The set of folders under one authenticated context
/// forms a forest.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub parent_uid: Option<String>,
}
