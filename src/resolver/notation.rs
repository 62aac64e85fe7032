//! # Notation Parsing
//!
//! Parses the reference notation language:
//!
//! ```text
//! notation := [folder-path "/"] record [ "/" selector [ "/" parameter ] ]
//! selector ∈ { field, custom_field, file, type, title, notes }
//! ```
//!
//! The optional `keeper://` prefix and leading/trailing/duplicate slashes
//! are stripped. Selector keywords form a closed set, so parsing scans the
//! segments left to right and splits at the first keyword; no regex.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

const SCHEME_PREFIX: &str = "keeper://";

/// Length of a record or folder UID.
const UID_LEN: usize = 22;

/// Whether `s` is a well-formed UID: exactly 22 characters from the
/// base64url alphabet. Anything else resolves as a title or path.
pub fn is_uid(s: &str) -> bool {
    s.len() == UID_LEN
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Which projection of a record a notation selector returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    Field,
    CustomField,
    File,
    Type,
    Title,
    Notes,
}

impl SelectorKind {
    pub fn from_keyword(segment: &str) -> Option<Self> {
        match segment {
            "field" => Some(Self::Field),
            "custom_field" => Some(Self::CustomField),
            "file" => Some(Self::File),
            "type" => Some(Self::Type),
            "title" => Some(Self::Title),
            "notes" => Some(Self::Notes),
            _ => None,
        }
    }

    /// Selectors that address a named field or file need a parameter.
    pub fn requires_parameter(self) -> bool {
        matches!(self, Self::Field | Self::CustomField | Self::File)
    }
}

/// Split a folder path or notation string into its segments, eliding empty
/// segments produced by leading/trailing/repeated slashes.
pub fn split_segments(input: &str) -> Vec<&str> {
    let trimmed = input.strip_prefix(SCHEME_PREFIX).unwrap_or(input);
    trimmed.split('/').filter(|s| !s.is_empty()).collect()
}

/// A parsed notation string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notation {
    pub folder_path: Vec<String>,
    pub record: String,
    pub selector: Option<SelectorKind>,
    pub parameter: Option<String>,
}

/// Parse a notation string. See the module docs for the grammar.
pub fn parse(input: &str) -> Result<Notation> {
    let segments = split_segments(input);
    if segments.is_empty() {
        return Err(AgentError::ConfigInvalid(format!("empty notation: {input:?}")));
    }

    // First segment equal to a selector keyword marks the split point.
    let split = segments
        .iter()
        .enumerate()
        .find_map(|(i, segment)| SelectorKind::from_keyword(segment).map(|kind| (i, kind)));

    match split {
        Some((0, _)) => Err(AgentError::ConfigInvalid(format!(
            "notation {input:?} has a selector but no record"
        ))),
        Some((at, selector)) => {
            let parameter = if segments.len() > at + 1 {
                Some(segments[at + 1..].join("/"))
            } else {
                None
            };
            if selector.requires_parameter() && parameter.is_none() {
                return Err(AgentError::ConfigInvalid(format!(
                    "notation {input:?} is missing the {} name",
                    segments[at]
                )));
            }
            Ok(Notation {
                folder_path: segments[..at - 1].iter().map(|s| s.to_string()).collect(),
                record: segments[at - 1].to_string(),
                selector: Some(selector),
                parameter,
            })
        }
        None => {
            // No selector: with >= 2 segments the last one is the record
            // and the rest is the folder path.
            let (path, record) = segments.split_at(segments.len() - 1);
            Ok(Notation {
                folder_path: path.iter().map(|s| s.to_string()).collect(),
                record: record[0].to_string(),
                selector: None,
                parameter: None,
            })
        }
    }
}
