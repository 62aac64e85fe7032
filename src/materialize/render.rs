//! # Rendering
//!
//! Turns a resolved reference into the bytes of its output file. A
//! template literal wins over the format table; a selector projection is
//! emitted as-is.
//!
//! Templates use tera with its built-in filter library (case, date, join,
//! default, ...) plus base64 and sha256 filters registered here.

use std::collections::{BTreeMap, HashMap};

use base64::engine::general_purpose;
use base64::Engine as _;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tera::Tera;

use crate::config::{OutputFormat, Reference};
use crate::error::{AgentError, Result};
use crate::resolver::Resolved;
use crate::vault::record::FieldValue;

/// Render the output bytes for one resolved reference.
pub fn render_reference(reference: &Reference, resolved: &Resolved) -> Result<Vec<u8>> {
    if let Some(template) = &reference.template {
        return render_template(template, &resolved.fields);
    }
    if let Some(selected) = &resolved.selected {
        return Ok(selected.clone());
    }
    render_format(reference.format, resolved)
}

fn render_format(format: OutputFormat, resolved: &Resolved) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(&resolved.projection)
            .map(String::into_bytes)
            .map_err(|e| AgentError::Render(e.to_string())),
        OutputFormat::Env => Ok(render_env(&resolved.fields).into_bytes()),
        OutputFormat::Properties => Ok(render_pairs(&resolved.fields, None).into_bytes()),
        OutputFormat::Ini => Ok(render_pairs(&resolved.fields, Some("secret")).into_bytes()),
        OutputFormat::Yaml => {
            let map: BTreeMap<&String, Value> = resolved
                .fields
                .iter()
                .map(|(key, value)| (key, value.as_json()))
                .collect();
            serde_yaml::to_string(&map)
                .map(String::into_bytes)
                .map_err(|e| AgentError::Render(e.to_string()))
        }
        OutputFormat::Raw => {
            if resolved.fields.len() == 1 {
                let value = resolved
                    .fields
                    .values()
                    .next()
                    .ok_or_else(|| AgentError::Render("empty fields mapping".into()))?;
                value.to_bytes()
            } else {
                serde_json::to_string_pretty(&resolved.projection)
                    .map(String::into_bytes)
                    .map_err(|e| AgentError::Render(e.to_string()))
            }
        }
    }
}

/// `KEY=value` lines: keys upper-cased with non-alphanumerics mapped to
/// `_`; values with whitespace, `=`, `'` or `"` are single-quoted with
/// internal single quotes escaped as `'\''`.
fn render_env(fields: &BTreeMap<String, FieldValue>) -> String {
    let mut out = String::new();
    for (key, value) in fields {
        out.push_str(&env_key(key));
        out.push('=');
        out.push_str(&env_value(&value_string(value)));
        out.push('\n');
    }
    out
}

pub(crate) fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn env_value(value: &str) -> String {
    let needs_quoting = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '=' | '\'' | '"'));
    if needs_quoting {
        format!("'{}'", value.replace('\'', "'\\''"))
    } else {
        value.to_string()
    }
}

/// Sorted `key=value` lines, optionally under a single `[section]` header.
fn render_pairs(fields: &BTreeMap<String, FieldValue>, section: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(section) = section {
        out.push_str(&format!("[{section}]\n"));
    }
    // BTreeMap iteration is already sorted ascending by key.
    for (key, value) in fields {
        out.push_str(&format!("{key}={}\n", value_string(value)));
    }
    out
}

/// Scalars render as-is; lists and objects as compact JSON.
fn value_string(value: &FieldValue) -> String {
    match value.as_scalar() {
        Some(s) => s.to_string(),
        None => value.as_json().to_string(),
    }
}

/// Render a template literal against the fields mapping.
pub fn render_template(template: &str, fields: &BTreeMap<String, FieldValue>) -> Result<Vec<u8>> {
    let mut tera = Tera::default();
    tera.register_filter("b64encode", b64encode);
    tera.register_filter("b64decode", b64decode);
    tera.register_filter("sha256", sha256_hex);

    tera.add_raw_template("reference", template)
        .map_err(|e| AgentError::Render(e.to_string()))?;

    let mut context = tera::Context::new();
    for (key, value) in fields {
        context.insert(key.as_str(), &value.as_json());
    }

    tera.render("reference", &context)
        .map(String::into_bytes)
        .map_err(|e| AgentError::Render(e.to_string()))
}

fn string_arg(value: &Value, filter: &str) -> tera::Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| tera::Error::msg(format!("{filter} expects a string")))
}

fn b64encode(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let input = string_arg(value, "b64encode")?;
    Ok(Value::String(general_purpose::STANDARD.encode(input)))
}

fn b64decode(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let input = string_arg(value, "b64decode")?;
    let decoded = general_purpose::STANDARD
        .decode(input)
        .map_err(|e| tera::Error::msg(format!("b64decode: {e}")))?;
    String::from_utf8(decoded)
        .map(Value::String)
        .map_err(|e| tera::Error::msg(format!("b64decode: {e}")))
}

fn sha256_hex(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let input = string_arg(value, "sha256")?;
    let digest = Sha256::digest(input.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    Ok(Value::String(hex))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> BTreeMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(key, value)| {
                (
                    key.to_string(),
                    FieldValue::from_values(std::slice::from_ref(value)),
                )
            })
            .collect()
    }

    fn resolved(pairs: &[(&str, Value)]) -> Resolved {
        let fields = fields(pairs);
        let projection = Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), v.as_json()))
                .collect(),
        );
        Resolved {
            selected: None,
            all_fields: fields.clone(),
            fields,
            projection,
        }
    }

    fn reference(format: OutputFormat) -> Reference {
        Reference {
            name: "r".into(),
            uid: None,
            title: None,
            folder_path: None,
            record_name: None,
            notation: None,
            field_selector: None,
            fields: None,
            output_path: std::path::PathBuf::from("/tmp/out"),
            format,
            template: None,
            k8s_secret: None,
            k8s_secret_keys: None,
        }
    }

    #[test]
    fn test_json_format_two_space_indent() {
        let rendered =
            render_reference(&reference(OutputFormat::Json), &resolved(&[("password", json!("p1"))]))
                .unwrap();
        assert_eq!(rendered, b"{\n  \"password\": \"p1\"\n}");
    }

    #[test]
    fn test_env_keys_are_normalized() {
        let rendered = render_reference(
            &reference(OutputFormat::Env),
            &resolved(&[("db-password", json!("x")), ("Login.Name", json!("y"))]),
        )
        .unwrap();
        let text = String::from_utf8(rendered).unwrap();
        assert!(text.contains("DB_PASSWORD=x\n"));
        assert!(text.contains("LOGIN_NAME=y\n"));
    }

    #[test]
    fn test_env_key_character_class() {
        for key in ["password", "PASSWORD", "pass word", "päss", "a=b"] {
            let normalized = env_key(key);
            assert!(
                normalized.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'),
                "bad env key {normalized:?}"
            );
        }
        assert_eq!(env_key("password"), env_key("PASSWORD"));
    }

    #[test]
    fn test_env_values_quoted_when_unsafe() {
        let rendered = render_reference(
            &reference(OutputFormat::Env),
            &resolved(&[
                ("plain", json!("abc")),
                ("spaced", json!("a b")),
                ("quoted", json!("it's")),
                ("assign", json!("a=b")),
            ]),
        )
        .unwrap();
        let text = String::from_utf8(rendered).unwrap();
        assert!(text.contains("PLAIN=abc\n"));
        assert!(text.contains("SPACED='a b'\n"));
        assert!(text.contains("QUOTED='it'\\''s'\n"));
        assert!(text.contains("ASSIGN='a=b'\n"));
    }

    #[test]
    fn test_properties_and_ini_sorted_and_stable() {
        let data = resolved(&[("zeta", json!("z")), ("alpha", json!("a"))]);
        let first = render_reference(&reference(OutputFormat::Properties), &data).unwrap();
        let second = render_reference(&reference(OutputFormat::Properties), &data).unwrap();
        assert_eq!(first, second);
        assert_eq!(String::from_utf8(first).unwrap(), "alpha=a\nzeta=z\n");

        let ini = render_reference(&reference(OutputFormat::Ini), &data).unwrap();
        assert_eq!(String::from_utf8(ini).unwrap(), "[secret]\nalpha=a\nzeta=z\n");
    }

    #[test]
    fn test_raw_single_field_emits_scalar_bytes() {
        let rendered =
            render_reference(&reference(OutputFormat::Raw), &resolved(&[("password", json!("p1"))]))
                .unwrap();
        assert_eq!(rendered, b"p1");
    }

    #[test]
    fn test_raw_multi_field_falls_back_to_json() {
        let rendered = render_reference(
            &reference(OutputFormat::Raw),
            &resolved(&[("a", json!("1")), ("b", json!("2"))]),
        )
        .unwrap();
        assert!(rendered.starts_with(b"{"));
    }

    #[test]
    fn test_selected_bytes_pass_through() {
        let mut data = resolved(&[("password", json!("p1"))]);
        data.selected = Some(b"raw-bytes".to_vec());
        let rendered = render_reference(&reference(OutputFormat::Json), &data).unwrap();
        assert_eq!(rendered, b"raw-bytes");
    }

    #[test]
    fn test_template_renders_connection_string() {
        let mut r = reference(OutputFormat::Json);
        r.template =
            Some("postgresql://{{ login }}:{{ password }}@{{ hostname }}:5432/db".into());
        let rendered = render_reference(
            &r,
            &resolved(&[
                ("login", json!("u")),
                ("password", json!("p")),
                ("hostname", json!("h")),
            ]),
        )
        .unwrap();
        assert_eq!(rendered, b"postgresql://u:p@h:5432/db");
    }

    #[test]
    fn test_template_base64_filters_roundtrip() {
        let data = fields(&[("password", json!("s3cret"))]);
        let encoded = render_template("{{ password | b64encode }}", &data).unwrap();
        assert_eq!(encoded, b"czNjcmV0");
        let roundtrip =
            render_template("{{ password | b64encode | b64decode }}", &data).unwrap();
        assert_eq!(roundtrip, b"s3cret");
    }

    #[test]
    fn test_template_sha256_filter() {
        let data = fields(&[("value", json!("abc"))]);
        let rendered = render_template("{{ value | sha256 }}", &data).unwrap();
        assert_eq!(
            rendered,
            b"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_template_error_is_render_kind() {
        let data = fields(&[("a", json!("1"))]);
        let err = render_template("{{ a | no_such_filter }}", &data).unwrap_err();
        assert!(matches!(err, AgentError::Render(_)));
    }

    #[test]
    fn test_yaml_format() {
        let rendered = render_reference(
            &reference(OutputFormat::Yaml),
            &resolved(&[("password", json!("p1"))]),
        )
        .unwrap();
        assert_eq!(String::from_utf8(rendered).unwrap(), "password: p1\n");
    }
}
