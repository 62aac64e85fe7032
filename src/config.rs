//! # Agent Configuration
//!
//! Declarative configuration for the secrets agent, loaded once at startup
//! from a YAML file. The reference list is immutable for the lifetime of the
//! process; rotation is driven purely by refetching, never by config reload.
//!
//! Durations accept humantime strings (`15s`, `5m`, `24h`).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::resolver::notation::SelectorKind;

/// Operating mode of the agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// One fetch-and-materialize pass, then exit.
    Init,
    /// Initial pass followed by the periodic refresh loop.
    Sidecar,
}

/// Where the base64 KSM configuration blob is bootstrapped from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", tag = "method", rename_all_fields = "camelCase")]
pub enum AuthConfig {
    /// Read the blob from a mounted Kubernetes secret volume.
    Secret {
        #[serde(default = "default_secret_path")]
        path: PathBuf,
    },
    /// AWS Secrets Manager via the ambient credential chain (IRSA).
    Aws {
        secret_id: String,
        #[serde(default)]
        region: Option<String>,
    },
    /// GCP Secret Manager via ambient workload-identity credentials.
    Gcp { resource: String },
    /// Azure Key Vault via ambient workload-identity credentials.
    Azure {
        vault_name: String,
        secret_name: String,
    },
}

fn default_secret_path() -> PathBuf {
    PathBuf::from("/etc/ksm/config")
}

/// Downstream Kubernetes Secret rotation settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Target namespace; falls back to `POD_NAMESPACE` when unset.
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Retry policy knobs for per-reference fetches.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(with = "humantime_serde", default = "default_base_delay")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_millis(200)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(5)
}

/// How a materialized file is rendered when no template is given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Env,
    Properties,
    Yaml,
    Ini,
    Raw,
}

/// Projection of a single record aspect, mirroring notation selectors.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSelector {
    #[serde(rename = "type")]
    pub kind: SelectorKind,
    #[serde(default)]
    pub parameter: Option<String>,
}

/// One unit of material to materialize from the vault.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub name: String,

    /// Locator: exactly one of the following forms.
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub folder_path: Option<String>,
    #[serde(default)]
    pub record_name: Option<String>,
    #[serde(default)]
    pub notation: Option<String>,

    #[serde(default)]
    pub field_selector: Option<FieldSelector>,
    /// Partial projection: restrict the fields mapping to these keys.
    #[serde(default)]
    pub fields: Option<Vec<String>>,

    pub output_path: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
    /// Template literal; takes precedence over `format` when present.
    #[serde(default)]
    pub template: Option<String>,

    /// Name of a Kubernetes Secret to merge rotated values into.
    #[serde(default)]
    pub k8s_secret: Option<String>,
    /// Field -> Secret key mapping; all fields are merged when absent.
    #[serde(default)]
    pub k8s_secret_keys: Option<BTreeMap<String, String>>,
}

impl Reference {
    fn has_locator(&self) -> bool {
        self.uid.is_some()
            || self.title.is_some()
            || self.notation.is_some()
            || (self.folder_path.is_some() && self.record_name.is_some())
    }
}

/// A folder locator whose children are all materialized as JSON files.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderReference {
    pub name: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    pub output_dir: PathBuf,
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub mode: AgentMode,
    pub auth: AuthConfig,

    #[serde(with = "humantime_serde", default = "default_refresh_interval")]
    pub refresh_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub cache_ttl: Duration,

    #[serde(default)]
    pub fail_on_error: bool,
    #[serde(default)]
    pub strict_lookup: bool,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rotation: RotationConfig,

    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub folder_references: Vec<FolderReference>,
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_listen_port() -> u16 {
    8080
}

impl AgentConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AgentError::ConfigInvalid(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| AgentError::ConfigInvalid(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would misbehave at runtime before any
    /// network activity happens.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval.is_zero() {
            return Err(AgentError::ConfigInvalid(
                "refreshInterval must be positive".into(),
            ));
        }

        let mut seen = HashSet::new();
        for reference in &self.references {
            if reference.name.is_empty() {
                return Err(AgentError::ConfigInvalid("reference with empty name".into()));
            }
            if !seen.insert(reference.name.as_str()) {
                return Err(AgentError::ConfigInvalid(format!(
                    "duplicate reference name: {}",
                    reference.name
                )));
            }
            if !reference.has_locator() {
                return Err(AgentError::ConfigInvalid(format!(
                    "reference {} has no locator (uid, title, notation, or folderPath+recordName)",
                    reference.name
                )));
            }
            if reference.output_path.as_os_str().is_empty() {
                return Err(AgentError::ConfigInvalid(format!(
                    "reference {} has an empty outputPath",
                    reference.name
                )));
            }
        }

        for folder in &self.folder_references {
            if folder.uid.is_none() && folder.path.is_none() {
                return Err(AgentError::ConfigInvalid(format!(
                    "folder reference {} needs a uid or a path",
                    folder.name
                )));
            }
            if folder.output_dir.as_os_str().is_empty() {
                return Err(AgentError::ConfigInvalid(format!(
                    "folder reference {} has an empty outputDir",
                    folder.name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
mode: sidecar
auth:
  method: secret
refreshInterval: 15s
references:
  - name: db
    title: demo-secret
    outputPath: /ksm/db.json
"#
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: AgentConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(config.mode, AgentMode::Sidecar);
        assert_eq!(config.refresh_interval, Duration::from_secs(15));
        assert_eq!(config.cache_ttl, Duration::from_secs(86_400));
        assert_eq!(config.listen_port, 8080);
        assert!(!config.fail_on_error);
        assert!(!config.strict_lookup);
        assert_eq!(config.references.len(), 1);
        assert_eq!(config.references[0].format, OutputFormat::Json);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_cloud_auth_methods() {
        let yaml = r#"
mode: init
auth:
  method: aws
  secretId: prod/ksm-config
  region: eu-west-1
"#;
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        match config.auth {
            AuthConfig::Aws { secret_id, region } => {
                assert_eq!(secret_id, "prod/ksm-config");
                assert_eq!(region.as_deref(), Some("eu-west-1"));
            }
            other => panic!("expected aws auth, got {other:?}"),
        }

        let yaml = r#"
mode: init
auth:
  method: azure
  vaultName: my-vault
  secretName: ksm-config
"#;
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.auth, AuthConfig::Azure { .. }));
    }

    #[test]
    fn test_retry_defaults() {
        let config: AgentConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(200));
        assert_eq!(config.retry.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_duplicate_reference_names_rejected() {
        let yaml = r#"
mode: sidecar
auth:
  method: secret
references:
  - name: db
    title: a
    outputPath: /ksm/a
  - name: db
    title: b
    outputPath: /ksm/b
"#;
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate reference name"));
    }

    #[test]
    fn test_reference_without_locator_rejected() {
        let yaml = r#"
mode: sidecar
auth:
  method: secret
references:
  - name: db
    outputPath: /ksm/a
"#;
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_folder_reference_needs_locator() {
        let yaml = r#"
mode: sidecar
auth:
  method: secret
folderReferences:
  - name: team
    outputDir: /ksm/team
"#;
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_selector_and_secret_mapping_parse() {
        let yaml = r#"
mode: sidecar
auth:
  method: secret
references:
  - name: pw
    notation: keeper://Production/db/field/password
    fieldSelector:
      type: field
      parameter: password
    outputPath: /ksm/pw
    format: raw
    k8sSecret: db-credentials
    k8sSecretKeys:
      password: DB_PASSWORD
"#;
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        let reference = &config.references[0];
        assert_eq!(reference.format, OutputFormat::Raw);
        assert_eq!(reference.k8s_secret.as_deref(), Some("db-credentials"));
        let keys = reference.k8s_secret_keys.as_ref().unwrap();
        assert_eq!(keys.get("password").map(String::as_str), Some("DB_PASSWORD"));
        config.validate().unwrap();
    }
}
