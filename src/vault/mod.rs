//! # Vault Access
//!
//! Everything that talks to Keeper Secrets Manager lives here:
//!
//! - [`KsmConfig`] - the parsed base64 configuration blob produced by
//!   bootstrap
//! - [`KsmClient`] - the raw read surface (the sole SDK coupling point)
//! - [`gateway::KsmGateway`] - HTTP client for the KSM gateway endpoint
//! - [`mock::MockKsm`] - in-memory client for tests and mocked runs
//! - [`VaultProvider`] - the typed query layer the resolver works against

pub mod client;
pub mod gateway;
pub mod mock;
pub mod provider;
pub mod record;

pub use client::KsmClient;
pub use provider::VaultProvider;
pub use record::{Field, FieldValue, FileRef, Folder, Record};

use base64::engine::general_purpose;
use base64::Engine as _;
use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{AgentError, Result};

/// Parsed KSM configuration, decoded from the base64 JSON blob handed over
/// by bootstrap. Key material is wiped from memory on drop.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct KsmConfig {
    pub hostname: String,
    pub client_id: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub server_public_key_id: Option<String>,
}

impl std::fmt::Debug for KsmConfig {
    // Never log key material.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KsmConfig")
            .field("hostname", &self.hostname)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl KsmConfig {
    /// Decode and parse the base64 JSON configuration blob.
    pub fn from_base64(blob: &str) -> Result<Self> {
        let mut decoded = general_purpose::STANDARD
            .decode(blob.trim())
            .map_err(|e| AgentError::ConfigInvalid(format!("KSM config is not base64: {e}")))?;
        let parsed = serde_json::from_slice::<Self>(&decoded)
            .map_err(|e| AgentError::ConfigInvalid(format!("KSM config is not valid JSON: {e}")));
        decoded.zeroize();
        let config = parsed?;
        if config.hostname.is_empty() || config.client_id.is_empty() {
            return Err(AgentError::ConfigInvalid(
                "KSM config is missing hostname or clientId".into(),
            ));
        }
        Ok(config)
    }
}

/// Build the production vault client from a parsed configuration.
pub fn connect(config: &KsmConfig) -> Result<Box<dyn KsmClient>> {
    Ok(Box::new(gateway::KsmGateway::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(json: &str) -> String {
        general_purpose::STANDARD.encode(json)
    }

    #[test]
    fn test_parse_config_blob() {
        let blob = encode(
            r#"{"hostname":"keepersecurity.com","clientId":"abc","appKey":"k","privateKey":"p","serverPublicKeyId":"10"}"#,
        );
        let config = KsmConfig::from_base64(&blob).unwrap();
        assert_eq!(config.hostname, "keepersecurity.com");
        assert_eq!(config.client_id, "abc");
        assert_eq!(config.server_public_key_id.as_deref(), Some("10"));
    }

    #[test]
    fn test_reject_non_base64_blob() {
        let err = KsmConfig::from_base64("not base64!!!").unwrap_err();
        assert!(matches!(err, AgentError::ConfigInvalid(_)));
    }

    #[test]
    fn test_reject_blob_missing_hostname() {
        let blob = encode(r#"{"hostname":"","clientId":"abc"}"#);
        assert!(KsmConfig::from_base64(&blob).is_err());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let blob = encode(
            r#"{"hostname":"h","clientId":"c","appKey":"SECRET","privateKey":"SECRET"}"#,
        );
        let config = KsmConfig::from_base64(&blob).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("SECRET"));
    }
}
