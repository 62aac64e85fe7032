//! # Bootstrap Authenticator
//!
//! Obtains the base64 KSM configuration blob the vault client is built
//! from. The source is selected by the configured auth method:
//!
//! - `secret` - a Kubernetes secret volume mounted into the pod
//! - `aws` - AWS Secrets Manager via the ambient credential chain (IRSA)
//! - `gcp` - GCP Secret Manager via ambient workload-identity credentials
//! - `azure` - Azure Key Vault via ambient workload-identity credentials
//!
//! No retries happen here; the runtime decides whether an unbootstrappable
//! agent is fatal.

pub mod aws;
pub mod azure;
pub mod gcp;

use std::path::Path;

use crate::config::AuthConfig;
use crate::error::{AgentError, Result};

/// Fetch the KSM configuration blob from the configured source.
pub async fn load_ksm_config(auth: &AuthConfig) -> Result<String> {
    match auth {
        AuthConfig::Secret { path } => read_mounted(path),
        AuthConfig::Aws { secret_id, region } => aws::fetch(secret_id, region.as_deref()).await,
        AuthConfig::Gcp { resource } => gcp::fetch(resource).await,
        AuthConfig::Azure {
            vault_name,
            secret_name,
        } => azure::fetch(vault_name, secret_name).await,
    }
}

/// Read the blob from a mounted secret volume.
fn read_mounted(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AgentError::BootstrapUnavailable(format!("mounted KSM config {}: {e}", path.display()))
    })?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AgentError::ConfigInvalid(format!(
            "mounted KSM config {} is empty",
            path.display()
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mounted_secret_is_read_and_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "  BASE64BLOB\n").unwrap();

        let auth = AuthConfig::Secret { path: path.clone() };
        let blob = load_ksm_config(&auth).await.unwrap();
        assert_eq!(blob, "BASE64BLOB");
    }

    #[tokio::test]
    async fn test_missing_mounted_secret_is_bootstrap_unavailable() {
        let auth = AuthConfig::Secret {
            path: "/nonexistent/ksm/config".into(),
        };
        assert!(matches!(
            load_ksm_config(&auth).await.unwrap_err(),
            AgentError::BootstrapUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_empty_mounted_secret_is_config_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "\n").unwrap();

        let auth = AuthConfig::Secret { path };
        assert!(matches!(
            load_ksm_config(&auth).await.unwrap_err(),
            AgentError::ConfigInvalid(_)
        ));
    }

    #[tokio::test]
    async fn test_gcp_identifier_validated_before_any_network_call() {
        let auth = AuthConfig::Gcp {
            resource: "my-secret".into(),
        };
        assert!(matches!(
            load_ksm_config(&auth).await.unwrap_err(),
            AgentError::ConfigInvalid(_)
        ));
    }

    #[tokio::test]
    async fn test_azure_names_validated_before_any_network_call() {
        let auth = AuthConfig::Azure {
            vault_name: String::new(),
            secret_name: "ksm".into(),
        };
        assert!(matches!(
            load_ksm_config(&auth).await.unwrap_err(),
            AgentError::ConfigInvalid(_)
        ));
    }
}
