//! # Azure Bootstrap
//!
//! Fetches the KSM configuration blob from Azure Key Vault.
//! `DefaultAzureCredential` picks up workload identity inside AKS and
//! falls back to managed identity or environment credentials.

use azure_identity::DefaultAzureCredential;
use azure_security_keyvault_secrets::SecretClient;
use tracing::info;

use crate::error::{AgentError, Result};

pub async fn fetch(vault_name: &str, secret_name: &str) -> Result<String> {
    if vault_name.is_empty() || secret_name.is_empty() {
        return Err(AgentError::ConfigInvalid(
            "azure auth needs a vaultName and a secretName".into(),
        ));
    }

    let vault_url = if vault_name.starts_with("https://") {
        vault_name.to_string()
    } else {
        format!("https://{vault_name}.vault.azure.net/")
    };

    let credential = DefaultAzureCredential::new().map_err(|e| {
        AgentError::BootstrapUnavailable(format!("azure credentials unavailable: {e}"))
    })?;
    let client = SecretClient::new(&vault_url, credential, None).map_err(|e| {
        AgentError::BootstrapUnavailable(format!("azure key vault {vault_url}: {e}"))
    })?;

    info!("fetching KSM config from Azure Key Vault secret {vault_url}{secret_name}");
    let response = client
        .get_secret(secret_name, None)
        .await
        .map_err(|e| {
            AgentError::BootstrapUnavailable(format!("azure secret {secret_name}: {e}"))
        })?;
    let secret = response.into_model().map_err(|e| {
        AgentError::BootstrapUnavailable(format!("azure secret {secret_name}: {e}"))
    })?;

    secret.value.ok_or_else(|| {
        AgentError::ConfigInvalid(format!("azure secret {secret_name} has no value"))
    })
}
