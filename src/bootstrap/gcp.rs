//! # GCP Bootstrap
//!
//! Fetches the KSM configuration blob from Google Cloud Secret Manager
//! using Application Default Credentials (workload identity inside GKE).

use google_cloud_secretmanager_v1::client::SecretManagerService;
use tracing::info;

use crate::error::{AgentError, Result};

pub async fn fetch(resource: &str) -> Result<String> {
    if !resource.starts_with("projects/") {
        return Err(AgentError::ConfigInvalid(format!(
            "gcp secret identifier must start with projects/, got {resource:?}"
        )));
    }

    let client = SecretManagerService::builder().build().await.map_err(|e| {
        AgentError::BootstrapUnavailable(format!("gcp credentials unavailable: {e}"))
    })?;

    // Accept both bare secret resources and fully-qualified versions.
    let name = if resource.contains("/versions/") {
        resource.to_string()
    } else {
        format!("{resource}/versions/latest")
    };

    info!("fetching KSM config from GCP Secret Manager version {name}");
    let response = client
        .access_secret_version()
        .set_name(name.clone())
        .send()
        .await
        .map_err(|e| AgentError::BootstrapUnavailable(format!("gcp secret {name}: {e}")))?;

    let payload = response.payload.ok_or_else(|| {
        AgentError::ConfigInvalid(format!("gcp secret {name} has no payload"))
    })?;
    String::from_utf8(payload.data.to_vec()).map_err(|e| {
        AgentError::ConfigInvalid(format!("gcp secret {name} is not valid UTF-8: {e}"))
    })
}
