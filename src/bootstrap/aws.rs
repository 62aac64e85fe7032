//! # AWS Bootstrap
//!
//! Fetches the KSM configuration blob from AWS Secrets Manager. Identity
//! comes from the SDK's default credential chain, which covers IRSA
//! (web-identity federation from the pod's service account token).

use aws_config::BehaviorVersion;
use tracing::info;

use crate::error::{AgentError, Result};

pub async fn fetch(secret_id: &str, region: Option<&str>) -> Result<String> {
    if secret_id.is_empty() {
        return Err(AgentError::ConfigInvalid("empty AWS secret id".into()));
    }

    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    let sdk_config = loader.load().await;
    let client = aws_sdk_secretsmanager::Client::new(&sdk_config);

    info!("fetching KSM config from AWS Secrets Manager secret {secret_id}");
    let output = client
        .get_secret_value()
        .secret_id(secret_id)
        .send()
        .await
        .map_err(|e| {
            AgentError::BootstrapUnavailable(format!("aws secret {secret_id}: {e}"))
        })?;

    if let Some(value) = output.secret_string() {
        return Ok(value.to_string());
    }
    // The KSM blob is a base64 string; a binary-only payload means the
    // secret holds something else.
    if output.secret_binary().is_some() {
        return Err(AgentError::ConfigInvalid(format!(
            "aws secret {secret_id} holds a binary payload, expected a string"
        )));
    }
    Err(AgentError::BootstrapUnavailable(format!(
        "aws secret {secret_id} has no value"
    )))
}
