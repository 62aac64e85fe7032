//! # Kubernetes Secret Reconciliation
//!
//! Pushes rotated values into downstream Kubernetes Secret objects. Only
//! active in sidecar mode with rotation enabled.
//!
//! The merge is additive: selected fields are merged into the Secret's
//! data map and keys the agent did not author are never deleted. A missing
//! target Secret is reported but never aborts the cycle.

use std::collections::BTreeMap;

use base64::engine::general_purpose;
use base64::Engine as _;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{AgentError, Result};
use crate::vault::record::FieldValue;

/// Lazily-connected Secret updater bound to one namespace.
pub struct SecretSync {
    namespace: String,
    client: OnceCell<kube::Client>,
}

impl std::fmt::Debug for SecretSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSync")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl SecretSync {
    /// Target namespace comes from configuration, else the downward-API
    /// `POD_NAMESPACE` variable, else `default`.
    pub fn new(namespace: Option<String>) -> Self {
        let namespace = namespace
            .or_else(|| std::env::var("POD_NAMESPACE").ok())
            .unwrap_or_else(|| "default".to_string());
        Self {
            namespace,
            client: OnceCell::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn client(&self) -> Result<&kube::Client> {
        self.client
            .get_or_try_init(|| async {
                kube::Client::try_default()
                    .await
                    .map_err(|e| AgentError::K8sSecretUpdate(format!("kube client: {e}")))
            })
            .await
    }

    /// Merge the selected fields of one reference into `secret_name`.
    pub async fn merge(
        &self,
        secret_name: &str,
        fields: &BTreeMap<String, FieldValue>,
        mapping: Option<&BTreeMap<String, String>>,
    ) -> Result<()> {
        let data = secret_data(fields, mapping)?;
        if data.is_empty() {
            debug!("no fields selected for secret {secret_name}, skipping");
            return Ok(());
        }

        let client = self.client().await?;
        let api: Api<Secret> = Api::namespaced(client.clone(), &self.namespace);

        // Confirm the target exists so a missing Secret is reported
        // distinctly from an update failure.
        match api.get(secret_name).await {
            Ok(_) => {}
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                return Err(AgentError::K8sSecretUpdate(format!(
                    "secret {}/{secret_name} not found",
                    self.namespace
                )));
            }
            Err(e) => {
                return Err(AgentError::K8sSecretUpdate(format!(
                    "secret {}/{secret_name}: {e}",
                    self.namespace
                )));
            }
        }

        // A JSON merge patch only touches the keys it carries, so foreign
        // keys in the Secret survive.
        let patch = serde_json::json!({ "data": data });
        api.patch(secret_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| {
                AgentError::K8sSecretUpdate(format!(
                    "secret {}/{secret_name}: {e}",
                    self.namespace
                ))
            })?;

        info!(
            "merged {} keys into secret {}/{secret_name}",
            data.len(),
            self.namespace
        );
        Ok(())
    }
}

/// Build the base64 data map to merge: either the explicit field -> key
/// mapping, or every field keyed by its own name when no mapping is given.
fn secret_data(
    fields: &BTreeMap<String, FieldValue>,
    mapping: Option<&BTreeMap<String, String>>,
) -> Result<BTreeMap<String, String>> {
    let mut data = BTreeMap::new();
    match mapping {
        Some(mapping) => {
            for (field, key) in mapping {
                let Some(value) = fields.get(field) else {
                    return Err(AgentError::K8sSecretUpdate(format!(
                        "mapped field {field} is not present on the record"
                    )));
                };
                data.insert(key.clone(), general_purpose::STANDARD.encode(value.to_bytes()?));
            }
        }
        None => {
            for (field, value) in fields {
                data.insert(field.clone(), general_purpose::STANDARD.encode(value.to_bytes()?));
            }
        }
    }
    Ok(data)
}
