//! # KSM Gateway Client
//!
//! HTTP client for the Keeper Secrets Manager gateway read surface. Record
//! payload protection is handled below this layer; the client authenticates
//! each request with the client identifier from the bootstrap configuration
//! and exchanges JSON bodies.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::vault::client::KsmClient;
use crate::vault::record::{Folder, Record};
use crate::vault::KsmConfig;

const CLIENT_VERSION: &str = concat!("ksm-agent/", env!("CARGO_PKG_VERSION"));

/// Gateway client holding the HTTP connection pool and client identity.
#[derive(Debug)]
pub struct KsmGateway {
    client: reqwest::Client,
    base: reqwest::Url,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct GetSecretsResponse {
    #[serde(default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct GetFoldersResponse {
    #[serde(default)]
    folders: Vec<Folder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetFileResponse {
    url: String,
}

impl KsmGateway {
    pub fn new(config: &KsmConfig) -> Result<Self> {
        let base = reqwest::Url::parse(&format!("https://{}/api/rest/sm/v1/", config.hostname))
            .map_err(|e| {
                AgentError::ConfigInvalid(format!("bad KSM hostname {}: {e}", config.hostname))
            })?;
        let client = reqwest::Client::builder()
            .user_agent(CLIENT_VERSION)
            .build()
            .map_err(|e| AgentError::Upstream(e.to_string()))?;
        Ok(Self {
            client,
            base,
            client_id: config.client_id.clone(),
        })
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let url = self
            .base
            .join(endpoint)
            .map_err(|e| AgentError::Upstream(e.to_string()))?;
        debug!("POST {url}");

        let response = self
            .client
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Upstream(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Upstream(format!(
                "unexpected HTTP status {status} from {url}"
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AgentError::Upstream(format!("{url}: {e}")))
    }

    fn request_body(&self) -> serde_json::Value {
        serde_json::json!({
            "clientVersion": CLIENT_VERSION,
            "clientId": self.client_id,
        })
    }
}

#[async_trait]
impl KsmClient for KsmGateway {
    async fn fetch_records(&self) -> Result<Vec<Record>> {
        let response: GetSecretsResponse = self.post("get_secrets", self.request_body()).await?;
        Ok(response.records)
    }

    async fn fetch_folders(&self) -> Result<Vec<Folder>> {
        let response: GetFoldersResponse = self.post("get_folders", self.request_body()).await?;
        Ok(response.folders)
    }

    async fn download_file(&self, record_uid: &str, file_uid: &str) -> Result<Vec<u8>> {
        let mut body = self.request_body();
        body["recordUid"] = serde_json::Value::String(record_uid.to_string());
        body["fileUid"] = serde_json::Value::String(file_uid.to_string());
        let response: GetFileResponse = self.post("get_file", body).await?;

        debug!("GET {}", response.url);
        let content = self
            .client
            .get(&response.url)
            .send()
            .await
            .map_err(|e| AgentError::Upstream(e.to_string()))?;
        let status = content.status();
        if !status.is_success() {
            return Err(AgentError::Upstream(format!(
                "unexpected HTTP status {status} downloading file {file_uid}"
            )));
        }
        let bytes = content
            .bytes()
            .await
            .map_err(|e| AgentError::Upstream(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
