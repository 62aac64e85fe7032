//! # Error Types
//!
//! Typed errors for the secrets agent.
//!
//! Individual reference failures are reported and counted but never abort a
//! running refresh loop; only bootstrap and configuration errors are fatal,
//! and only during startup.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, AgentError>;

/// All error kinds the agent core can produce.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Credentials or the bootstrap secret store are unreachable.
    #[error("bootstrap unavailable: {0}")]
    BootstrapUnavailable(String),

    /// The configuration itself is malformed (bad identifiers, empty
    /// locators, unparseable KSM blob).
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A record, folder, field, or file attachment does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Multiple records matched a title lookup while strict lookup is on.
    #[error("ambiguous reference: {0} matches multiple records")]
    Ambiguous(String),

    /// Transient upstream failure (network, 5xx, timeouts).
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Template or format rendering failed.
    #[error("render error: {0}")]
    Render(String),

    /// Writing the materialized file failed.
    #[error("write error for {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Pushing rotated values into a Kubernetes Secret failed.
    #[error("kubernetes secret update failed: {0}")]
    K8sSecretUpdate(String),

    /// The shared cancellation context fired mid-operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl AgentError {
    /// Short stable label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BootstrapUnavailable(_) => "bootstrap_unavailable",
            Self::ConfigInvalid(_) => "config_invalid",
            Self::NotFound(_) => "not_found",
            Self::Ambiguous(_) => "ambiguous",
            Self::Upstream(_) => "upstream",
            Self::Render(_) => "render",
            Self::Write { .. } => "write",
            Self::K8sSecretUpdate(_) => "k8s_secret_update",
            Self::Cancelled => "cancelled",
        }
    }
}
