//! # Vault Client Trait
//!
//! Raw read surface over the Keeper Secrets Manager vault. This trait is
//! the sole coupling point to the vault SDK/wire protocol; everything above
//! it (provider, resolver, fetch engine) is transport-agnostic.

use async_trait::async_trait;

use crate::error::Result;
use crate::vault::record::{Folder, Record};

/// Minimal vault read operations the agent needs.
///
/// Implementations are not required to be thread-safe internally; the
/// [`VaultProvider`](crate::vault::VaultProvider) serializes access behind
/// a single-writer lock.
#[async_trait]
pub trait KsmClient: Send + Sync {
    /// Fetch every record shared with this client context.
    async fn fetch_records(&self) -> Result<Vec<Record>>;

    /// Fetch every folder visible to this client context.
    async fn fetch_folders(&self) -> Result<Vec<Folder>>;

    /// Download the content of one file attachment.
    async fn download_file(&self, record_uid: &str, file_uid: &str) -> Result<Vec<u8>>;
}
