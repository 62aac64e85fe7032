//! # Vault Provider
//!
//! Typed query layer over the raw [`KsmClient`]. The underlying client is
//! not required to be thread-safe, so access is serialized behind a
//! single-writer/multi-reader lock.
//!
//! Title lookups are first-match by default; with strict lookup enabled a
//! colliding title is an error instead.

use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{AgentError, Result};
use crate::resolver::notation::is_uid;
use crate::vault::client::KsmClient;
use crate::vault::record::{Folder, Record};

pub struct VaultProvider {
    client: RwLock<Box<dyn KsmClient>>,
    strict_lookup: bool,
}

impl std::fmt::Debug for VaultProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultProvider")
            .field("strict_lookup", &self.strict_lookup)
            .finish_non_exhaustive()
    }
}

impl VaultProvider {
    pub fn new(client: Box<dyn KsmClient>, strict_lookup: bool) -> Self {
        Self {
            client: RwLock::new(client),
            strict_lookup,
        }
    }

    pub fn strict_lookup(&self) -> bool {
        self.strict_lookup
    }

    /// Fetch a record by its unique identifier.
    pub async fn get_by_uid(&self, uid: &str) -> Result<Record> {
        self.list_all()
            .await?
            .into_iter()
            .find(|r| r.uid == uid)
            .ok_or_else(|| AgentError::NotFound(format!("record {uid}")))
    }

    /// Fetch a record by title. Titles are not unique; behavior on
    /// collision depends on strict lookup.
    pub async fn get_by_title(&self, title: &str) -> Result<Record> {
        let matches: Vec<Record> = self
            .list_all()
            .await?
            .into_iter()
            .filter(|r| r.title == title)
            .collect();
        self.pick_single(title, matches)
    }

    /// All records shared with this client context.
    pub async fn list_all(&self) -> Result<Vec<Record>> {
        let client = self.client.read().await;
        client.fetch_records().await
    }

    /// Project a single standard field of a record located by UID or title.
    /// Scalar values come back as raw bytes, everything else JSON-encoded.
    pub async fn get_field(&self, locator: &str, field: &str) -> Result<Vec<u8>> {
        let record = self.get_by_locator(locator).await?;
        let found = record
            .standard_field(field)
            .ok_or_else(|| AgentError::NotFound(format!("field {field} on {locator}")))?;
        found.projected().to_bytes()
    }

    /// Download a file attachment matched by filename or title.
    pub async fn get_file(&self, locator: &str, name: &str) -> Result<Vec<u8>> {
        let record = self.get_by_locator(locator).await?;
        self.download_from(&record, name).await
    }

    /// Download an attachment of an already-located record.
    pub async fn download_from(&self, record: &Record, name: &str) -> Result<Vec<u8>> {
        let file = record
            .find_file(name)
            .ok_or_else(|| AgentError::NotFound(format!("file {name} on {}", record.title)))?;
        let client = self.client.read().await;
        client.download_file(&record.uid, &file.uid).await
    }

    /// All folders visible to this client context.
    pub async fn list_folders(&self) -> Result<Vec<Folder>> {
        let client = self.client.read().await;
        client.fetch_folders().await
    }

    /// Records placed in `folder_uid`, by primary or inner-folder
    /// reference.
    pub async fn records_in_folder(&self, folder_uid: &str) -> Result<Vec<Record>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|r| r.in_folder(folder_uid))
            .collect())
    }

    /// Resolve a bare locator: a well-formed UID resolves by UID, anything
    /// else falls back to title lookup.
    pub async fn get_by_locator(&self, locator: &str) -> Result<Record> {
        if is_uid(locator) {
            self.get_by_uid(locator).await
        } else {
            self.get_by_title(locator).await
        }
    }

    /// First-match or strict-failure selection among title collisions.
    pub fn pick_single(&self, what: &str, mut matches: Vec<Record>) -> Result<Record> {
        match matches.len() {
            0 => Err(AgentError::NotFound(format!("record {what}"))),
            1 => Ok(matches.remove(0)),
            _ if self.strict_lookup => Err(AgentError::Ambiguous(what.to_string())),
            n => {
                warn!("{what} matches {n} records, using the first match");
                Ok(matches.remove(0))
            }
        }
    }
}
