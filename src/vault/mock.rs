//! # Mocked Vault
//!
//! In-memory [`KsmClient`] used by the test suites and by mocked runs.
//! Supports swapping the record set between cycles (rotation tests) and
//! injecting a burst of upstream failures (cache fallback tests).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::vault::client::KsmClient;
use crate::vault::record::{Folder, Record};

#[derive(Default)]
struct MockState {
    records: Vec<Record>,
    folders: Vec<Folder>,
    files: HashMap<String, Vec<u8>>,
    failures_remaining: u32,
    calls: u64,
}

/// Shared in-memory vault double. Clones share the same state, so a test
/// can keep a handle while the agent owns the boxed client.
#[derive(Clone, Default)]
pub struct MockKsm {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockKsm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockKsm").finish_non_exhaustive()
    }
}

impl MockKsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_records(&self, records: Vec<Record>) {
        self.state.lock().expect("mock lock poisoned").records = records;
    }

    pub fn set_folders(&self, folders: Vec<Folder>) {
        self.state.lock().expect("mock lock poisoned").folders = folders;
    }

    pub fn insert_file(&self, file_uid: &str, content: Vec<u8>) {
        self.state
            .lock()
            .expect("mock lock poisoned")
            .files
            .insert(file_uid.to_string(), content);
    }

    /// Make the next `n` vault calls fail with an upstream error.
    pub fn fail_times(&self, n: u32) {
        self.state.lock().expect("mock lock poisoned").failures_remaining = n;
    }

    /// Total number of vault calls observed.
    pub fn calls(&self) -> u64 {
        self.state.lock().expect("mock lock poisoned").calls
    }

    fn check_failure(&self) -> Result<()> {
        let mut state = self.state.lock().expect("mock lock poisoned");
        state.calls += 1;
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(AgentError::Upstream("simulated outage".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KsmClient for MockKsm {
    async fn fetch_records(&self) -> Result<Vec<Record>> {
        self.check_failure()?;
        Ok(self.state.lock().expect("mock lock poisoned").records.clone())
    }

    async fn fetch_folders(&self) -> Result<Vec<Folder>> {
        self.check_failure()?;
        Ok(self.state.lock().expect("mock lock poisoned").folders.clone())
    }

    async fn download_file(&self, _record_uid: &str, file_uid: &str) -> Result<Vec<u8>> {
        self.check_failure()?;
        self.state
            .lock()
            .expect("mock lock poisoned")
            .files
            .get(file_uid)
            .cloned()
            .ok_or_else(|| AgentError::NotFound(format!("file {file_uid}")))
    }
}
