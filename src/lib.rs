//! # Keeper Secrets Manager Agent
//!
//! A Kubernetes agent that injects secrets from a Keeper Secrets Manager
//! (KSM) vault into pods at runtime. Two deployment shapes share this
//! crate: a short-lived init container that populates a shared in-memory
//! volume before the application starts, and a long-lived sidecar that
//! keeps refreshing those materials from the vault.
//!
//! ## Overview
//!
//! 1. **Bootstrap** - obtain the KSM configuration blob from a mounted
//!    secret or a cloud secret store (AWS, GCP, Azure)
//! 2. **Resolve** - translate declarative references (UIDs, titles,
//!    folder-qualified notations, field selectors, file attachments,
//!    whole folders) into vault reads
//! 3. **Fetch** - retry with capped exponential backoff and fall back to
//!    the in-memory last-known-good cache on outage
//! 4. **Materialize** - render formats or templates and write files
//!    atomically with restrictive permissions; merge rotated values into
//!    downstream Kubernetes Secrets
//! 5. **Serve** - expose `/healthz`, `/readyz`, and `/metrics` while the
//!    refresh loop runs
//!
//! The application container only ever sees complete files: writes go to
//! a temp path and are renamed into place.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod fetch;
pub mod materialize;
pub mod metrics;
pub mod resolver;
pub mod runtime;
pub mod server;
pub mod vault;

pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use runtime::Agent;
