//! # Runtime
//!
//! Drives the agent lifecycle: bootstrap, the initial fetch-and-materialize
//! pass, and (in sidecar mode) the periodic refresh loop.
//!
//! ## Lifecycle
//!
//! 1. Bootstrap the KSM configuration and connect the vault provider
//! 2. Run the initial pass; readiness flips to true afterwards (even when
//!    degraded) and never flips back
//! 3. Init mode exits; sidecar mode ticks `refresh_interval` cycles until
//!    a termination signal cancels the shared context
//!
//! Init and sidecar share the same cycle implementation; the only
//! divergence is loop versus one-shot. At most one cycle is in flight at a
//! time and references are processed sequentially in declaration order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::OnceCell;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{AgentConfig, AgentMode, FolderReference, Reference};
use crate::error::{AgentError, Result};
use crate::fetch::FetchEngine;
use crate::materialize::k8s_secret::SecretSync;
use crate::materialize::{self, render, write};
use crate::metrics;
use crate::resolver::Resolver;
use crate::server::{start_server, ServerState};
use crate::bootstrap;
use crate::vault::{self, KsmClient, KsmConfig, VaultProvider};

/// Counts for one refresh cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub fresh: usize,
    pub from_cache: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn materialized(&self) -> usize {
        self.fresh + self.from_cache
    }
}

enum Outcome {
    Fresh,
    FromCache(Duration),
    SkippedEmpty,
    Failed(AgentError),
}

enum FallbackTarget {
    File,
    Folder,
}

pub struct Agent {
    config: AgentConfig,
    fetch: FetchEngine,
    cancel: CancellationToken,
    state: Arc<ServerState>,
    provider: OnceCell<Arc<VaultProvider>>,
    secret_sync: Option<SecretSync>,
    injected_client: std::sync::Mutex<Option<Box<dyn KsmClient>>>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("mode", &self.config.mode)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        let cancel = CancellationToken::new();
        let fetch = FetchEngine::new(config.retry.clone(), config.cache_ttl, cancel.clone());
        let secret_sync = config
            .rotation
            .enabled
            .then(|| SecretSync::new(config.rotation.namespace.clone()));
        Self {
            config,
            fetch,
            cancel,
            state: Arc::new(ServerState::default()),
            provider: OnceCell::new(),
            secret_sync,
            injected_client: std::sync::Mutex::new(None),
        }
    }

    /// Build an agent over an already-connected vault client, skipping
    /// bootstrap. Used by the test suites and mocked runs.
    pub fn with_client(config: AgentConfig, client: Box<dyn KsmClient>) -> Self {
        let agent = Self::new(config);
        *agent
            .injected_client
            .lock()
            .expect("injected client lock poisoned") = Some(client);
        agent
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn server_state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Run the agent to completion: one pass in init mode, the refresh
    /// loop until cancellation in sidecar mode.
    pub async fn run(&self) -> Result<()> {
        info!(mode = ?self.config.mode, "agent booting");

        if self.config.mode == AgentMode::Sidecar {
            let state = Arc::clone(&self.state);
            let shutdown = self.cancel.clone();
            let port = self.config.listen_port;
            tokio::spawn(async move {
                if let Err(e) = start_server(port, state, shutdown).await {
                    error!("HTTP server error: {e}");
                }
            });
        }
        spawn_signal_task(self.cancel.clone());

        // Initial pass. Failure is fatal only under fail_on_error.
        match self.run_cycle(true).await {
            Ok(report) => {
                info!(
                    fresh = report.fresh,
                    from_cache = report.from_cache,
                    skipped = report.skipped,
                    failed = report.failed,
                    "initial pass complete"
                );
            }
            Err(e) => {
                self.state.mark_failed();
                return Err(e);
            }
        }
        self.state.mark_ready();

        if self.config.mode == AgentMode::Init {
            info!("init pass complete, exiting");
            return Ok(());
        }

        // Refresh loop. The ticker never stacks cycles; a missed tick is
        // delayed, not replayed.
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.refresh_interval,
            self.config.refresh_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    // A running sidecar keeps serving previously
                    // materialized files; per-cycle failures never
                    // terminate the process.
                    if let Err(e) = self.run_cycle(false).await {
                        error!("refresh cycle failed: {e}");
                    }
                }
            }
        }

        info!("termination requested, stopping");
        Ok(())
    }

    /// One full fetch-materialize-reconcile pass over every reference.
    pub async fn run_cycle(&self, initial: bool) -> Result<CycleReport> {
        let provider = match self.ensure_provider().await {
            Ok(provider) => provider,
            Err(e) if initial && self.config.fail_on_error => return Err(e),
            Err(e) => {
                error!("vault unavailable, skipping cycle: {e}");
                metrics::record_cycle(true);
                return Ok(CycleReport {
                    failed: self.config.references.len() + self.config.folder_references.len(),
                    ..CycleReport::default()
                });
            }
        };
        let resolver = Resolver::new(provider);

        let mut report = CycleReport::default();
        for reference in &self.config.references {
            let outcome = self.process_reference(&resolver, reference).await;
            self.tally(&mut report, &reference.name, outcome, initial)?;
        }
        for folder in &self.config.folder_references {
            let outcome = self.process_folder(&resolver, folder).await;
            self.tally(&mut report, &folder.name, outcome, initial)?;
        }

        metrics::set_secrets_active(report.materialized() as i64);
        metrics::record_cycle(report.failed > 0);
        Ok(report)
    }

    fn tally(
        &self,
        report: &mut CycleReport,
        name: &str,
        outcome: Outcome,
        initial: bool,
    ) -> Result<()> {
        match outcome {
            Outcome::Fresh => report.fresh += 1,
            Outcome::FromCache(_) => report.from_cache += 1,
            Outcome::SkippedEmpty => report.skipped += 1,
            Outcome::Failed(e) => {
                report.failed += 1;
                if initial && self.config.fail_on_error {
                    return Err(e);
                }
                error!("reference {name} failed: {e}");
            }
        }
        Ok(())
    }

    async fn process_reference(&self, resolver: &Resolver, reference: &Reference) -> Outcome {
        let name = reference.name.clone();
        let start = Instant::now();
        let resolved = self
            .fetch
            .run_with_retry(&name, || resolver.resolve(reference))
            .await;

        match resolved {
            Ok(resolved) => {
                metrics::record_fetch_success(&name, start.elapsed().as_secs_f64());
                if self.cancel.is_cancelled() {
                    return Outcome::Failed(AgentError::Cancelled);
                }

                let bytes = match render::render_reference(reference, &resolved) {
                    Ok(bytes) => bytes,
                    Err(e) => return Outcome::Failed(e),
                };
                if let Err(e) = write::write_atomic(&reference.output_path, &bytes) {
                    return Outcome::Failed(e);
                }
                self.fetch.store(&name, bytes).await;
                metrics::set_cache_age(&name, 0.0);

                self.reconcile_secret(reference, &resolved).await;
                Outcome::Fresh
            }
            Err(AgentError::Cancelled) => Outcome::Failed(AgentError::Cancelled),
            Err(e) => {
                metrics::record_fetch_failure(&name, start.elapsed().as_secs_f64());
                self.fallback(&name, &reference.output_path, FallbackTarget::File, e)
                    .await
            }
        }
    }

    async fn process_folder(&self, resolver: &Resolver, folder: &FolderReference) -> Outcome {
        // Folder references share the cache namespace with references; the
        // prefix keeps the two apart.
        let cache_key = format!("folder:{}", folder.name);
        let start = Instant::now();
        let entries = self
            .fetch
            .run_with_retry(&cache_key, || resolver.resolve_folder(folder))
            .await;

        match entries {
            Ok(entries) => {
                metrics::record_fetch_success(&folder.name, start.elapsed().as_secs_f64());
                if self.cancel.is_cancelled() {
                    return Outcome::Failed(AgentError::Cancelled);
                }
                let payload = match materialize::folder_payload(&entries) {
                    Ok(payload) => payload,
                    Err(e) => return Outcome::Failed(e),
                };
                if let Err(e) = materialize::write_folder(&folder.output_dir, &payload) {
                    return Outcome::Failed(e);
                }
                self.fetch.store(&cache_key, payload).await;
                metrics::set_cache_age(&folder.name, 0.0);
                Outcome::Fresh
            }
            Err(AgentError::Cancelled) => Outcome::Failed(AgentError::Cancelled),
            Err(e) => {
                metrics::record_fetch_failure(&folder.name, start.elapsed().as_secs_f64());
                self.fallback(&cache_key, &folder.output_dir, FallbackTarget::Folder, e)
                    .await
            }
        }
    }

    /// Cache fallback after retries are exhausted: a last-known-good
    /// payload within the TTL is rematerialized, otherwise the reference
    /// is skipped (or failed under fail_on_error). Previously materialized
    /// files are never deleted.
    async fn fallback(
        &self,
        cache_key: &str,
        path: &std::path::Path,
        target: FallbackTarget,
        error: AgentError,
    ) -> Outcome {
        let name = cache_key.strip_prefix("folder:").unwrap_or(cache_key);
        if let Some((payload, age)) = self.fetch.lookup(cache_key).await {
            warn!(
                "serving {name} from cache after upstream failure (cache_age={}s): {error}",
                age.as_secs()
            );
            let written = match target {
                FallbackTarget::File => write::write_atomic(path, &payload),
                FallbackTarget::Folder => materialize::write_folder(path, &payload),
            };
            if let Err(e) = written {
                return Outcome::Failed(e);
            }
            metrics::record_degraded(name, "from_cache");
            metrics::set_cache_age(name, age.as_secs_f64());
            Outcome::FromCache(age)
        } else if self.config.fail_on_error {
            Outcome::Failed(error)
        } else {
            warn!("no usable cache entry for {name}, skipping this cycle: {error}");
            metrics::record_degraded(name, "empty");
            Outcome::SkippedEmpty
        }
    }

    /// Push rotated values into the configured Kubernetes Secret. Only in
    /// sidecar mode with rotation enabled; failures are reported but never
    /// abort the cycle.
    async fn reconcile_secret(&self, reference: &Reference, resolved: &crate::resolver::Resolved) {
        if self.config.mode != AgentMode::Sidecar {
            return;
        }
        let (Some(sync), Some(secret_name)) = (&self.secret_sync, &reference.k8s_secret) else {
            return;
        };
        if let Err(e) = sync
            .merge(
                secret_name,
                &resolved.all_fields,
                reference.k8s_secret_keys.as_ref(),
            )
            .await
        {
            error!("secret rotation for {} failed: {e}", reference.name);
        }
    }

    async fn ensure_provider(&self) -> Result<Arc<VaultProvider>> {
        let provider = self
            .provider
            .get_or_try_init(|| async {
                if let Some(client) = self
                    .injected_client
                    .lock()
                    .expect("injected client lock poisoned")
                    .take()
                {
                    return Ok(Arc::new(VaultProvider::new(
                        client,
                        self.config.strict_lookup,
                    )));
                }

                let blob = tokio::select! {
                    blob = bootstrap::load_ksm_config(&self.config.auth) => blob?,
                    () = self.cancel.cancelled() => return Err(AgentError::Cancelled),
                };
                let ksm_config = KsmConfig::from_base64(&blob)?;
                let client = vault::connect(&ksm_config)?;
                info!("connected to KSM vault at {}", ksm_config.hostname);
                Ok(Arc::new(VaultProvider::new(
                    client,
                    self.config.strict_lookup,
                )))
            })
            .await?;
        Ok(Arc::clone(provider))
    }
}

fn spawn_signal_task(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_termination().await;
        info!("termination signal received");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!("cannot install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
