//! # Incremental Runner
//!
//! Un singolo passaggio di ottimizzazione incrementale.
//!
//! ## Flusso di esecuzione:
//! 1. **Lock**: un solo run alla volta, anche tra processi diversi che
//!    condividono lo stesso file di stato (`AlreadyRunning` altrimenti)
//! 2. **Precondizioni**: client di compressione e chiave API presenti
//! 3. **Discovery**: immagini eleggibili meno quelle già ottimizzate = pendenti
//! 4. **Validazione chiave**: solo se c'è lavoro da fare
//! 5. **Loop sequenziale**: pausa fissa tra i file, retry per file
//!    (il timeout delle richieste HTTP è applicato dal client)
//! 6. **Persistence**: merge dei successi nel set ottimizzato, una sola scrittura
//!
//! ## Gestione errori per file:
//! - `Fatal`: stop immediato del loop, i progressi fatti vengono salvati
//! - `Transient`: log e si prosegue, il file resta pendente per il prossimo run
//!
//! ## Cancellazione:
//! Lo `Shutdown` interrompe la pausa tra i file e l'attesa tra i retry. Una
//! compressione già avviata viene portata a termine: il file potrebbe essere
//! già stato sostituito su disco e deve finire nel set ottimizzato. I successi
//! ottenuti prima dell'interruzione vengono comunque salvati.

use crate::{
    compressor::{CompressError, CompressOutcome, Compressor},
    config::Config,
    error::OptimizeError,
    file_manager::{FolderScanner, ImagePath, ImageScanner},
    json_output::JsonMessage,
    optimizer::{
        progress_tracker::ProgressTracker,
        report::{RunOutcome, RunReport},
    },
    progress::RunStats,
    shutdown::Shutdown,
    state::{JsonStateStore, StateStore},
    tinify::TinifyClient,
};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Whether a run can start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    MissingCompressor,
    MissingCredential,
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Ready => write!(f, "ready"),
            Readiness::MissingCompressor => write!(f, "compression client is not available"),
            Readiness::MissingCredential => write!(f, "no API key configured"),
        }
    }
}

/// Eligible images not yet optimised, in deterministic order
pub fn pending_set(eligible: &BTreeSet<ImagePath>, optimised: &BTreeSet<ImagePath>) -> BTreeSet<ImagePath> {
    eligible.difference(optimised).cloned().collect()
}

pub struct IncrementalRunner {
    config: Config,
    scanner: Arc<dyn ImageScanner>,
    store: Arc<dyn StateStore>,
    compressor: Option<Arc<dyn Compressor>>,
    run_lock: Mutex<()>,
}

impl IncrementalRunner {
    pub fn new(
        config: Config,
        scanner: Arc<dyn ImageScanner>,
        store: Arc<dyn StateStore>,
        compressor: Option<Arc<dyn Compressor>>,
    ) -> Self {
        Self {
            config,
            scanner,
            store,
            compressor,
            run_lock: Mutex::new(()),
        }
    }

    /// Wire the filesystem scanner, JSON state store and Tinify client
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let store = match config.state_file {
            Some(ref path) => JsonStateStore::new(path.clone()),
            None => JsonStateStore::default_location()?,
        };
        debug!("Using state file {}", store.path().display());
        let store: Arc<dyn StateStore> = Arc::new(store);

        let compressor: Option<Arc<dyn Compressor>> =
            match TinifyClient::new(config.api_endpoint.clone(), config.request_timeout()) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!("Compression client unavailable: {}", e);
                    None
                }
            };

        let scanner = Arc::new(FolderScanner::new(config.case_sensitive_extensions));
        Ok(Self::new(config, scanner, store, compressor))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    async fn resolve_credential(&self) -> Result<Option<String>> {
        if let Some(key) = self.config.credential() {
            return Ok(Some(key));
        }
        Ok(self
            .store
            .load_credential()
            .await?
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty()))
    }

    async fn preflight(&self) -> Result<std::result::Result<(Arc<dyn Compressor>, String), Readiness>> {
        let Some(ref compressor) = self.compressor else {
            return Ok(Err(Readiness::MissingCompressor));
        };
        match self.resolve_credential().await? {
            Some(credential) => Ok(Ok((compressor.clone(), credential))),
            None => Ok(Err(Readiness::MissingCredential)),
        }
    }

    pub async fn can_run(&self) -> Result<Readiness> {
        Ok(match self.preflight().await? {
            Ok(_) => Readiness::Ready,
            Err(readiness) => readiness,
        })
    }

    /// Run without an external cancellation signal
    pub async fn run_once(&self) -> Result<RunReport> {
        self.run(Shutdown::never()).await
    }

    pub async fn run(&self, shutdown: Shutdown) -> Result<RunReport> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| OptimizeError::AlreadyRunning)?;
        let Some(_lease) = self.store.try_lock_run().await? else {
            warn!("State file is locked by another optimisation run");
            return Err(OptimizeError::AlreadyRunning.into());
        };

        let started = Instant::now();
        let mut report = self.run_locked(shutdown).await?;
        report.duration = started.elapsed();

        if self.config.json_output {
            JsonMessage::complete(&report).emit();
        }
        Ok(report)
    }

    async fn run_locked(&self, mut shutdown: Shutdown) -> Result<RunReport> {
        let (compressor, credential) = match self.preflight().await? {
            Ok(ready) => ready,
            Err(readiness) => {
                warn!("Skipping optimisation run: {}", readiness);
                return Ok(RunReport::new(RunOutcome::NotReady(readiness)));
            }
        };

        info!("Starting optimisation run over {} folder(s)", self.config.folders.len());

        let eligible = self.scanner.scan(&self.config.folders).await?;
        let mut optimised = self.store.load_optimised().await?;
        let pending = pending_set(&eligible, &optimised);

        let mut stats = RunStats::new();
        stats.files_scanned = eligible.len();
        stats.files_pending = pending.len();
        info!("Found {} images, {} not yet optimised", eligible.len(), pending.len());

        if self.config.json_output {
            JsonMessage::Start {
                folders: self.config.folders.clone(),
                files_scanned: stats.files_scanned,
                files_pending: stats.files_pending,
                dry_run: self.config.dry_run,
            }
            .emit();
        }

        if pending.is_empty() {
            info!("Nothing to optimise");
            let mut report = RunReport::new(RunOutcome::NothingPending);
            report.stats = stats;
            return Ok(report);
        }

        if self.config.dry_run {
            for path in &pending {
                info!(path = %path, "Would optimise");
            }
            let mut report = RunReport::new(RunOutcome::DryRun);
            report.stats = stats;
            return Ok(report);
        }

        if let Err(e) = compressor.validate(&credential).await {
            error!(reason = %e, "API key validation failed, no image will be processed");
            let mut report = RunReport::new(RunOutcome::CredentialRejected(e.reason().to_string()));
            report.stats = stats;
            return Ok(report);
        }

        let mut tracker = ProgressTracker::new(stats, self.config.json_output, self.config.show_progress);
        let mut succeeded = BTreeSet::new();
        let mut outcome = RunOutcome::Completed;
        let delay = self.config.item_delay();

        for (position, path) in pending.iter().enumerate() {
            if shutdown.is_triggered() {
                outcome = RunOutcome::Cancelled;
                break;
            }

            if position > 0 && !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.wait() => {
                        outcome = RunOutcome::Cancelled;
                        break;
                    }
                }
            }

            let (result, attempts) = self
                .compress_with_retry(compressor.as_ref(), &credential, path, &mut shutdown)
                .await;

            match result {
                Ok(compressed) => {
                    tracker.file_succeeded(position + 1, path, compressed, attempts);
                    succeeded.insert(path.clone());
                }
                Err(err) => {
                    tracker.file_failed(position + 1, path, &err, attempts);
                    if let CompressError::Fatal(reason) = err {
                        outcome = RunOutcome::FatalAbort {
                            path: path.clone(),
                            reason,
                        };
                        break;
                    }
                }
            }
        }

        if outcome == RunOutcome::Cancelled {
            warn!("Shutdown requested, stopping after {} optimised image(s)", succeeded.len());
        }

        let (stats, failures) = tracker.finish(outcome != RunOutcome::Completed);

        if !succeeded.is_empty() {
            optimised.extend(succeeded);
            self.store
                .save_optimised(&optimised)
                .await
                .context("Failed to persist optimised images")?;
            debug!("Optimised set now holds {} images", optimised.len());
        }

        Ok(RunReport {
            stats,
            outcome,
            failures,
            duration: std::time::Duration::ZERO,
        })
    }

    async fn compress_with_retry(
        &self,
        compressor: &dyn Compressor,
        credential: &str,
        path: &ImagePath,
        shutdown: &mut Shutdown,
    ) -> (std::result::Result<CompressOutcome, CompressError>, u32) {
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            // Not raced against shutdown: the file may already be replaced on disk
            let result = compressor.compress(credential, path).await;

            let retry = matches!(result, Err(CompressError::Transient(_))) && attempt < max_attempts;
            if !retry {
                return (result, attempt);
            }
            if let Err(ref e) = result {
                debug!(path = %path, attempt, reason = %e, "Transient failure, retrying");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_backoff() * attempt) => {}
                _ = shutdown.wait() => return (result, attempt),
            }
            attempt += 1;
        }
    }
}
