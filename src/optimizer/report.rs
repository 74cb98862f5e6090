//! # Run Report
//!
//! Esito osservabile di un run: contatori, errori per file e motivo di
//! terminazione. È l'unico output del runner oltre ai log e al delta dello stato.

use crate::file_manager::ImagePath;
use crate::optimizer::runner::Readiness;
use crate::progress::RunStats;
use std::time::Duration;
use tracing::{error, info, warn};

/// Why a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every pending file was attempted
    Completed,
    /// Eligible set already fully optimised
    NothingPending,
    /// Pending files listed, nothing compressed
    DryRun,
    /// Preconditions unmet, nothing attempted
    NotReady(Readiness),
    /// Credential validation failed before any file
    CredentialRejected(String),
    /// Account-level error stopped the loop
    FatalAbort { path: ImagePath, reason: String },
    /// Shutdown requested mid-run
    Cancelled,
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NothingPending => "nothing_pending",
            Self::DryRun => "dry_run",
            Self::NotReady(Readiness::Ready) => "ready",
            Self::NotReady(Readiness::MissingCompressor) => "missing_compressor",
            Self::NotReady(Readiness::MissingCredential) => "missing_credential",
            Self::CredentialRejected(_) => "credential_rejected",
            Self::FatalAbort { .. } => "fatal_abort",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CredentialRejected(_) | Self::FatalAbort { .. })
    }
}

/// A transient failure, retried on the next run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: ImagePath,
    pub reason: String,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: RunStats,
    pub outcome: RunOutcome,
    pub failures: Vec<FileFailure>,
    pub duration: Duration,
}

impl RunReport {
    pub fn new(outcome: RunOutcome) -> Self {
        Self {
            stats: RunStats::new(),
            outcome,
            failures: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.outcome.is_fatal()
    }

    pub fn log_summary(&self) {
        info!("=== Optimisation Run Complete ===");
        info!("Images scanned: {}", self.stats.files_scanned);
        info!("Images pending: {}", self.stats.files_pending);
        info!("Images optimised this run: {}", self.stats.files_succeeded);
        info!("Transient failures this run: {}", self.stats.files_failed);
        info!("Bytes saved this run: {}", crate::file_manager::FileManager::format_size(self.stats.total_bytes_saved));

        match &self.outcome {
            RunOutcome::FatalAbort { path, reason } => {
                error!(path = %path, reason = %reason, untouched = self.stats.files_untouched(), "Run aborted on account error");
            }
            RunOutcome::CredentialRejected(reason) => {
                error!(reason = %reason, "Run aborted, credential rejected");
            }
            RunOutcome::NotReady(readiness) => {
                warn!("Run skipped: {}", readiness);
            }
            RunOutcome::Cancelled => {
                warn!(untouched = self.stats.files_untouched(), "Run cancelled, progress saved");
            }
            other => info!("Outcome: {}", other.label()),
        }
    }
}
