//! # Progress Tracking Module
//!
//! Unifica progress bar, statistiche del run ed eventi JSON in un singolo tracker.
//! Il loop del runner è sequenziale, quindi niente lock.

use crate::{
    compressor::{CompressError, CompressOutcome},
    file_manager::ImagePath,
    json_output::JsonMessage,
    optimizer::report::FileFailure,
    progress::{ProgressManager, RunStats},
};
use tracing::{error, info, warn};

pub struct ProgressTracker {
    total: usize,
    json_output: bool,
    stats: RunStats,
    failures: Vec<FileFailure>,
    progress_manager: ProgressManager,
}

impl ProgressTracker {
    /// Crea un nuovo tracker per `stats.files_pending` file
    pub fn new(stats: RunStats, json_output: bool, show_progress: bool) -> Self {
        let total = stats.files_pending;
        let progress_manager = if show_progress && !json_output {
            ProgressManager::new(total as u64)
        } else {
            ProgressManager::hidden()
        };

        Self {
            total,
            json_output,
            stats,
            failures: Vec::new(),
            progress_manager,
        }
    }

    pub fn file_succeeded(&mut self, index: usize, path: &ImagePath, outcome: CompressOutcome, attempts: u32) {
        self.stats.add_succeeded(outcome.original_size, outcome.compressed_size);

        let reduction = crate::file_manager::FileManager::calculate_reduction(
            outcome.original_size,
            outcome.compressed_size,
        );
        info!(path = %path, saved = outcome.bytes_saved(), "Optimised ({:.1}% smaller)", reduction);

        if self.json_output {
            JsonMessage::FileComplete {
                path: path.clone(),
                index,
                total: self.total,
                ok: true,
                original_size: Some(outcome.original_size),
                compressed_size: Some(outcome.compressed_size),
                error: None,
                fatal: false,
                attempts,
            }
            .emit();
        }

        self.progress_manager
            .update(&format!("[OK] {}: {:.1}% saved", path.file_name(), reduction));
    }

    pub fn file_failed(&mut self, index: usize, path: &ImagePath, err: &CompressError, attempts: u32) {
        match err {
            CompressError::Fatal(reason) => {
                error!(path = %path, reason = %reason, attempts, "Account-level compression error, stopping run");
            }
            CompressError::Transient(reason) => {
                self.stats.add_failed();
                self.failures.push(FileFailure {
                    path: path.clone(),
                    reason: reason.clone(),
                    attempts,
                });
                warn!(path = %path, reason = %reason, attempts, "Compression failed, will retry next run");
            }
        }

        if self.json_output {
            JsonMessage::FileComplete {
                path: path.clone(),
                index,
                total: self.total,
                ok: false,
                original_size: None,
                compressed_size: None,
                error: Some(err.reason().to_string()),
                fatal: err.is_fatal(),
                attempts,
            }
            .emit();
        }

        self.progress_manager
            .update(&format!("[ERROR] {}: {}", path.file_name(), err.reason()));
    }

    /// Chiude la progress bar e restituisce stats e failure raccolte
    pub fn finish(self, interrupted: bool) -> (RunStats, Vec<FileFailure>) {
        let summary = self.stats.format_summary();
        if interrupted {
            self.progress_manager.abandon(&summary);
        } else {
            self.progress_manager.finish(&summary);
        }
        (self.stats, self.failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts_only_transient_failures() {
        let stats = RunStats {
            files_scanned: 5,
            files_pending: 3,
            ..Default::default()
        };
        let mut tracker = ProgressTracker::new(stats, false, false);

        tracker.file_succeeded(
            1,
            &ImagePath::from("/srv/a.jpg"),
            CompressOutcome {
                original_size: 100,
                compressed_size: 40,
            },
            1,
        );
        tracker.file_failed(2, &ImagePath::from("/srv/b.jpg"), &CompressError::Transient("503".into()), 2);
        tracker.file_failed(3, &ImagePath::from("/srv/c.jpg"), &CompressError::Fatal("401".into()), 1);

        let (stats, failures) = tracker.finish(true);
        assert_eq!(stats.files_succeeded, 1);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.total_bytes_saved, 60);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].attempts, 2);
    }
}
