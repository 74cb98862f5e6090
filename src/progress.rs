//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di un run.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per feedback real-time
//! - Tracking statistiche del run (scansionati, pendenti, compressi, errori)
//! - Calcolo percentuali di riduzione e byte risparmiati
//!
//! ## Componenti principali:
//! - `ProgressManager`: Gestisce progress bar principale (nascosta in modalità JSON)
//! - `RunStats`: Traccia statistiche cumulative del run
//!
//! ## Statistiche tracciate:
//! - **files_scanned**: Immagini eleggibili trovate su disco
//! - **files_pending**: Immagini non ancora ottimizzate
//! - **files_succeeded**: Compressioni riuscite in questo run
//! - **files_failed**: Errori transitori (ritentati al prossimo run)
//! - **total_original_size** / **total_bytes_saved**: Byte prima e risparmiati
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:02:15] [========================================] 150/150 (100%) [OK] photo.jpg: 45.2% saved
//! ```

use crate::file_manager::FileManager;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Manages progress reporting for a run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Progress manager that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Stop drawing without completing the bar
    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}

/// Statistics for one run
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub files_scanned: usize,
    pub files_pending: usize,
    pub files_succeeded: usize,
    pub files_failed: usize,
    pub total_original_size: u64,
    pub total_bytes_saved: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_succeeded(&mut self, original_size: u64, new_size: u64) {
        self.files_succeeded += 1;
        self.total_original_size += original_size;
        self.total_bytes_saved += original_size.saturating_sub(new_size);
    }

    pub fn add_failed(&mut self) {
        self.files_failed += 1;
    }

    /// Pending files neither compressed nor failed (abort or cancellation)
    pub fn files_untouched(&self) -> usize {
        self.files_pending
            .saturating_sub(self.files_succeeded + self.files_failed)
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.total_bytes_saved as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Scanned: {} | Pending: {} | Optimised: {} | Failed: {} | Total saved: {} ({:.2}%)",
            self.files_scanned,
            self.files_pending,
            self.files_succeeded,
            self.files_failed,
            FileManager::format_size(self.total_bytes_saved),
            self.overall_reduction_percent()
        )
    }
}
