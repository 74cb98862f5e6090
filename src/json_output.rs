//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON (una riga per evento)
//! per monitoring e comunicazione con altri processi.
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio run con immagini scansionate e pendenti
//! - `file_complete`: Fine elaborazione di un file (ok o errore classificato)
//! - `complete`: Fine run con statistiche ed esito
//! - `error`: Errore che ha impedito il run

use crate::file_manager::ImagePath;
use crate::optimizer::RunReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start {
        folders: Vec<PathBuf>,
        files_scanned: usize,
        files_pending: usize,
        dry_run: bool,
    },

    #[serde(rename = "file_complete")]
    FileComplete {
        path: ImagePath,
        index: usize,
        total: usize,
        ok: bool,
        original_size: Option<u64>,
        compressed_size: Option<u64>,
        error: Option<String>,
        fatal: bool,
        attempts: u32,
    },

    #[serde(rename = "complete")]
    Complete {
        outcome: String,
        fatal_abort: bool,
        files_scanned: usize,
        files_pending: usize,
        files_succeeded: usize,
        files_failed: usize,
        total_bytes_saved: u64,
        reduction_percent: f64,
        duration_seconds: f64,
    },

    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn complete(report: &RunReport) -> Self {
        Self::Complete {
            outcome: report.outcome.label().to_string(),
            fatal_abort: report.is_fatal(),
            files_scanned: report.stats.files_scanned,
            files_pending: report.stats.files_pending,
            files_succeeded: report.stats.files_succeeded,
            files_failed: report.stats.files_failed,
            total_bytes_saved: report.stats.total_bytes_saved,
            reduction_percent: report.stats.overall_reduction_percent(),
            duration_seconds: report.duration.as_secs_f64(),
        }
    }

    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::RunOutcome;
    use crate::progress::RunStats;
    use std::time::Duration;

    #[test]
    fn test_complete_message_shape() {
        let report = RunReport {
            stats: RunStats {
                files_scanned: 3,
                files_pending: 3,
                files_succeeded: 1,
                ..Default::default()
            },
            outcome: RunOutcome::FatalAbort {
                path: ImagePath::from("/srv/b.png"),
                reason: "HTTP 429: limit".to_string(),
            },
            failures: Vec::new(),
            duration: Duration::from_millis(1500),
        };

        let value = serde_json::to_value(JsonMessage::complete(&report)).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["outcome"], "fatal_abort");
        assert_eq!(value["fatal_abort"], true);
        assert_eq!(value["files_succeeded"], 1);
        assert_eq!(value["duration_seconds"], 1.5);
    }

    #[test]
    fn test_file_complete_message_shape() {
        let message = JsonMessage::FileComplete {
            path: ImagePath::from("/srv/a.jpg"),
            index: 1,
            total: 2,
            ok: false,
            original_size: None,
            compressed_size: None,
            error: Some("HTTP 503: busy".to_string()),
            fatal: false,
            attempts: 2,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "file_complete");
        assert_eq!(value["path"], "/srv/a.jpg");
        assert_eq!(value["error"], "HTTP 503: busy");
    }
}
