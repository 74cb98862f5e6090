//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore infrastrutturali dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` enum per gli errori che interrompono un run
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O (file non trovati, permessi, etc.)
//! - `State`: Errori di gestione file di stato (JSON corrotto, etc.)
//! - `Config`: Errori di validazione della configurazione
//! - `Http`: Errori nella costruzione del client HTTP
//! - `AlreadyRunning`: Un altro run è già in corso
//!
//! Gli errori per singolo file (Fatal/Transient) vivono in
//! `compressor::CompressError`: non interrompono il processo, vengono
//! classificati e gestiti dal runner.
//!
//! ## Esempio:
//! ```rust,ignore
//! if folders.is_empty() {
//!     return Err(OptimizeError::Config("no folders configured".to_string()));
//! }
//! ```

/// Custom error types for the optimisation runner
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file error: {0}")]
    State(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("An optimisation run is already in progress")]
    AlreadyRunning,
}
