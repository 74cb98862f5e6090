//! # Tiny Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom
//! - `state`: Set delle immagini già ottimizzate e chiave API salvata
//! - `file_manager`: Discovery immagini, normalizzazione path, sostituzione file
//! - `compressor`: Contratto del servizio di compressione (errori Fatal/Transient)
//! - `tinify`: Client HTTP per l'API Tinify
//! - `optimizer`: Runner incrementale e report del run
//! - `scheduler`: Esecuzione giornaliera a orario fisso
//! - `shutdown`: Segnale di cancellazione
//! - `progress`: Progress bar e statistiche
//! - `json_output`: Eventi JSON per monitoring
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use tiny_optimizer::{Config, IncrementalRunner};
//!
//! let config = Config { folders: vec![path], api_key: Some(key), ..Default::default() };
//! let runner = IncrementalRunner::from_config(config)?;
//! let report = runner.run_once().await?;
//! ```

pub mod compressor;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod optimizer;
pub mod progress;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod tinify;

pub use compressor::{CompressError, CompressOutcome, Compressor};
pub use config::Config;
pub use error::OptimizeError;
pub use file_manager::{FolderScanner, ImagePath, ImageScanner};
pub use optimizer::{IncrementalRunner, Readiness, RunOutcome, RunReport};
pub use scheduler::{DailySchedule, ScheduleHandle, Scheduler};
pub use state::{JsonStateStore, MemoryStateStore, StateStore};
pub use tinify::TinifyClient;
