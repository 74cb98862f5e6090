//! # Optimizer Module
//!
//! Modulo che separa le responsabilità in sottomoduli:
//! - `runner`: Runner incrementale (precondizioni, diff, loop, persistence)
//! - `report`: Esito del run e statistiche
//! - `progress_tracker`: Gestione progress unificata (barra, stats, JSON)

pub mod progress_tracker;
pub mod report;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use progress_tracker::ProgressTracker;
pub use report::{FileFailure, RunOutcome, RunReport};
pub use runner::{pending_set, IncrementalRunner, Readiness};
