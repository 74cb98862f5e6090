//! # Compressor Interface
//!
//! Contratto tra il runner e il servizio di compressione remoto.
//!
//! Ogni errore per singolo file è classificato esplicitamente:
//! - `Fatal`: problema a livello di account (chiave revocata, quota esaurita).
//!   Il runner smette subito di processare altri file.
//! - `Transient`: qualsiasi altro problema (rete, file corrotto, errore API
//!   temporaneo). Il file resta pendente e verrà ritentato al prossimo run.

use crate::file_manager::ImagePath;

/// Classified compression failure
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompressError {
    #[error("account error: {0}")]
    Fatal(String),

    #[error("{0}")]
    Transient(String),
}

impl CompressError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Fatal(reason) | Self::Transient(reason) => reason,
        }
    }
}

/// Sizes before and after a successful compression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressOutcome {
    pub original_size: u64,
    pub compressed_size: u64,
}

impl CompressOutcome {
    pub fn bytes_saved(&self) -> u64 {
        self.original_size.saturating_sub(self.compressed_size)
    }
}

#[async_trait::async_trait]
pub trait Compressor: Send + Sync {
    /// Check the credential against the service before any file is sent
    async fn validate(&self, credential: &str) -> Result<(), CompressError>;

    /// Compress one image in place
    async fn compress(&self, credential: &str, path: &ImagePath) -> Result<CompressOutcome, CompressError>;
}
