//! # State Management Module
//!
//! Questo modulo gestisce il tracking delle immagini già ottimizzate per evitare
//! di ricomprimerle (ogni compressione consuma quota dell'account API).
//!
//! ## Responsabilità:
//! - Traccia quali file sono già stati compressi con successo
//! - Persiste lo stato in un file JSON
//! - Conserva la chiave API salvata con `--save-key`
//!
//! ## Strutture dati:
//! - `StateFile`: Contenuto serializzato (set ottimizzato, chiave API, timestamp)
//! - `StateStore`: Trait per lettura/scrittura dello stato
//! - `JsonStateStore`: Implementazione su file JSON
//! - `MemoryStateStore`: Implementazione in memoria (embedding e test)
//!
//! ## Strategia di persistence:
//! - Un singolo file, default `~/.tiny-optimizer/state.json`
//! - Scrittura su file temporaneo univoco + rename, mai file troncati
//! - Lock esclusivo su `state.json.lock` per tutta la durata di un run:
//!   due processi (daemon + run manuale) non possono sovrapporsi
//! - Il set cresce soltanto: nessuna invalidazione se il file cambia
//! - File corrotto = errore (mai ripartire da zero silenziosamente)
//!
//! ## Esempio struttura state file:
//! ```json
//! {
//!   "optimised_files": [
//!     "/var/www/uploads/2024/05/a.jpg",
//!     "/var/www/uploads/2024/05/b.png"
//!   ],
//!   "api_key": null,
//!   "updated_at": 1714521600
//! }
//! ```

use crate::error::OptimizeError;
use crate::file_manager::{FileManager, ImagePath};
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};

const STATE_DIR: &str = ".tiny-optimizer";
const STATE_FILE: &str = "state.json";

/// Serialized state
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StateFile {
    pub optimised_files: BTreeSet<ImagePath>,
    pub api_key: Option<String>,
    pub updated_at: Option<u64>,
}

/// Exclusive right to run against a store, released on drop
pub struct RunLease {
    held: LeaseKind,
}

enum LeaseKind {
    File(std::fs::File),
    Memory { _guard: OwnedMutexGuard<()> },
}

impl Drop for RunLease {
    fn drop(&mut self) {
        if let LeaseKind::File(ref file) = self.held {
            let _ = FileExt::unlock(file);
        }
    }
}

/// Persistent storage for the optimised set and the API credential
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    /// `None` when another run holds the store
    async fn try_lock_run(&self) -> Result<Option<RunLease>>;
    async fn load_optimised(&self) -> Result<BTreeSet<ImagePath>>;
    async fn save_optimised(&self, optimised: &BTreeSet<ImagePath>) -> Result<()>;
    async fn load_credential(&self) -> Result<Option<String>>;
    async fn save_credential(&self, credential: &str) -> Result<()>;
}

/// State store backed by a JSON file
pub struct JsonStateStore {
    state_file_path: PathBuf,
}

impl JsonStateStore {
    pub fn new(state_file_path: PathBuf) -> Self {
        Self { state_file_path }
    }

    /// Store at `~/.tiny-optimizer/state.json`
    pub fn default_location() -> Result<Self> {
        let state_dir = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?
            .join(STATE_DIR);
        Ok(Self::new(state_dir.join(STATE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.state_file_path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.state_file_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    async fn read(&self) -> Result<StateFile> {
        if !self.state_file_path.exists() {
            return Ok(StateFile::default());
        }

        let content = fs::read_to_string(&self.state_file_path)
            .await
            .with_context(|| format!("Failed to read state file {}", self.state_file_path.display()))?;
        let mut state: StateFile = serde_json::from_str(&content).map_err(|e| {
            OptimizeError::State(format!("{} is corrupted: {}", self.state_file_path.display(), e))
        })?;
        state.optimised_files.retain(|path| !path.is_empty());
        Ok(state)
    }

    async fn write(&self, mut state: StateFile) -> Result<()> {
        if let Some(parent) = self.state_file_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        state.updated_at = Some(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)?
                .as_secs(),
        );
        let content = serde_json::to_string_pretty(&state)?;

        FileManager::write_atomic(&self.state_file_path, content.into_bytes())
            .await
            .with_context(|| format!("Failed to write state file {}", self.state_file_path.display()))
    }
}

#[async_trait::async_trait]
impl StateStore for JsonStateStore {
    async fn try_lock_run(&self) -> Result<Option<RunLease>> {
        let lock_path = self.lock_path();
        tokio::task::spawn_blocking(move || -> Result<Option<RunLease>> {
            if let Some(parent) = lock_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)
                .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

            match file.try_lock_exclusive() {
                Ok(()) => Ok(Some(RunLease {
                    held: LeaseKind::File(file),
                })),
                Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
                Err(e) => Err(e).with_context(|| format!("Failed to lock {}", lock_path.display())),
            }
        })
        .await
        .context("State lock task failed")?
    }

    async fn load_optimised(&self) -> Result<BTreeSet<ImagePath>> {
        Ok(self.read().await?.optimised_files)
    }

    async fn save_optimised(&self, optimised: &BTreeSet<ImagePath>) -> Result<()> {
        let mut state = self.read().await?;
        state.optimised_files = optimised.clone();
        self.write(state).await
    }

    async fn load_credential(&self) -> Result<Option<String>> {
        Ok(self.read().await?.api_key)
    }

    async fn save_credential(&self, credential: &str) -> Result<()> {
        let mut state = self.read().await?;
        state.api_key = Some(credential.trim().to_string());
        self.write(state).await
    }
}

/// In-memory state store
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<StateFile>,
    saves: Mutex<usize>,
    run_lock: Arc<Mutex<()>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_optimised(optimised: impl IntoIterator<Item = ImagePath>) -> Self {
        Self {
            state: Mutex::new(StateFile {
                optimised_files: optimised.into_iter().collect(),
                ..Default::default()
            }),
            saves: Mutex::new(0),
            run_lock: Arc::default(),
        }
    }

    /// Number of times the optimised set was written
    pub async fn save_count(&self) -> usize {
        *self.saves.lock().await
    }

    pub async fn snapshot(&self) -> BTreeSet<ImagePath> {
        self.state.lock().await.optimised_files.clone()
    }
}

#[async_trait::async_trait]
impl StateStore for MemoryStateStore {
    async fn try_lock_run(&self) -> Result<Option<RunLease>> {
        Ok(self.run_lock.clone().try_lock_owned().ok().map(|guard| RunLease {
            held: LeaseKind::Memory { _guard: guard },
        }))
    }

    async fn load_optimised(&self) -> Result<BTreeSet<ImagePath>> {
        Ok(self.state.lock().await.optimised_files.clone())
    }

    async fn save_optimised(&self, optimised: &BTreeSet<ImagePath>) -> Result<()> {
        self.state.lock().await.optimised_files = optimised.clone();
        *self.saves.lock().await += 1;
        Ok(())
    }

    async fn load_credential(&self) -> Result<Option<String>> {
        Ok(self.state.lock().await.api_key.clone())
    }

    async fn save_credential(&self, credential: &str) -> Result<()> {
        self.state.lock().await.api_key = Some(credential.trim().to_string());
        Ok(())
    }
}
