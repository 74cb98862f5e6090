//! In-process fakes for runner and scheduler tests.

use crate::{
    compressor::{CompressError, CompressOutcome, Compressor},
    config::Config,
    file_manager::{ImagePath, ImageScanner},
    optimizer::IncrementalRunner,
    shutdown::ShutdownTrigger,
    state::{MemoryStateStore, StateStore},
};
use anyhow::Result;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

pub fn ok_outcome() -> CompressOutcome {
    CompressOutcome {
        original_size: 1000,
        compressed_size: 600,
    }
}

#[derive(Default)]
pub struct FixedScanner {
    files: Mutex<BTreeSet<ImagePath>>,
    scans: AtomicUsize,
}

impl FixedScanner {
    pub fn new(paths: &[&str]) -> Self {
        Self {
            files: Mutex::new(paths.iter().map(|p| ImagePath::from(*p)).collect()),
            scans: AtomicUsize::new(0),
        }
    }

    pub async fn replace(&self, paths: &[&str]) {
        *self.files.lock().await = paths.iter().map(|p| ImagePath::from(*p)).collect();
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ImageScanner for FixedScanner {
    async fn scan(&self, _roots: &[PathBuf]) -> Result<BTreeSet<ImagePath>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        Ok(self.files.lock().await.clone())
    }
}

type Scripted = Result<CompressOutcome, CompressError>;

/// Compressor answering from per-path scripts, `ok_outcome()` once a script runs out
#[derive(Default)]
pub struct ScriptedCompressor {
    scripts: Mutex<HashMap<ImagePath, VecDeque<Scripted>>>,
    validation: Mutex<Option<CompressError>>,
    calls: Mutex<Vec<ImagePath>>,
    credentials: Mutex<Vec<String>>,
    validations: AtomicUsize,
    triggers: Mutex<HashMap<ImagePath, ShutdownTrigger>>,
    gate: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl ScriptedCompressor {
    pub async fn script(&self, path: &str, responses: Vec<Scripted>) {
        self.scripts
            .lock()
            .await
            .insert(ImagePath::from(path), responses.into());
    }

    pub async fn reject_credential(&self, err: CompressError) {
        *self.validation.lock().await = Some(err);
    }

    /// Fire `trigger` while compressing `path`
    pub async fn trigger_on(&self, path: &str, trigger: ShutdownTrigger) {
        self.triggers.lock().await.insert(ImagePath::from(path), trigger);
    }

    /// Block the next compression until released; returns (entered, release)
    pub async fn hold(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.gate.lock().await = Some((entered.clone(), release.clone()));
        (entered, release)
    }

    pub async fn calls(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub async fn called_paths(&self) -> Vec<ImagePath> {
        self.calls.lock().await.clone()
    }

    pub async fn last_credential(&self) -> Option<String> {
        self.credentials.lock().await.last().cloned()
    }

    pub fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Compressor for ScriptedCompressor {
    async fn validate(&self, _credential: &str) -> Result<(), CompressError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        match self.validation.lock().await.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn compress(&self, credential: &str, path: &ImagePath) -> Result<CompressOutcome, CompressError> {
        self.calls.lock().await.push(path.clone());
        self.credentials.lock().await.push(credential.to_string());

        let gate = self.gate.lock().await.take();
        if let Some((entered, release)) = gate {
            entered.notify_one();
            release.notified().await;
        }

        let response = self
            .scripts
            .lock()
            .await
            .get_mut(path)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Ok(ok_outcome()));

        let trigger = self.triggers.lock().await.remove(path);
        if let Some(trigger) = trigger {
            trigger.trigger();
        }
        response
    }
}

pub struct Harness {
    pub config: Config,
    pub scanner: Arc<FixedScanner>,
    pub store: Arc<MemoryStateStore>,
    pub compressor: Arc<ScriptedCompressor>,
}

impl Harness {
    pub fn new(paths: &[&str]) -> Self {
        Self {
            config: Config {
                folders: vec![PathBuf::from("/srv")],
                api_key: Some("test-key".to_string()),
                item_delay_ms: 0,
                max_retries: 0,
                retry_backoff_ms: 0,
                show_progress: false,
                ..Default::default()
            },
            scanner: Arc::new(FixedScanner::new(paths)),
            store: Arc::new(MemoryStateStore::new()),
            compressor: Arc::new(ScriptedCompressor::default()),
        }
    }

    pub fn runner(&self) -> IncrementalRunner {
        self.runner_with_store(self.store.clone())
    }

    pub fn runner_with_store(&self, store: Arc<dyn StateStore>) -> IncrementalRunner {
        IncrementalRunner::new(
            self.config.clone(),
            self.scanner.clone(),
            store,
            Some(self.compressor.clone() as Arc<dyn Compressor>),
        )
    }
}
