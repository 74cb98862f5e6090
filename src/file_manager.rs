//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file e la discovery delle immagini.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di immagini nelle cartelle configurate
//! - Normalizzazione dei path (`ImagePath`) per confronti esatti tra insiemi
//! - Sostituzione atomica del file originale con la versione compressa
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati supportati:
//! - **Immagini**: JPG, JPEG, PNG
//!
//! ## Politica sulle estensioni:
//! - Default case-insensitive (`photo.JPG` è eleggibile)
//! - Con `case_sensitive_extensions` solo estensioni minuscole
//!
//! ## Normalizzazione path:
//! - Le radici vengono canonicalizzate prima della scansione
//! - Separatori uniformati a `/`, separatori ripetuti collassati
//! - Radici sovrapposte producono chiavi identiche (deduplicate dal set)
//!
//! ## Esempio:
//! ```rust,ignore
//! let files = FileManager::find_images(&[PathBuf::from("/var/www/uploads")], false)?;
//! for file in &files {
//!     println!("{}", file);
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Normalized identifier of an image file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ImagePath(String);

impl ImagePath {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(normalize(&raw.into()))
    }

    pub fn from_path(path: &Path) -> Self {
        Self::new(path.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }

    /// File name component, used in progress messages
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl From<String> for ImagePath {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for ImagePath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<ImagePath> for String {
    fn from(path: ImagePath) -> Self {
        path.0
    }
}

impl fmt::Display for ImagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(raw: &str) -> String {
    let unified = raw.trim().replace('\\', "/");

    // Leading separators are kept as-is (UNC and verbatim prefixes)
    let body_start = unified.len() - unified.trim_start_matches('/').len();
    let (prefix, body) = unified.split_at(body_start);

    let mut out = String::with_capacity(unified.len());
    out.push_str(prefix);
    let mut previous_was_separator = false;
    for ch in body.chars() {
        if ch == '/' {
            if previous_was_separator {
                continue;
            }
            previous_was_separator = true;
        } else {
            previous_was_separator = false;
        }
        out.push(ch);
    }

    while out.len() > prefix.len().max(1) && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Enumerates eligible images under a set of root folders
#[async_trait::async_trait]
pub trait ImageScanner: Send + Sync {
    async fn scan(&self, roots: &[PathBuf]) -> Result<BTreeSet<ImagePath>>;
}

/// Scanner walking the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FolderScanner {
    case_sensitive: bool,
}

impl FolderScanner {
    pub fn new(case_sensitive: bool) -> Self {
        Self { case_sensitive }
    }
}

#[async_trait::async_trait]
impl ImageScanner for FolderScanner {
    async fn scan(&self, roots: &[PathBuf]) -> Result<BTreeSet<ImagePath>> {
        let roots = roots.to_vec();
        let case_sensitive = self.case_sensitive;
        tokio::task::spawn_blocking(move || FileManager::find_images(&roots, case_sensitive))
            .await
            .context("Folder scan task failed")?
    }
}

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Find all supported images below the given roots
    pub fn find_images(roots: &[PathBuf], case_sensitive: bool) -> Result<BTreeSet<ImagePath>> {
        let mut files = BTreeSet::new();

        for root in roots {
            if !root.is_dir() {
                warn!(root = %root.display(), "Configured folder does not exist, skipping");
                continue;
            }

            let base = root.canonicalize().unwrap_or_else(|_| root.clone());
            debug!("Scanning {}", base.display());

            for entry in WalkDir::new(&base)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                if Self::is_supported_image(path, case_sensitive) {
                    files.insert(ImagePath::from_path(path));
                }
            }
        }

        Ok(files)
    }

    /// Check if a file is a JPG/PNG image
    pub fn is_supported_image(path: &Path, case_sensitive: bool) -> bool {
        let Some(ext) = path.extension() else {
            return false;
        };
        let ext = ext.to_string_lossy();
        let ext = if case_sensitive {
            ext.into_owned()
        } else {
            ext.to_lowercase()
        };
        matches!(ext.as_str(), "jpg" | "jpeg" | "png")
    }

    /// Atomically replace an existing file with new content, keeping its permissions
    pub async fn replace_with_bytes(original: &Path, content: Vec<u8>) -> Result<()> {
        if !tokio::fs::try_exists(original).await? {
            return Err(anyhow::anyhow!("{} no longer exists", original.display()));
        }
        Self::write_atomic(original, content).await
    }

    /// Write through a uniquely named sibling file renamed over `target`.
    /// Permissions of an existing target are carried over.
    pub async fn write_atomic(target: &Path, content: Vec<u8>) -> Result<()> {
        let target = target.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let parent = target
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let permissions = std::fs::metadata(&target).ok().map(|m| m.permissions());

            let mut staged = tempfile::NamedTempFile::new_in(parent)
                .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
            staged.write_all(&content)?;
            staged.as_file().sync_all()?;
            if let Some(permissions) = permissions {
                staged.as_file().set_permissions(permissions)?;
            }
            staged
                .persist(&target)
                .map_err(|e| e.error)
                .with_context(|| format!("Failed to replace {}", target.display()))?;
            Ok(())
        })
        .await
        .context("File replacement task failed")?
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
