//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri del runner
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `folders`: Cartelle radice da scansionare (ricorsivamente)
//! - `api_key`: Chiave API Tinify (default: None = usa quella salvata nello stato)
//! - `api_endpoint`: Endpoint API (default: "https://api.tinify.com")
//! - `state_file`: File di stato (default: None = `~/.tiny-optimizer/state.json`)
//! - `schedule_at`: Orario giornaliero del run schedulato (default: "03:00")
//! - `item_delay_ms`: Pausa fissa tra un file e il successivo (default: 1000)
//! - `request_timeout_secs`: Timeout di ogni richiesta HTTP all'API (default: 60)
//! - `max_retries`: Tentativi extra per errori transitori (default: 1)
//! - `retry_backoff_ms`: Attesa base tra i tentativi (default: 2000)
//! - `case_sensitive_extensions`: Estensioni solo minuscole (default: false)
//! - `dry_run`: Mostra i file pendenti senza comprimerli (default: false)
//! - `json_output`: Eventi JSON su stdout (default: false)
//! - `show_progress`: Progress bar interattiva (default: true)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     folders: vec!["/var/www/uploads".into()],
//!     item_delay_ms: 500,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::error::OptimizeError;
use crate::scheduler::DailySchedule;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_ENDPOINT: &str = "https://api.tinify.com";

/// Configuration for the optimisation runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root folders scanned for JPG/PNG images
    pub folders: Vec<PathBuf>,
    /// Tinify API key
    pub api_key: Option<String>,
    /// Base URL of the compression API
    pub api_endpoint: String,
    /// State file holding the optimised set (None = default location)
    pub state_file: Option<PathBuf>,
    /// Local time of the daily run, "HH:MM" or "HH:MM:SS"
    pub schedule_at: String,
    /// Fixed pause between two files
    pub item_delay_ms: u64,
    /// Timeout of each HTTP request to the compression API
    pub request_timeout_secs: u64,
    /// Extra attempts for a transient failure
    pub max_retries: u32,
    /// Base wait between attempts, multiplied by the attempt number
    pub retry_backoff_ms: u64,
    /// Only lowercase extensions are eligible
    pub case_sensitive_extensions: bool,
    /// List pending files without compressing or persisting anything
    pub dry_run: bool,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
    /// Draw a progress bar while compressing
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            api_key: None,
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            state_file: None,
            schedule_at: "03:00".to_string(),
            item_delay_ms: 1000,
            request_timeout_secs: 60,
            max_retries: 1,
            retry_backoff_ms: 2000,
            case_sensitive_extensions: false,
            dry_run: false,
            json_output: false,
            show_progress: true,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.folders.is_empty() {
            return Err(OptimizeError::Config("At least one folder must be configured".to_string()).into());
        }

        if !self.api_endpoint.starts_with("http://") && !self.api_endpoint.starts_with("https://") {
            return Err(OptimizeError::Config(format!(
                "API endpoint must be an http(s) URL: {}",
                self.api_endpoint
            ))
            .into());
        }

        if self.request_timeout_secs == 0 {
            return Err(OptimizeError::Config("Request timeout must be greater than 0".to_string()).into());
        }

        if let Some(ref state_file) = self.state_file {
            if state_file.is_dir() {
                return Err(OptimizeError::Config(format!(
                    "State file path is a directory: {}",
                    state_file.display()
                ))
                .into());
            }
        }

        self.schedule()?;

        Ok(())
    }

    /// Parsed daily schedule
    pub fn schedule(&self) -> Result<DailySchedule> {
        DailySchedule::parse(&self.schedule_at)
    }

    /// The configured key, if it is not blank
    pub fn credential(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn with_folder() -> Config {
        Config {
            folders: vec![PathBuf::from("/srv/uploads")],
            ..Default::default()
        }
    }

    #[test]
    fn test_config_validation() {
        let mut config = with_folder();
        assert!(config.validate().is_ok());

        config.folders.clear();
        assert!(config.validate().is_err());

        config = with_folder();
        config.api_endpoint = "ftp://api.tinify.com".to_string();
        assert!(config.validate().is_err());

        config = with_folder();
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        config = with_folder();
        config.schedule_at = "25:00".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.api_endpoint, DEFAULT_API_ENDPOINT);
        assert_eq!(config.schedule_at, "03:00");
        assert_eq!(config.item_delay_ms, 1000);
        assert_eq!(config.max_retries, 1);
        assert!(!config.case_sensitive_extensions);
        assert!(!config.dry_run);
        assert!(config.show_progress);
    }

    #[test]
    fn test_blank_credential_is_missing() {
        let mut config = with_folder();
        assert_eq!(config.credential(), None);

        config.api_key = Some("   ".to_string());
        assert_eq!(config.credential(), None);

        config.api_key = Some(" abc123 ".to_string());
        assert_eq!(config.credential().as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let original_config = Config {
            folders: vec![PathBuf::from("/srv/a"), PathBuf::from("/srv/b")],
            api_key: Some("key".to_string()),
            schedule_at: "04:30".to_string(),
            item_delay_ms: 250,
            case_sensitive_extensions: true,
            ..Default::default()
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.folders, original_config.folders);
        assert_eq!(loaded_config.api_key.as_deref(), Some("key"));
        assert_eq!(loaded_config.schedule_at, "04:30");
        assert_eq!(loaded_config.item_delay_ms, 250);
        assert!(loaded_config.case_sensitive_extensions);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(&config_path, r#"{ "folders": ["/srv/uploads"] }"#)
            .await
            .unwrap();

        let config = Config::from_file(&config_path).await.unwrap();
        assert_eq!(config.folders, vec![PathBuf::from("/srv/uploads")]);
        assert_eq!(config.request_timeout_secs, 60);
        assert!(config.validate().is_ok());
    }
}
