//! # Tinify API Client
//!
//! Implementazione HTTP di `Compressor` sopra l'API Tinify (TinyPNG/TinyJPG).
//!
//! ## Protocollo:
//! 1. `POST /shrink` con i byte dell'immagine (basic auth `api:<chiave>`)
//! 2. Risposta `201` con header `Location` verso il risultato compresso
//! 3. `GET` del risultato e sostituzione atomica del file originale
//!
//! ## Classificazione errori:
//! - `401 Unauthorized`: chiave non valida o revocata -> `Fatal`
//! - `429 Too Many Requests`: limite mensile dell'account -> `Fatal`
//! - Qualsiasi altro status, errore di rete o payload inatteso -> `Transient`
//!
//! Il timeout vale per ogni richiesta HTTP. La sostituzione del file non è
//! soggetta a timeout.
//!
//! ## Validazione chiave:
//! Un `POST /shrink` senza body: `400` (input mancante) significa che la chiave
//! è stata accettata; anche `429` indica una chiave valida con quota esaurita.

use crate::compressor::{CompressError, CompressOutcome, Compressor};
use crate::error::OptimizeError;
use crate::file_manager::{FileManager, ImagePath};
use image::ImageFormat;
use reqwest::header::LOCATION;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const API_USER: &str = "api";
const COMPRESSION_COUNT_HEADER: &str = "Compression-Count";

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ShrinkResponse {
    output: Option<ShrinkOutput>,
}

#[derive(Debug, Deserialize)]
struct ShrinkOutput {
    size: u64,
    url: Option<String>,
}

/// Compression client for the Tinify HTTP API
#[derive(Clone)]
pub struct TinifyClient {
    http: Client,
    endpoint: String,
}

impl TinifyClient {
    /// `request_timeout` bounds every request, upload and download alike
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, OptimizeError> {
        let http = Client::builder()
            .connect_timeout(request_timeout)
            .timeout(request_timeout)
            .user_agent(concat!("tiny-optimizer/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), path)
    }

    fn log_compression_count(response: &Response) {
        if let Some(count) = response
            .headers()
            .get(COMPRESSION_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            debug!("Compressions used this month: {}", count);
        }
    }

    async fn download(&self, credential: &str, url: &str) -> Result<Vec<u8>, CompressError> {
        let response = self
            .http
            .get(url)
            .basic_auth(API_USER, Some(credential))
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &describe_error_body(&body)));
        }

        Ok(response.bytes().await.map_err(request_error)?.to_vec())
    }
}

#[async_trait::async_trait]
impl Compressor for TinifyClient {
    async fn validate(&self, credential: &str) -> Result<(), CompressError> {
        let response = self
            .http
            .post(self.url("/shrink"))
            .basic_auth(API_USER, Some(credential))
            .send()
            .await
            .map_err(request_error)?;

        Self::log_compression_count(&response);
        let status = response.status();
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::BAD_REQUEST => Ok(()),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("API key is valid but the monthly compression limit has been reached");
                Ok(())
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(classify_status(status, &describe_error_body(&body)))
            }
        }
    }

    async fn compress(&self, credential: &str, path: &ImagePath) -> Result<CompressOutcome, CompressError> {
        let source = path.to_path_buf();
        let original = tokio::fs::read(&source)
            .await
            .map_err(|e| CompressError::Transient(format!("failed to read {}: {}", path, e)))?;
        let original_size = original.len() as u64;

        let response = self
            .http
            .post(self.url("/shrink"))
            .basic_auth(API_USER, Some(credential))
            .body(original)
            .send()
            .await
            .map_err(request_error)?;

        Self::log_compression_count(&response);
        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(request_error)?;

        if !status.is_success() {
            return Err(classify_status(status, &describe_error_body(&body)));
        }

        let shrink: ShrinkResponse = serde_json::from_str(&body)
            .map_err(|e| CompressError::Transient(format!("unexpected shrink response: {}", e)))?;
        if let Some(ref output) = shrink.output {
            debug!("{}: {} -> {} bytes", path, original_size, output.size);
        }
        let output_url = location
            .or_else(|| shrink.output.and_then(|o| o.url))
            .ok_or_else(|| CompressError::Transient("shrink response has no output location".to_string()))?;

        let compressed = self.download(credential, &output_url).await?;
        match image::guess_format(&compressed) {
            Ok(ImageFormat::Jpeg) | Ok(ImageFormat::Png) => {}
            other => {
                return Err(CompressError::Transient(format!(
                    "compressed payload is not a JPEG/PNG image ({:?})",
                    other.ok()
                )))
            }
        }

        let compressed_size = compressed.len() as u64;
        if compressed_size >= original_size {
            debug!("{} is already optimal, keeping original", path);
            return Ok(CompressOutcome {
                original_size,
                compressed_size: original_size,
            });
        }

        FileManager::replace_with_bytes(&source, compressed)
            .await
            .map_err(|e| CompressError::Transient(format!("{:#}", e)))?;

        Ok(CompressOutcome {
            original_size,
            compressed_size,
        })
    }
}

fn request_error(err: reqwest::Error) -> CompressError {
    if err.is_timeout() {
        CompressError::Transient(format!("request timed out: {}", err))
    } else {
        CompressError::Transient(format!("request failed: {}", err))
    }
}

/// Account-level statuses stop the whole run
fn classify_status(status: StatusCode, detail: &str) -> CompressError {
    let reason = format!("HTTP {}: {}", status.as_u16(), detail);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::TOO_MANY_REQUESTS => CompressError::Fatal(reason),
        _ => CompressError::Transient(reason),
    }
}

fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => format!("{}: {}", parsed.error, parsed.message),
        Err(_) if body.trim().is_empty() => "no details".to_string(),
        Err(_) => body.trim().chars().take(200).collect(),
    }
}
