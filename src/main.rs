//! # Tiny Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Merge tra file di configurazione e flag CLI
//! - Avvio di un singolo run oppure dello scheduler giornaliero
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (cartelle, chiave API, schedule, etc.)
//! 2. Configura il logging (INFO o DEBUG, `RUST_LOG` ha la precedenza)
//! 3. Costruisce e valida la `Config`
//! 4. Run singolo (Ctrl-C cancella, i progressi restano salvati) oppure daemon
//! 5. Exit code 1 solo se il run è stato interrotto da un errore di account
//!
//! ## Esempio di utilizzo:
//! ```bash
//! TINIFY_API_KEY=... tiny-optimizer /var/www/uploads --delay-ms 500
//! tiny-optimizer /var/www/uploads --daemon --schedule 03:00
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tiny_optimizer::json_output::JsonMessage;
use tiny_optimizer::{shutdown, Config, IncrementalRunner, Scheduler};

#[derive(Parser)]
#[command(name = "tiny-optimizer")]
#[command(about = "Compress new JPG/PNG images through the Tinify API, skipping already optimised ones")]
struct Args {
    /// Folders scanned recursively for JPG/PNG images
    folders: Vec<PathBuf>,

    /// JSON configuration file (CLI flags take precedence)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tinify API key
    #[arg(short = 'k', long, env = "TINIFY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// State file tracking optimised images
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Keep running and optimise once per day
    #[arg(long)]
    daemon: bool,

    /// Local time of the daily run (HH:MM), implies --daemon
    #[arg(long)]
    schedule: Option<String>,

    /// Pause between two images in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Timeout for a single image in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Extra attempts for a transient failure
    #[arg(long)]
    retries: Option<u32>,

    /// Only lowercase .jpg/.jpeg/.png extensions are eligible
    #[arg(long)]
    case_sensitive: bool,

    /// List pending images without compressing them
    #[arg(long)]
    dry_run: bool,

    /// Emit JSON events on stdout (logs go to stderr)
    #[arg(long)]
    json: bool,

    /// Store the API key in the state file for later runs
    #[arg(long)]
    save_key: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if args.json {
        tracing::subscriber::set_global_default(builder.with_writer(std::io::stderr).finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let config = build_config(&args).await?;
    if let Err(e) = config.validate() {
        if args.json {
            JsonMessage::error("Invalid configuration", Some(format!("{:#}", e))).emit();
        }
        return Err(e);
    }

    let schedule = config.schedule()?;
    let runner = Arc::new(IncrementalRunner::from_config(config)?);

    if args.save_key {
        let Some(key) = runner.config().credential() else {
            return Err(anyhow::anyhow!("--save-key requires an API key (--api-key or TINIFY_API_KEY)"));
        };
        runner.store().save_credential(&key).await?;
        info!("API key saved for later runs");
    }

    if args.daemon || args.schedule.is_some() {
        let handle = Scheduler::new(schedule).start(runner);
        tokio::signal::ctrl_c().await?;
        info!("Interrupt received, stopping scheduler");
        handle.stop().await;
        return Ok(ExitCode::SUCCESS);
    }

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            trigger.trigger();
        }
    });

    let report = match runner.run(shutdown).await {
        Ok(report) => report,
        Err(e) => {
            if args.json {
                JsonMessage::error("Optimisation run failed", Some(format!("{:#}", e))).emit();
            }
            return Err(e);
        }
    };
    report.log_summary();

    if report.is_fatal() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn build_config(args: &Args) -> Result<Config> {
    let mut config = match args.config {
        Some(ref path) => {
            if !path.exists() {
                return Err(anyhow::anyhow!("Config file does not exist: {}", path.display()));
            }
            Config::from_file(path).await?
        }
        None => Config::default(),
    };

    if !args.folders.is_empty() {
        config.folders = args.folders.clone();
    }
    if args.api_key.is_some() {
        config.api_key = args.api_key.clone();
    }
    if args.state_file.is_some() {
        config.state_file = args.state_file.clone();
    }
    if let Some(ref at) = args.schedule {
        config.schedule_at = at.clone();
    }
    if let Some(delay_ms) = args.delay_ms {
        config.item_delay_ms = delay_ms;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.request_timeout_secs = timeout_secs;
    }
    if let Some(retries) = args.retries {
        config.max_retries = retries;
    }
    if args.case_sensitive {
        config.case_sensitive_extensions = true;
    }
    if args.dry_run {
        config.dry_run = true;
    }
    if args.json {
        config.json_output = true;
        config.show_progress = false;
    }

    Ok(config)
}
