use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use studiosync::browser::BrowserLauncher;
use studiosync::db::Database;
use studiosync::registry::{RegistryCounts, StudioRegistry, StudioWorkRecord};
use studiosync::{build_coordinator, load_config, Config, ConfigError, Result, StudioSyncError};

#[derive(Parser)]
#[command(name = "studiosync")]
#[command(about = "Resumable studio schedule scraper, one studio per invocation")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "studiosync.json")]
    config: PathBuf,

    /// Database path (overrides the config file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one step of the current cycle and print the outcome as JSON
    RunOnce,

    /// Keep processing while work remains in the current cycle
    Run {
        /// Stop after this many steps
        #[arg(long)]
        max_steps: Option<u32>,
    },

    /// Print per-studio batch state
    Status,

    /// Clear batch state so the next run starts a fresh pass
    Reset,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    counts: RegistryCounts,
    studios: Vec<StudioWorkRecord>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "studiosync failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    if let Err(e) = studiosync::logging::init(&config.logging) {
        eprintln!("warning: {}", e);
    }

    let db_path = cli
        .database
        .clone()
        .or_else(|| config.database_path())
        .ok_or_else(|| ConfigError::Validation {
            message: "no database_path configured and no home directory found".to_string(),
        })?;
    let db = Database::open(&db_path)?;

    match cli.command {
        Commands::RunOnce => {
            let coordinator = build_coordinator(&config, db, launcher(&config)?)?;
            let outcome = coordinator.process_next().await?;
            print_json(&outcome)?;
        }
        Commands::Run { max_steps } => {
            let coordinator = build_coordinator(&config, db, launcher(&config)?)?;
            let mut steps = 0u32;
            loop {
                let outcome = coordinator.process_next().await?;
                print_json(&outcome)?;
                steps += 1;
                if !outcome.trigger_next || max_steps.is_some_and(|max| steps >= max) {
                    break;
                }
            }
        }
        Commands::Status => {
            let registry = StudioRegistry::new(db, config.registry.max_retries);
            print_json(&StatusReport {
                counts: registry.counts()?,
                studios: registry.list()?,
            })?;
        }
        Commands::Reset => {
            let registry = StudioRegistry::new(db, config.registry.max_retries);
            let reset = registry.reset_all()?;
            print_json(&serde_json::json!({ "reset": reset }))?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

#[cfg(feature = "chromium")]
fn launcher(_config: &Config) -> Result<Arc<dyn BrowserLauncher>> {
    Ok(Arc::new(studiosync::browser::ChromiumLauncher::new()))
}

#[cfg(not(feature = "chromium"))]
fn launcher(config: &Config) -> Result<Arc<dyn BrowserLauncher>> {
    Err(StudioSyncError::NoBrowser(format!(
        "built without the `chromium` feature; cannot drive {}",
        config.site.entry_url
    )))
}
