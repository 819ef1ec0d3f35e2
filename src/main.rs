use anyhow::{Context, Result};
use checkhost::{agent_check_base, register_builtin_checks, CheckRunner};
use checkhost_aggregator::{commit_channel, CommitBatch, SenderManager};
use checkhost_core::config::{AppConfig, LogFormat, LoggingConfig};
use checkhost_core::format_status;
use checkhost_runtime::{HostMetadata, Interpreter, RUNTIME_VERSION};
use clap::{Parser, Subcommand};
use flume::Receiver;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// checkhost - host for embedded-runtime checks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CHECKHOST_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Boot the runtime and print its status
    Status {
        /// Print status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Boot the runtime, resolve the configured checks and run them
    Run {
        /// Number of times each check runs
        #[arg(short, long, default_value_t = 1)]
        iterations: u32,
    },
    /// Print version information
    Version,
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_config_builder(path)
            .with_context(|| format!("Failed to load config file: {:?}", path))?,
        None => AppConfig::default(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    let directive = match level_override {
        Some(level) => level.to_string(),
        None => logging.filter_directive(),
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .with_context(|| format!("Invalid log filter: {}", directive))?;

    match logging.format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    init_tracing(&config.logging, args.log_level.as_deref())?;

    if let Command::Version = args.command {
        println!("checkhost {} (runtime {})", env!("CARGO_PKG_VERSION"), RUNTIME_VERSION);
        return Ok(());
    }

    let (tx, rx) = commit_channel(config.telemetry.channel_capacity);
    let senders = Arc::new(SenderManager::new(tx));
    let host = HostMetadata::from_app_config(&config.app, env!("CARGO_PKG_VERSION"));
    let hostname = host.hostname.clone();
    let interp = Arc::new(Interpreter::new(config.runtime.clone(), host, senders.clone()));

    // Everything below that takes the runtime lock goes through a blocking
    // thread, never an async worker.
    let search_paths = config.runtime.search_paths.clone();
    let state = match interp
        .run_blocking(move |interp| interp.initialize(&search_paths))
        .await
    {
        Ok(state) => state,
        Err(e) => {
            error!("Runtime boot failed: {}", e);
            return Err(e).context("Failed to initialize embedded runtime");
        }
    };

    let base = agent_check_base();
    let registered = base.clone();
    interp
        .run_blocking(move |interp| register_builtin_checks(interp, &registered))
        .await
        .context("Failed to register built-in checks")?;

    let mut runner = CheckRunner::new(Arc::clone(&interp), Arc::clone(&senders), hostname);
    let checks = config.enabled_checks().into_iter().cloned().collect();
    runner
        .resolve_async(base, checks)
        .await
        .context("Failed to resolve checks")?;

    match args.command {
        Command::Status { json } => {
            let status = runner.status_async().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print!("{}", format_status(&status));
            }
        }
        Command::Run { iterations } => {
            let printer = tokio::spawn(print_batches(rx.clone()));
            for iteration in 1..=iterations {
                let succeeded = runner.run_once().await;
                info!(iteration, succeeded, "check iteration finished");
            }
            printer.abort();
            let _ = printer.await;
            for batch in rx.drain() {
                print_batch(&batch);
            }
            print!("{}", format_status(&runner.status_async().await?));
        }
        Command::Version => {}
    }

    interp
        .run_blocking(move |interp| interp.shutdown(state))
        .await
        .context("Failed to shut down embedded runtime")?;
    info!(
        commits = senders.metrics().get_commits(),
        emissions = senders.metrics().get_emissions(),
        dropped = senders.metrics().get_dropped(),
        "checkhost finished"
    );
    Ok(())
}

async fn print_batches(rx: Receiver<CommitBatch>) {
    while let Ok(batch) = rx.recv_async().await {
        print_batch(&batch);
    }
}

fn print_batch(batch: &CommitBatch) {
    match serde_json::to_string(batch) {
        Ok(line) => println!("{}", line),
        Err(e) => error!(check = %batch.check_id, error = %e, "failed to encode batch"),
    }
}
