use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pattern_curator::config::{OracleProvider, ReviewBackend};
use pattern_curator::{pipeline, review_server, AppConfig, CliConfig, FileConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(version, about = "Detects missing rug patterns with a vision model")]
struct CliArgs {
    /// Path to a TOML config file. Its values override command-line ones.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the work-queue, result and review files.
    #[clap(long, global = true, value_parser = parse_path)]
    pub data_dir: Option<PathBuf>,

    /// Work-queue file (defaults to a file inside the data directory).
    #[clap(long, global = true, value_parser = parse_path)]
    pub work_queue: Option<PathBuf>,

    /// Result file (defaults to a file inside the data directory).
    #[clap(long, global = true, value_parser = parse_path)]
    pub results: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scans the catalog and writes the work queue.
    Scan {
        /// Catalog export to scan.
        #[clap(long, value_parser = parse_path)]
        catalog: Option<PathBuf>,
    },

    /// Enriches queued items that have no result yet.
    Enrich {
        /// Maximum items per run, 0 for no limit.
        #[clap(long, default_value_t = 20)]
        sample_size: usize,

        #[clap(long, value_enum, default_value_t = OracleProvider::Gemini)]
        provider: OracleProvider,
    },

    /// Scans, then enriches.
    Run {
        #[clap(long, value_parser = parse_path)]
        catalog: Option<PathBuf>,

        #[clap(long, default_value_t = 20)]
        sample_size: usize,

        #[clap(long, value_enum, default_value_t = OracleProvider::Gemini)]
        provider: OracleProvider,
    },

    /// Serves the review API over the result file.
    Serve {
        #[clap(short, long, default_value_t = 5000)]
        port: u16,

        #[clap(long, value_enum, default_value_t = ReviewBackend::Sqlite)]
        backend: ReviewBackend,
    },
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        let mut cli = CliConfig {
            data_dir: self.data_dir.clone(),
            work_queue_path: self.work_queue.clone(),
            results_path: self.results.clone(),
            ..Default::default()
        };
        match &self.command {
            Command::Scan { catalog } => {
                cli.catalog_path = catalog.clone();
            }
            Command::Enrich {
                sample_size,
                provider,
            } => {
                cli.sample_size = *sample_size;
                cli.provider = *provider;
            }
            Command::Run {
                catalog,
                sample_size,
                provider,
            } => {
                cli.catalog_path = catalog.clone();
                cli.sample_size = *sample_size;
                cli.provider = *provider;
            }
            Command::Serve { port, backend } => {
                cli.port = *port;
                cli.review_backend = *backend;
            }
        }
        cli
    }
}

/// Flag set by Ctrl-C; the worker checks it between items.
fn install_interrupt_flag() -> Arc<AtomicBool> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }
    cancelled
}

fn execute(cli_args: &CliArgs) -> Result<()> {
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    match &cli_args.command {
        Command::Scan { .. } => {
            pipeline::run_scan(&config)?;
        }
        Command::Enrich { .. } => {
            let collaborators = pipeline::Collaborators::from_config(&config)?;
            pipeline::run_enrich(&config, &collaborators, install_interrupt_flag())?;
        }
        Command::Run { .. } => {
            let collaborators = pipeline::Collaborators::from_config(&config)?;
            pipeline::run(&config, &collaborators, install_interrupt_flag())?;
        }
        Command::Serve { .. } => {
            review_server::serve(&config).context("Review server failed")?;
        }
    }
    Ok(())
}

fn main() {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .init();

    if let Err(e) = execute(&cli_args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
