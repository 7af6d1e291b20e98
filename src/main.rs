//! # Path Resolver CLI (`resolver`)
//!
//! ## Usage
//!
//! ```bash
//! resolver --config ./config/resolver.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `resolver ingest` | Canonicalize the catalogue and bulk-load it into the index |
//! | `resolver lettercodes` | List lettercodes in the source |
//! | `resolver canonicalize '<row>'` | Resolve one JSON row and print the document |
//! | `resolver resolve "<reference>"` | Look a reference up in the index |
//! | `resolver serve` | Start the HTTP trigger |
//!
//! ## Examples
//!
//! ```bash
//! # Dry run over one department
//! resolver ingest --lettercode ADM --dry-run
//!
//! # Live run over an inclusive range
//! resolver ingest --start AB --end AC
//!
//! # Resolve a document without touching the index
//! resolver canonicalize '{"letter_code": "CP", "class_no": 25, "subclass_no": 2, "piece_ref": "25/155"}'
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use path_resolver::canonical::run_canonicalize;
use path_resolver::config;
use path_resolver::ingest::{run_ingest, IngestRequest, LettercodeSelection};
use path_resolver::progress::ProgressMode;
use path_resolver::reference::load_reference_data;
use path_resolver::resolve::run_resolve;
use path_resolver::server;
use path_resolver::source::run_lettercodes;

/// Path Resolver: canonical identifiers and match keys for archival
/// catalogue records, bulk-loaded into a search index.
#[derive(Parser)]
#[command(name = "resolver", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/resolver.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Canonicalize catalogue rows and upsert them into the index.
    ///
    /// With no selection flags every lettercode is ingested. Ctrl-C stops
    /// the run at the next level boundary and restores index refresh.
    Ingest {
        /// Ingest a single lettercode.
        #[arg(long, conflicts_with_all = ["start", "end"])]
        lettercode: Option<String>,

        /// First lettercode of an inclusive range.
        #[arg(long, requires = "end")]
        start: Option<String>,

        /// Last lettercode of an inclusive range.
        #[arg(long, requires = "start")]
        end: Option<String>,

        /// Canonicalize and count without touching the index.
        #[arg(long)]
        dry_run: bool,

        /// Progress on stderr. Defaults to human when stderr is a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// List lettercodes in the source.
    Lettercodes,

    /// Resolve one row given as JSON and print the resulting document.
    Canonicalize {
        /// Row with source column names, e.g. `{"letter_code": "AB", "class_no": 7}`.
        row: String,
    },

    /// Look up a reference string in the index.
    Resolve { reference: String },

    /// Start the HTTP trigger server on `[server].bind`.
    Serve,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            lettercode,
            start,
            end,
            dry_run,
            progress,
        } => {
            let selection = LettercodeSelection::from_params(
                lettercode.as_deref(),
                start.as_deref(),
                end.as_deref(),
            )?;
            let request = IngestRequest {
                selection,
                live: !dry_run,
            };
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping at the next level boundary");
                    on_signal.cancel();
                }
            });

            run_ingest(&cfg, request, mode, cancel).await?;
        }
        Commands::Lettercodes => {
            run_lettercodes(&cfg).await?;
        }
        Commands::Canonicalize { row } => {
            run_canonicalize(&cfg, &row).await?;
        }
        Commands::Resolve { reference } => {
            run_resolve(&cfg, &reference).await?;
        }
        Commands::Serve => {
            let reference = Arc::new(load_reference_data(&cfg.reference).await?);
            server::run_server(&cfg, reference).await?;
        }
    }

    Ok(())
}
