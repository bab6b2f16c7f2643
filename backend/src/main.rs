//! Clinica CLI - Procedure pricing dashboard data
//!
//! # Main Commands
//!
//! ```bash
//! clinica serve                          # Start HTTP server (port 3000)
//! clinica snapshot -s Facial,Capilar     # Full dashboard snapshot as JSON
//! ```
//!
//! # Single Views
//!
//! ```bash
//! clinica procedures                     # Distinct procedures
//! clinica summary                        # Headline cards
//! clinica bars --pairing value_cost      # Grouped bar series
//! clinica hierarchy                      # Sunburst nodes
//! ```
//!
//! Every command reads the configured data path unless `--data` is given.

use clap::{Parser, Subcommand};
use clinica::{
    build_snapshot, distinct_procedures, headline_metrics, load_table, shape_hierarchy,
    transform::{apply_selection, bars::shape_bars_with, BarAggregation},
    DashboardConfig, DashboardRequest, GroupBy, MetricPairing, ProcedureTable,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "clinica")]
#[command(about = "Procedure pricing and margin dashboard data", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Spreadsheet to read (overrides configuration)
    #[arg(short, long, global = true)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Procedure selection shared by the view commands.
#[derive(clap::Args)]
struct Selection {
    /// Procedures to keep, comma separated (default: all)
    #[arg(short, long = "select", value_delimiter = ',')]
    select: Vec<String>,
}

impl Selection {
    fn request(&self) -> DashboardRequest {
        let request = DashboardRequest::default();
        if self.select.is_empty() {
            request
        } else {
            request.with_selection(self.select.iter().map(|s| s.trim().to_string()))
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List distinct procedures
    Procedures,

    /// Show the four headline cards
    Summary {
        #[command(flatten)]
        selection: Selection,

        /// Print JSON instead of a text table
        #[arg(long)]
        json: bool,
    },

    /// Grouped bar series as JSON
    Bars {
        #[command(flatten)]
        selection: Selection,

        /// value_margin, margin_only or value_cost
        #[arg(short, long, default_value = "value_margin")]
        pairing: MetricPairing,

        /// procedure or product
        #[arg(short, long, default_value = "procedure")]
        group_by: GroupBy,

        /// Average repeated rows instead of summing them
        #[arg(long)]
        mean: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Sunburst hierarchy as JSON
    Hierarchy {
        #[command(flatten)]
        selection: Selection,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Full dashboard snapshot as JSON
    Snapshot {
        #[command(flatten)]
        selection: Selection,

        /// value_margin, margin_only or value_cost
        #[arg(short, long, default_value = "value_margin")]
        pairing: MetricPairing,

        /// procedure or product
        #[arg(short, long, default_value = "procedure")]
        group_by: GroupBy,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default from configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match DashboardConfig::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(data) = cli.data {
                config.data_path = data;
            }
            run(cli.command, config).await
        }
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: DashboardConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Procedures => {
            let table = open(&config)?;
            for procedure in distinct_procedures(&table) {
                println!("{}", procedure);
            }
            Ok(())
        }

        Commands::Summary { selection, json } => cmd_summary(&config, &selection, json),

        Commands::Bars {
            selection,
            pairing,
            group_by,
            mean,
            output,
        } => {
            let table = open(&config)?;
            let view = apply_selection(&table, &selection.request());
            let aggregation = if mean { BarAggregation::Mean } else { BarAggregation::Sum };
            let series = shape_bars_with(&view, group_by, pairing.metrics(), aggregation)?;

            eprintln!("{}", pairing.title(group_by));
            write_output(&serde_json::to_string_pretty(&series)?, output.as_deref())
        }

        Commands::Hierarchy { selection, output } => {
            let table = open(&config)?;
            let view = apply_selection(&table, &selection.request());
            let tree = shape_hierarchy(&view);
            write_output(&serde_json::to_string_pretty(&tree)?, output.as_deref())
        }

        Commands::Snapshot {
            selection,
            pairing,
            group_by,
            output,
        } => {
            let table = open(&config)?;
            let request = DashboardRequest {
                pairing,
                group_by,
                ..selection.request()
            };
            let snapshot = build_snapshot(&table, &request)?;
            write_output(&serde_json::to_string_pretty(&snapshot)?, output.as_deref())
        }

        Commands::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.port = port;
            }
            clinica::server::start_server(config).await
        }
    }
}

fn open(config: &DashboardConfig) -> Result<ProcedureTable, Box<dyn std::error::Error>> {
    Ok(load_table(&config.data_path, &config.loader)?)
}

fn cmd_summary(
    config: &DashboardConfig,
    selection: &Selection,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let table = open(config)?;
    let view = apply_selection(&table, &selection.request());
    let headline = headline_metrics(&view)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&headline)?);
        return Ok(());
    }

    let width = headline
        .cards()
        .iter()
        .map(|c| c.title.chars().count())
        .max()
        .unwrap_or(0);
    for card in headline.cards() {
        println!(
            "{:<width$}  {:<24} {:>16}",
            card.title,
            card.procedure,
            card.formatted_value,
            width = width
        );
    }
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            tracing::info!("Output written to {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
