//! tariff-catalogue CLI entry point

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fmt::Debug;
use std::path::PathBuf;
use tariff_catalogue::config::{Config, DEFAULT_CONFIG_PATH};
use tariff_catalogue::report::{self, RankBy};
use tariff_catalogue::store::{
    AGRICULTURAL_TABLE, CATALOGUE_TABLE, CatalogueStats, ExtractionRun, IMPORTS_TABLE,
    SchemaChange, Store,
};
use tariff_catalogue::pipeline;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tariff-catalogue")]
#[command(version, about = "Tariff catalogue extraction and import reconciliation", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Database path, overrides the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the tariff catalogue from the PDF
    Extract {
        /// Catalogue PDF, overrides the config file
        #[arg(long)]
        pdf: Option<PathBuf>,

        /// Re-extract even if the document is unchanged
        #[arg(long)]
        force: bool,
    },

    /// Recompute display labels for every catalogue code
    Normalize,

    /// Recompute unit prices on the imports table
    UnitPrice,

    /// Change the imports table columns
    Schema {
        #[command(subcommand)]
        change: SchemaCommand,
    },

    /// Rebuild the agricultural imports view
    BuildView,

    /// Match coverage of imports against the catalogue
    Reconcile {
        /// How many unmatched codes to list
        #[arg(long, default_value = "20")]
        unmatched: usize,
    },

    /// Aggregate reports over the agricultural view
    Report {
        kind: ReportKind,

        /// Restrict monthly and countries reports to one product
        #[arg(long)]
        product: Option<String>,

        /// Ranking for the products report
        #[arg(long, value_enum, default_value = "value")]
        by: RankBy,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Run every stage in order
    Run {
        #[arg(long)]
        pdf: Option<PathBuf>,

        #[arg(long)]
        force: bool,
    },

    /// Show table counts and the last extraction
    Stats,
}

#[derive(Subcommand)]
enum SchemaCommand {
    /// Add a nullable column
    Add { name: String, sql_type: String },
    /// Rename a column
    Rename { from: String, to: String },
    /// Reorder columns; every column must be listed once
    Reorder { columns: Vec<String> },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportKind {
    Categories,
    Products,
    Monthly,
    Importers,
    Countries,
    Chapters,
}

#[derive(Debug, Serialize)]
struct Stats {
    imports: usize,
    catalogue: Option<CatalogueStats>,
    agricultural: Option<usize>,
    last_extraction: Option<ExtractionRun>,
}

fn emit<T: Serialize + Debug>(json: bool, value: &T) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{value:#?}");
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = Config::load_or_default(&cli.config)?;
    if let Some(db) = cli.db {
        cfg.db_path = db;
    }
    let store = Store::open(&cfg.db_path)?;
    let json = cli.json;

    match cli.command {
        Commands::Extract { pdf, force } => {
            let pdf = pdf.unwrap_or_else(|| cfg.catalogue_pdf.clone());
            emit(json, &pipeline::extract(&store, &pdf, force)?)?;
        }
        Commands::Normalize => emit(json, &pipeline::normalize(&store, &cfg)?)?,
        Commands::UnitPrice => emit(json, &pipeline::unit_price(&store)?)?,
        Commands::Schema { change } => {
            let change = match change {
                SchemaCommand::Add { name, sql_type } => SchemaChange::Add { name, sql_type },
                SchemaCommand::Rename { from, to } => SchemaChange::Rename { from, to },
                SchemaCommand::Reorder { columns } => SchemaChange::Reorder(columns),
            };
            let changed = store.evolve_imports(&[change])?;
            info!(changed, "Schema change applied");
            emit(json, &store.columns(IMPORTS_TABLE)?)?;
        }
        Commands::BuildView => emit(json, &pipeline::build_view(&store)?)?,
        Commands::Reconcile { unmatched } => {
            emit(json, &pipeline::reconcile(&store, Some(unmatched))?)?;
        }
        Commands::Report {
            kind,
            product,
            by,
            limit,
        } => {
            let product = product.as_deref();
            match kind {
                ReportKind::Categories => emit(json, &report::category_summary(&store)?)?,
                ReportKind::Products => emit(json, &report::top_products(&store, by, limit)?)?,
                ReportKind::Monthly => emit(json, &report::monthly_trend(&store, product)?)?,
                ReportKind::Importers => emit(json, &report::top_importers(&store, limit)?)?,
                ReportKind::Countries => {
                    emit(json, &report::top_countries(&store, product, limit)?)?
                }
                ReportKind::Chapters => emit(json, &report::chapter_summary(&store)?)?,
            }
        }
        Commands::Run { pdf, force } => {
            let pdf = pdf.unwrap_or_else(|| cfg.catalogue_pdf.clone());
            emit(json, &pipeline::run_all(&store, &cfg, &pdf, force)?)?;
        }
        Commands::Stats => {
            let stats = Stats {
                imports: store.count_rows(IMPORTS_TABLE)?,
                catalogue: if store.table_exists(CATALOGUE_TABLE)? {
                    Some(store.catalogue_stats()?)
                } else {
                    None
                },
                agricultural: if store.table_exists(AGRICULTURAL_TABLE)? {
                    Some(store.count_rows(AGRICULTURAL_TABLE)?)
                } else {
                    None
                },
                last_extraction: store.last_extraction()?,
            };
            emit(json, &stats)?;
        }
    }

    store.close()?;
    Ok(())
}
