//! LDES CLI
//!
//! Operator tool working directly on the database:
//! - Create collections and views
//! - Ingest members from JSON
//! - Run one-shot bucketization and pagination passes
//! - Inspect statistics and pages

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ldes_server::admin::Admin;
use ldes_server::config::Config;
use ldes_server::logging::init_tracing;
use ldes_server::storage::{Database, NewMember};
use ldes_server::worker::{run_worker, FragmentationWorker, WorkerReport};
use ldes_server::{BucketPaginator, MemberBucketizer};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ldes-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Manage and fragment Linked Data Event Streams")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overrides the configuration
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database schema
    Init,

    /// Manage collections
    Collection {
        #[command(subcommand)]
        command: CollectionCommand,
    },

    /// Manage views
    View {
        #[command(subcommand)]
        command: ViewCommand,
    },

    /// Ingest members from a JSON file holding an array of members
    Ingest {
        /// Collection name
        collection: String,
        /// Path to the JSON file
        path: PathBuf,
    },

    /// Bucketize every pending member, then stop
    Bucketize,

    /// Paginate every bucketized member, then stop
    Paginate,

    /// Show ingestion and fragmentation progress
    Stats,

    /// Show a page with its links and members
    Page {
        collection: String,
        view: String,
        page: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum CollectionCommand {
    /// Create a collection
    Create { name: String },
}

#[derive(Subcommand)]
pub enum ViewCommand {
    /// Create a view
    Create {
        collection: String,
        name: String,
        /// View definition as JSON text
        #[arg(short, long, conflicts_with = "definition_file")]
        definition: Option<String>,
        /// View definition read from a file
        #[arg(long)]
        definition_file: Option<PathBuf>,
    },
    /// Delete a view and its pages
    Delete { collection: String, name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        return write_default_config(output.as_ref());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(database) = &cli.database {
        config.storage.database_path = database.clone();
    }
    init_tracing(&config.logging);

    let db = Database::from_config(&config.storage);
    db.initialize()
        .with_context(|| format!("Cannot open database {:?}", db.path()))?;
    let admin = Admin::new(db.clone());

    match cli.command {
        Commands::Init => {
            println!("Database ready at {:?}", db.path());
        }

        Commands::Collection {
            command: CollectionCommand::Create { name },
        } => {
            let collection = admin.create_collection(&name)?;
            println!("Created collection {} (id {})", collection.name, collection.cid);
        }

        Commands::View { command } => match command {
            ViewCommand::Create {
                collection,
                name,
                definition,
                definition_file,
            } => {
                let definition = match definition_file {
                    Some(path) => Some(
                        std::fs::read_to_string(&path)
                            .with_context(|| format!("Cannot read {:?}", path))?,
                    ),
                    None => definition,
                };
                let view = admin.create_view(&collection, &name, definition.as_deref())?;
                println!("Created view {}/{} (id {})", collection, view.name, view.vid);
            }
            ViewCommand::Delete { collection, name } => {
                admin.delete_view(&collection, &name)?;
                println!("Deleted view {}/{}", collection, name);
            }
        },

        Commands::Ingest { collection, path } => {
            if !path.exists() {
                bail!("File not found: {:?}", path);
            }
            let content =
                std::fs::read_to_string(&path).with_context(|| format!("Cannot read {:?}", path))?;
            let members: Vec<NewMember> = serde_json::from_str(&content)
                .with_context(|| format!("{:?} is not a JSON array of members", path))?;

            let stored = admin.ingest(&collection, &members)?;
            println!("Ingested {} of {} members", stored.len(), members.len());
        }

        Commands::Bucketize => {
            let worker = MemberBucketizer::from_config(db, &config.storage, &config.bucketizer);
            let report = run_once(worker).await;
            print_report("Bucketized", &report, &cli.format)?;
        }

        Commands::Paginate => {
            let worker = BucketPaginator::from_config(db, &config.storage, &config.paginator);
            let report = run_once(worker).await;
            print_report("Paginated", &report, &cli.format)?;
        }

        Commands::Stats => {
            let statistics = admin.statistics()?;
            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&statistics)?);
            } else {
                println!("{:<24} {:>10}", "Collection", "Ingested");
                println!("{}", "-".repeat(35));
                for c in &statistics.collections {
                    println!("{:<24} {:>10}", c.collection, c.ingested);
                }
                println!();
                println!(
                    "{:<24} {:<16} {:>10} {:>10}",
                    "Collection", "View", "Bucketized", "Paginated"
                );
                println!("{}", "-".repeat(63));
                for v in &statistics.views {
                    println!(
                        "{:<24} {:<16} {:>10} {:>10}",
                        v.collection, v.view, v.bucketized, v.paginated
                    );
                }
            }
        }

        Commands::Page {
            collection,
            view,
            page,
        } => {
            let Some(document) = admin.page(&collection, &view, &page)? else {
                bail!("Page {}/{}/{} not found", collection, view, page);
            };

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&document)?);
            } else {
                let state = if document.open { "open" } else { "closed" };
                let root = if document.root { ", root" } else { "" };
                println!(
                    "Page {} ({}{}, {} members)",
                    document.name, state, root, document.assigned
                );
                println!();
                println!("Links:");
                for link in &document.links {
                    match &link.relation.relation_type {
                        Some(kind) => println!(
                            "  -> {} [{} {} {}]",
                            link.link,
                            kind,
                            link.relation.path.as_deref().unwrap_or("-"),
                            link.relation.value.as_deref().unwrap_or("-")
                        ),
                        None => println!("  -> {}", link.link),
                    }
                }
                println!();
                println!("Members:");
                for member in &document.members {
                    println!("  {}", member);
                }
            }
        }

        Commands::Config { output } => write_default_config(output.as_ref())?,
    }

    Ok(())
}

/// Run a worker until it finds nothing more to do
async fn run_once<W: FragmentationWorker>(worker: W) -> WorkerReport {
    let (_shutdown, signal) = tokio::sync::watch::channel(false);
    run_worker(Arc::new(worker), None, signal).await
}

fn print_report(action: &str, report: &WorkerReport, format: &str) -> anyhow::Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{} {} members in {} ticks", action, report.members, report.ticks);
    if report.aborted > 0 || report.failed > 0 {
        println!("  Aborted: {}", report.aborted);
        println!("  Failed: {}", report.failed);
    }
    Ok(())
}

fn write_default_config(output: Option<&PathBuf>) -> anyhow::Result<()> {
    let config = ldes_server::config::generate_default_config();

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &config)?;
            println!("Config written to {:?}", path);
        }
        None => {
            print!("{}", config);
        }
    }
    Ok(())
}
