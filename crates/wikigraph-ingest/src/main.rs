//! Wikidata graph ingestion CLI
//!
//! Loads a Wikidata JSON dump into Neo4j in explicit stages.
//! Pedantic lints relaxed for CLI ergonomics.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use wikigraph_ingest::config::CONFIG_TEMPLATE;
use wikigraph_ingest::stream::DumpFetcher;
use wikigraph_ingest::{
    DumpStream, GraphStore, InMemoryGraphStore, IngestConfig, Neo4jGraphStore, Pipeline, Stage,
    StageReport,
};

#[derive(Parser)]
#[command(name = "wikigraph-ingest")]
#[command(version)]
#[command(about = "Load a Wikidata dump into a Neo4j graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Dry run mode (write to an in-memory store instead of Neo4j)
    #[arg(long, global = true)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Node batch size override
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Neo4j password (overrides the configuration file)
    #[arg(long, env = "NEO4J_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one or more stages
    Run {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Stages to run, in order (reset, load-nodes, load-edges, inspect or 0-3)
        #[arg(short, long = "stage", value_enum, required = true)]
        stages: Vec<Stage>,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Generate example configuration
    Init {
        /// Output file path
        #[arg(short, long, default_value = "ingest.yaml")]
        output: PathBuf,
    },

    /// Download the dump from `dump.url` (latest public dump if unset)
    Fetch {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Commands::Run { config, stages } => {
            run_stages(&cli, config, stages).await?;
        }
        Commands::Validate { config } => {
            validate_config(config)?;
        }
        Commands::Init { output } => {
            generate_config(output)?;
        }
        Commands::Fetch { config } => {
            let config = load_config(&cli, config)?;
            fetch_dump(&config, true).await?;
        }
    }

    Ok(())
}

fn load_config(cli: &Cli, config_path: &Path) -> anyhow::Result<IngestConfig> {
    info!("Loading configuration from {:?}", config_path);

    let mut config = IngestConfig::from_file(config_path)?;

    if cli.dry_run {
        config.options.dry_run = true;
    }
    if let Some(bs) = cli.batch_size {
        config.options.node_batch_size = bs;
    }
    if let Some(password) = &cli.password {
        config.store.password = password.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn run_stages(cli: &Cli, config_path: &Path, stages: &[Stage]) -> anyhow::Result<()> {
    let config = load_config(cli, config_path)?;
    wikigraph_ingest::stage::validate_order(stages)?;

    let stream = DumpStream::new(&config.dump).with_progress(config.options.progress);
    if stages.iter().any(Stage::reads_stream) && !stream.path().exists() {
        fetch_dump(&config, false).await?;
    }

    let store: Arc<dyn GraphStore> =
        if config.options.dry_run || !stages.iter().any(Stage::writes_store) {
            if config.options.dry_run {
                info!("Dry run mode - writing to an in-memory store");
            }
            Arc::new(InMemoryGraphStore::new())
        } else {
            Arc::new(Neo4jGraphStore::connect(&config.store).await?)
        };
    let pipeline = Pipeline::new(config.options.clone(), store, Arc::new(stream));
    let reports = pipeline.run(stages).await?;

    for report in &reports {
        print_report(report);
    }

    Ok(())
}

/// Downloads the dump. An explicit `fetch` falls back to the latest public
/// dump; the automatic download before `run` needs `dump.url`.
async fn fetch_dump(config: &IngestConfig, explicit: bool) -> anyhow::Result<()> {
    if !explicit && config.dump.url.is_none() {
        anyhow::bail!(
            "dump {} not found and no dump.url configured",
            config.dump.path.display()
        );
    }
    let url = config.dump.url_or_default();

    let fetcher = DumpFetcher::from_config(&config.dump)?.with_progress(config.options.progress);
    let bytes = fetcher.fetch(url, &config.dump.path).await?;

    println!("\n✅ Dump downloaded!");
    println!("   Path:  {}", config.dump.path.display());
    println!("   Bytes: {}", bytes);

    Ok(())
}

fn print_report(report: &StageReport) {
    println!("\n✅ Stage {} complete!", report.stage);
    if report.stage.reads_stream() {
        println!("   Records:       {}", report.records);
        println!("   Bytes read:    {}", report.bytes_read);
    }
    match report.stage {
        Stage::Reset | Stage::Inspect => {}
        Stage::LoadNodes => {
            println!("   Nodes:         {}", report.nodes_written);
            println!("   MediaInfo:     {} skipped", report.skipped_media_info);
        }
        Stage::LoadEdges => {
            println!("   Relationships: {}", report.relationships_written);
            println!("   Skipped props: {}", report.skipped_properties);
            println!("   Failed stmts:  {}", report.failed_statements);
        }
    }
    if report.stage.writes_store() && report.stage.reads_stream() {
        println!("   Flushes:       {}", report.flushes);
    }
    println!("   Duration:      {:.2}s", report.duration_secs);
    if report.stage.reads_stream() {
        println!("   Throughput:    {:.0} records/sec", report.throughput());
    }
    if let Some(inspection) = &report.inspection {
        println!("\n{inspection}");
    }
}

fn validate_config(config_path: &Path) -> anyhow::Result<()> {
    info!("Validating configuration from {:?}", config_path);

    let config = IngestConfig::from_file(config_path)?;
    config.validate()?;

    println!("✅ Configuration is valid!");
    println!("   Store:      {} (database {})", config.store.uri, config.store.database);
    println!("   Dump:       {}", config.dump.path.display());
    println!("   Batch size: {}", config.options.node_batch_size);
    println!("   Threshold:  {}", config.options.edge_property_threshold);
    println!("   Locale:     {}", config.options.locale);

    Ok(())
}

fn generate_config(output: &Path) -> anyhow::Result<()> {
    std::fs::write(output, CONFIG_TEMPLATE)?;
    println!("✅ Generated configuration: {:?}", output);
    println!(
        "   Edit the file and run: wikigraph-ingest run --config {:?} --stage load-nodes",
        output
    );

    Ok(())
}
