//! Configuration types for wikigraph-ingest.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Graph store connection.
    pub store: StoreConfig,
    /// Dump location and stream tuning.
    pub dump: DumpConfig,
    /// Ingestion options.
    #[serde(default)]
    pub options: IngestOptions,
}

/// Neo4j connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Bolt URI, e.g. `bolt://localhost:7687`.
    pub uri: String,
    /// User name.
    #[serde(default = "default_user")]
    pub user: String,
    /// Password. Usually supplied through `NEO4J_PASSWORD` instead.
    #[serde(default)]
    pub password: String,
    /// Database name.
    #[serde(default = "default_database")]
    pub database: String,
    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Rows fetched per pull.
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

/// Dump file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpConfig {
    /// Local dump path; `.gz` files are decompressed on the fly.
    pub path: PathBuf,
    /// Where to download the dump from when `path` is missing.
    #[serde(default)]
    pub url: Option<String>,
    /// `User-Agent` sent when downloading.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Download retries after the first attempt.
    #[serde(default = "default_download_retries")]
    pub download_retries: u32,
    /// Concurrent record handlers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Lines queued between the reader and the workers.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Ingestion options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Node buffer capacity per entity kind.
    #[serde(default = "default_node_batch_size")]
    pub node_batch_size: usize,
    /// Distinct properties accumulated before edges are committed.
    #[serde(default = "default_edge_property_threshold")]
    pub edge_property_threshold: usize,
    /// Language of stored labels and descriptions.
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Entity described by the `inspect` stage.
    #[serde(default = "default_inspect_entity")]
    pub inspect_entity: String,
    /// Show progress bars.
    #[serde(default = "default_true")]
    pub progress: bool,
    /// Write to an in-memory store instead of Neo4j.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            node_batch_size: default_node_batch_size(),
            edge_property_threshold: default_edge_property_threshold(),
            locale: default_locale(),
            inspect_entity: default_inspect_entity(),
            progress: true,
            dry_run: false,
        }
    }
}

/// Latest full Wikidata JSON dump.
pub const DEFAULT_DUMP_URL: &str =
    "https://dumps.wikimedia.org/wikidatawiki/entities/latest-all.json.gz";

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> usize {
    16
}

fn default_fetch_size() -> usize {
    500
}

fn default_user_agent() -> String {
    "Wikidata Importer".to_string()
}

fn default_download_retries() -> u32 {
    5
}

fn default_workers() -> usize {
    4
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_node_batch_size() -> usize {
    5000
}

fn default_edge_property_threshold() -> usize {
    10_000
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_inspect_entity() -> String {
    "Q2013".to_string()
}

fn default_true() -> bool {
    true
}

impl DumpConfig {
    /// Configured download URL, or the latest public dump.
    #[must_use]
    pub fn url_or_default(&self) -> &str {
        self.url.as_deref().unwrap_or(DEFAULT_DUMP_URL)
    }
}

impl IngestConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.store.uri.trim().is_empty() {
            return Err(Error::Config("store.uri cannot be empty".to_string()));
        }
        if self.dump.workers == 0 {
            return Err(Error::Config(
                "dump.workers must be greater than 0".to_string(),
            ));
        }
        if self.dump.channel_capacity == 0 {
            return Err(Error::Config(
                "dump.channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.options.node_batch_size == 0 {
            return Err(Error::Config(
                "options.node_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.options.edge_property_threshold == 0 {
            return Err(Error::Config(
                "options.edge_property_threshold must be greater than 0".to_string(),
            ));
        }
        if self.options.locale.trim().is_empty() {
            return Err(Error::Config("options.locale cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Commented configuration written by `init`.
pub const CONFIG_TEMPLATE: &str = r#"# wikigraph-ingest configuration

store:
  uri: bolt://localhost:7687
  user: neo4j
  # password is read from NEO4J_PASSWORD when not set here
  database: neo4j
  max_connections: 16

dump:
  path: ./latest-all.json.gz
  # downloaded when path does not exist
  url: https://dumps.wikimedia.org/wikidatawiki/entities/latest-all.json.gz
  workers: 4

options:
  # rows per entity kind written in one transaction
  node_batch_size: 5000
  # distinct properties accumulated before edges are committed
  edge_property_threshold: 10000
  locale: en
  inspect_entity: Q2013
  progress: true
"#;
