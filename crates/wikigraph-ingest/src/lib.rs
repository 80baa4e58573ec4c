// Ingestion tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # Wikidata graph ingestion
//!
//! `wikigraph-ingest` is a CLI tool and library that loads a Wikidata JSON
//! dump into a property graph store (Neo4j) in explicit, ordered stages.
//!
//! ## Stages
//!
//! | Stage | Effect |
//! |-------|--------|
//! | `reset` | Deletes every node and relationship |
//! | `load-nodes` | One `Entity` node per Item and Property, with label and description |
//! | `load-edges` | One typed relationship per entity-valued statement, qualifiers as properties |
//! | `inspect` | Prints the claims of one entity; writes nothing |
//!
//! Relationship types come from property labels: `P31` ("instance of")
//! becomes `INSTANCE_OF`. `load-nodes` must therefore have run before
//! `load-edges`.
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a template configuration
//! wikigraph-ingest init
//!
//! # Full import
//! wikigraph-ingest run --config ingest.yaml --stage reset --stage load-nodes --stage load-edges
//!
//! # Dry run against an in-memory store
//! wikigraph-ingest --dry-run run --config ingest.yaml --stage load-nodes
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! store:
//!   uri: bolt://localhost:7687
//!   user: neo4j
//!
//! dump:
//!   path: ./latest-all.json.gz
//!   workers: 4
//!
//! options:
//!   node_batch_size: 5000
//!   edge_property_threshold: 10000
//!   locale: en
//! ```

#![warn(missing_docs)]

pub mod batcher;
pub mod committer;
pub mod config;
pub mod edges;
pub mod error;
pub mod nodes;
pub mod pipeline;
pub mod record;
pub mod resolver;
pub mod retry;
pub mod stage;
pub mod store;
pub mod stream;

pub use config::{IngestConfig, IngestOptions};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, StageReport};
pub use record::{EntityKind, Record};
pub use stage::Stage;
pub use store::{GraphStore, InMemoryGraphStore, Neo4jGraphStore};
pub use stream::{DumpStream, MemoryStream, RecordStream};
