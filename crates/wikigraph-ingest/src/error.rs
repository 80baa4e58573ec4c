//! Error types for wikigraph-ingest.

use thiserror::Error;

use crate::stage::Stage;

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while ingesting a dump into the graph store.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration parse error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The dump server throttled the request.
    #[error("Rate limited: {0}")]
    RateLimit(String),

    /// The dump server rejected the credentials or user agent.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Dump download failed.
    #[error("Download error: {0}")]
    Download(String),

    /// A dump line could not be turned into a record.
    #[error("Malformed record at line {line}: {reason}")]
    Record {
        /// 1-based line number inside the dump.
        line: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// The entity `type` tag is not one of the known kinds.
    #[error("Unknown entity kind '{0}'")]
    UnknownEntityKind(String),

    /// The graph store rejected an operation or could not be reached.
    #[error("Graph store error: {0}")]
    Store(String),

    /// The record stream failed.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Stages were requested out of order.
    #[error("Stage {next} cannot run after {previous}")]
    StageOrder {
        /// Stage that was already selected.
        previous: Stage,
        /// Stage that was requested after it.
        next: Stage,
    },

    /// The batch owner task is gone, usually because a flush failed.
    #[error("Batch writer closed")]
    BatcherClosed,

    /// A stage aborted.
    #[error("Stage {stage} failed: {source}")]
    Stage {
        /// Stage that failed.
        stage: Stage,
        /// Underlying cause.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps this error as the failure of `stage`.
    ///
    /// Errors that already carry a stage are returned unchanged.
    #[must_use]
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }
}

impl From<neo4rs::Error> for Error {
    fn from(err: neo4rs::Error) -> Self {
        Self::Store(err.to_string())
    }
}
