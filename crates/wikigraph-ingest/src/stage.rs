//! Ingestion stages and their ordering rules.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One pass of the import.
///
/// Stages are totally ordered. A run executes an explicitly selected,
/// strictly increasing subset of them; nothing advances automatically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Wipe every node and relationship from the store.
    #[value(alias = "0")]
    Reset,
    /// Create one node per Item and Property entity.
    #[value(alias = "1")]
    LoadNodes,
    /// Link entities with typed relationships built from their claims.
    #[value(alias = "2")]
    LoadEdges,
    /// Print the structure of one entity; writes nothing.
    #[value(alias = "3")]
    Inspect,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [
        Stage::Reset,
        Stage::LoadNodes,
        Stage::LoadEdges,
        Stage::Inspect,
    ];

    /// Kebab-case name used on the command line and in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Stage::Reset => "reset",
            Stage::LoadNodes => "load-nodes",
            Stage::LoadEdges => "load-edges",
            Stage::Inspect => "inspect",
        }
    }

    /// Whether the stage makes a pass over the record stream.
    #[must_use]
    pub const fn reads_stream(&self) -> bool {
        !matches!(self, Stage::Reset)
    }

    /// Whether the stage writes to the graph store.
    #[must_use]
    pub const fn writes_store(&self) -> bool {
        !matches!(self, Stage::Inspect)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Checks that `stages` is strictly increasing.
///
/// # Errors
///
/// Returns `Error::StageOrder` for the first pair that repeats or goes
/// backwards, and `Error::Config` for an empty selection.
pub fn validate_order(stages: &[Stage]) -> Result<()> {
    if stages.is_empty() {
        return Err(Error::Config("no stage selected".to_string()));
    }
    for pair in stages.windows(2) {
        if pair[1] <= pair[0] {
            return Err(Error::StageOrder {
                previous: pair[0],
                next: pair[1],
            });
        }
    }
    Ok(())
}
