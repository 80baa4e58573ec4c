//! Neo4j graph store over Bolt.
//!
//! Every bulk write is a single `UNWIND $rows AS row MERGE ...` statement so
//! one round trip carries a whole batch.

use async_trait::async_trait;
use neo4rs::{query, BoltNull, BoltType, ConfigBuilder, Graph, Query, Txn};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{GraphStore, GraphTransaction, NodeRow, RelationshipRow, ENTITY_LABEL, ID_PROPERTY};
use crate::config::StoreConfig;
use crate::error::{Error, Result};

/// Graph store backed by a Neo4j server.
pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    /// Connects to the server described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the configuration is rejected or the server
    /// cannot be reached.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        info!("Connecting to Neo4j at {}", config.uri);

        let bolt_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .db(config.database.as_str())
            .max_connections(config.max_connections)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| Error::Store(format!("Invalid Neo4j configuration: {e}")))?;

        let graph = Graph::connect(bolt_config)
            .await
            .map_err(|e| Error::Store(format!("Unable to connect to Neo4j: {e}")))?;

        Ok(Self { graph })
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    fn store_type(&self) -> &'static str {
        "neo4j"
    }

    async fn wipe_all(&self) -> Result<()> {
        self.graph
            .run(query("MATCH (n) DETACH DELETE n"))
            .await
            .map_err(|e| Error::Store(format!("Could not clean database: {e}")))
    }

    async fn ensure_unique_constraint(&self, label: &str, property: &str) -> Result<()> {
        let statement = constraint_statement(label, property);
        debug!("{statement}");
        self.graph
            .run(query(&statement))
            .await
            .map_err(|e| Error::Store(format!("Could not create constraint: {e}")))
    }

    async fn begin(&self) -> Result<Box<dyn GraphTransaction>> {
        let txn = self
            .graph
            .start_txn()
            .await
            .map_err(|e| Error::Store(format!("Failed to start transaction: {e}")))?;
        Ok(Box::new(Neo4jTransaction { txn }))
    }
}

struct Neo4jTransaction {
    txn: Txn,
}

#[async_trait]
impl GraphTransaction for Neo4jTransaction {
    async fn lookup_label(&mut self, node_label: &str, id: &str) -> Result<Option<String>> {
        let q = query(&format!(
            "MATCH (p:`{node_label}` {{ {ID_PROPERTY}: $id }}) RETURN p.label AS label LIMIT 1"
        ))
        .param("id", id);

        let mut rows = self.txn.execute(q).await?;
        let Some(row) = rows.next(self.txn.handle()).await? else {
            return Ok(None);
        };
        row.get::<Option<String>>("label")
            .map_err(|e| Error::Store(format!("Unexpected label for {id}: {e}")))
    }

    async fn upsert_nodes(&mut self, label: &str, rows: &[NodeRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let batch: Vec<HashMap<String, BoltType>> = rows.iter().map(node_params).collect();
        self.txn.run(upsert_nodes_query(label).param("rows", batch)).await?;
        Ok(())
    }

    async fn upsert_relationships(
        &mut self,
        rel_type: &str,
        rows: &[RelationshipRow],
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let batch: Vec<HashMap<String, BoltType>> =
            rows.iter().map(relationship_params).collect();
        self.txn
            .run(upsert_relationships_query(rel_type).param("rows", batch))
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.txn
            .commit()
            .await
            .map_err(|e| Error::Store(format!("Failed to commit transaction: {e}")))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.txn
            .rollback()
            .await
            .map_err(|e| Error::Store(format!("Failed to rollback transaction: {e}")))
    }
}

fn constraint_statement(label: &str, property: &str) -> String {
    let name = format!("{}_{}_unique", label.to_lowercase(), property.to_lowercase());
    format!(
        "CREATE CONSTRAINT {name} IF NOT EXISTS FOR (n:`{label}`) REQUIRE n.`{property}` IS UNIQUE"
    )
}

fn upsert_nodes_query(label: &str) -> Query {
    query(&format!(
        "UNWIND $rows AS row \
         MERGE (n:{ENTITY_LABEL} {{ {ID_PROPERTY}: row.id }}) \
         SET n:`{label}`, n.pageId = row.pageId, n.label = row.label, n.description = row.description"
    ))
}

fn upsert_relationships_query(rel_type: &str) -> Query {
    query(&format!(
        "UNWIND $rows AS row \
         MERGE (start:{ENTITY_LABEL} {{ {ID_PROPERTY}: row.startId }}) \
         MERGE (end:{ENTITY_LABEL} {{ {ID_PROPERTY}: row.endId }}) \
         MERGE (start)-[r:`{rel_type}`]->(end) \
         SET r = row.properties"
    ))
}

fn optional(value: Option<&str>) -> BoltType {
    value.map_or(BoltType::Null(BoltNull), BoltType::from)
}

fn node_params(row: &NodeRow) -> HashMap<String, BoltType> {
    let mut m: HashMap<String, BoltType> = HashMap::new();
    m.insert("id".to_string(), row.id.as_str().into());
    m.insert(
        "pageId".to_string(),
        row.page_id
            .and_then(|p| i64::try_from(p).ok())
            .map_or(BoltType::Null(BoltNull), BoltType::from),
    );
    m.insert("label".to_string(), optional(row.label.as_deref()));
    m.insert(
        "description".to_string(),
        optional(row.description.as_deref()),
    );
    m
}

fn relationship_params(row: &RelationshipRow) -> HashMap<String, BoltType> {
    let properties: HashMap<String, BoltType> = row
        .properties
        .iter()
        .map(|(k, v)| (k.clone(), v.as_str().into()))
        .collect();

    let mut m: HashMap<String, BoltType> = HashMap::new();
    m.insert("startId".to_string(), row.start_id.as_str().into());
    m.insert("endId".to_string(), row.end_id.as_str().into());
    m.insert("properties".to_string(), properties.into());
    m
}
