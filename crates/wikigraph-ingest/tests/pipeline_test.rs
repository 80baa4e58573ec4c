//! End-to-end stage runs against the in-memory graph store.

#![allow(clippy::pedantic)]

use std::sync::Arc;

use wikigraph_ingest::config::{DumpConfig, IngestOptions};
use wikigraph_ingest::record::{entity_statement, TypedValue};
use wikigraph_ingest::{
    DumpStream, EntityKind, Error, InMemoryGraphStore, MemoryStream, Pipeline, Record, Stage,
};

fn property(id: &str, label: &str) -> Record {
    Record::new(id, EntityKind::Property).with_label("en", label)
}

fn item(id: &str) -> Record {
    Record::new(id, EntityKind::Item).with_label("en", id.to_lowercase())
}

fn options(threshold: usize) -> IngestOptions {
    IngestOptions {
        edge_property_threshold: threshold,
        progress: false,
        ..Default::default()
    }
}

fn pipeline(store: &InMemoryGraphStore, records: Vec<Record>, options: IngestOptions) -> Pipeline {
    Pipeline::new(
        options,
        Arc::new(store.clone()),
        Arc::new(MemoryStream::new(records, 4)),
    )
}

/// Same as [`pipeline`] with a single worker, so records arrive in order.
fn ordered_pipeline(
    store: &InMemoryGraphStore,
    records: Vec<Record>,
    options: IngestOptions,
) -> Pipeline {
    Pipeline::new(
        options,
        Arc::new(store.clone()),
        Arc::new(MemoryStream::new(records, 1)),
    )
}

#[tokio::test]
async fn test_instance_of_relationship_without_qualifiers() {
    // Arrange
    let store = InMemoryGraphStore::new();
    let records = vec![
        property("P31", "instance of"),
        item("Q515"),
        item("Q5").with_statement("P31", entity_statement("P31", "Q515")),
    ];

    // Act
    let reports = pipeline(&store, records, options(10_000))
        .run(&[Stage::LoadNodes, Stage::LoadEdges])
        .await
        .unwrap();

    // Assert
    let props = store.relationship("Q5", "INSTANCE_OF", "Q515").unwrap();
    assert!(props.is_empty());
    assert_eq!(store.relationship_count(), 1);
    assert_eq!(reports[0].nodes_written, 3);
    assert_eq!(reports[1].relationships_written, 1);
    assert_eq!(reports[1].records, 3);
}

#[tokio::test]
async fn test_qualifier_becomes_relationship_property() {
    let store = InMemoryGraphStore::new();
    let statement = entity_statement("P39", "Q11696")
        .with_qualifier("P580", TypedValue::String("2020".to_string()));
    let records = vec![
        property("P39", "position held"),
        property("P580", "start time"),
        item("Q76").with_statement("P39", statement),
    ];

    pipeline(&store, records, options(10_000))
        .run(&[Stage::LoadNodes, Stage::LoadEdges])
        .await
        .unwrap();

    let props = store.relationship("Q76", "POSITION_HELD", "Q11696").unwrap();
    assert_eq!(props.len(), 1);
    assert_eq!(props["START_TIME"], "2020");
}

#[tokio::test]
async fn test_unresolved_qualifier_keeps_raw_id() {
    let store = InMemoryGraphStore::new();
    let statement = entity_statement("P31", "Q515")
        .with_qualifier("P9999", TypedValue::String("x".to_string()));
    let records = vec![
        property("P31", "instance of"),
        item("Q5").with_statement("P31", statement),
    ];

    pipeline(&store, records, options(10_000))
        .run(&[Stage::LoadNodes, Stage::LoadEdges])
        .await
        .unwrap();

    let props = store.relationship("Q5", "INSTANCE_OF", "Q515").unwrap();
    assert_eq!(props.get("P9999").map(String::as_str), Some("x"));
}

#[tokio::test]
async fn test_same_property_records_share_one_bulk_statement() {
    let store = InMemoryGraphStore::new();
    let records = vec![
        property("P31", "instance of"),
        item("Q1").with_statement("P31", entity_statement("P31", "Q5")),
        item("Q2").with_statement("P31", entity_statement("P31", "Q5")),
    ];
    let pipeline = pipeline(&store, records, options(10_000));
    pipeline.run(&[Stage::LoadNodes]).await.unwrap();
    assert_eq!(store.stats().relationship_statements, 0);

    pipeline.run(&[Stage::LoadEdges]).await.unwrap();

    assert_eq!(store.stats().relationship_statements, 1);
    assert!(store.relationship("Q1", "INSTANCE_OF", "Q5").is_some());
    assert!(store.relationship("Q2", "INSTANCE_OF", "Q5").is_some());
}

#[tokio::test]
async fn test_flush_happens_when_distinct_properties_reach_threshold() {
    // Arrange: Q1 and Q2 bring two distinct properties, Q3 a third batch
    let store = InMemoryGraphStore::new();
    let records = vec![
        property("P31", "instance of"),
        property("P279", "subclass of"),
        item("Q1").with_statement("P31", entity_statement("P31", "Q5")),
        item("Q2").with_statement("P279", entity_statement("P279", "Q5")),
        item("Q3").with_statement("P31", entity_statement("P31", "Q5")),
    ];
    let pipeline = ordered_pipeline(&store, records, options(2));
    pipeline.run_stage(Stage::LoadNodes).await.unwrap();

    // Act
    let report = pipeline.run_stage(Stage::LoadEdges).await.unwrap();

    // Assert: one threshold flush plus the final remainder
    assert_eq!(report.flushes, 2);
    assert_eq!(report.relationships_written, 3);
}

#[tokio::test]
async fn test_no_flush_below_threshold_until_stream_ends() {
    let store = InMemoryGraphStore::new();
    let records = vec![
        property("P31", "instance of"),
        item("Q1").with_statement("P31", entity_statement("P31", "Q5")),
        item("Q2").with_statement("P31", entity_statement("P31", "Q6")),
        item("Q3").with_statement("P31", entity_statement("P31", "Q7")),
    ];
    let pipeline = pipeline(&store, records, options(2));
    pipeline.run_stage(Stage::LoadNodes).await.unwrap();
    let commits_before = store.stats().commits;

    let report = pipeline.run_stage(Stage::LoadEdges).await.unwrap();

    assert_eq!(report.flushes, 1);
    assert_eq!(store.stats().commits, commits_before + 1);
}

#[tokio::test]
async fn test_load_nodes_is_idempotent() {
    let store = InMemoryGraphStore::new();
    let records = vec![property("P31", "instance of"), item("Q1"), item("Q2")];
    let pipeline = pipeline(&store, records, options(10_000));

    pipeline.run_stage(Stage::LoadNodes).await.unwrap();
    let first = store.node("Q1").unwrap();
    pipeline.run_stage(Stage::LoadNodes).await.unwrap();

    assert_eq!(store.node_count(), 3);
    assert_eq!(store.node("Q1").unwrap(), first);
    assert!(store.has_constraint("Entity", "id"));
    assert!(store.node("P31").unwrap().labels.contains("Property"));
}

#[tokio::test]
async fn test_small_node_batches_flush_repeatedly() {
    let store = InMemoryGraphStore::new();
    let records: Vec<Record> = (0..10).map(|i| item(&format!("Q{i}"))).collect();
    let options = IngestOptions {
        node_batch_size: 3,
        ..options(10_000)
    };

    let report = ordered_pipeline(&store, records, options)
        .run_stage(Stage::LoadNodes)
        .await
        .unwrap();

    assert_eq!(report.nodes_written, 10);
    assert_eq!(report.flushes, 4);
    assert_eq!(store.node_count(), 10);
}

#[tokio::test]
async fn test_media_info_counted_not_written() {
    let store = InMemoryGraphStore::new();
    let records = vec![item("Q1"), Record::new("M1", EntityKind::MediaInfo)];

    let report = pipeline(&store, records, options(10_000))
        .run_stage(Stage::LoadNodes)
        .await
        .unwrap();

    assert_eq!(report.skipped_media_info, 1);
    assert!(store.node("M1").is_none());
}

#[tokio::test]
async fn test_unlabelled_property_is_skipped() {
    let store = InMemoryGraphStore::new();
    let records = vec![
        property("P31", "instance of"),
        item("Q1")
            .with_statement("P31", entity_statement("P31", "Q5"))
            .with_statement("P8888", entity_statement("P8888", "Q6")),
    ];

    let reports = pipeline(&store, records, options(10_000))
        .run(&[Stage::LoadNodes, Stage::LoadEdges])
        .await
        .unwrap();

    assert_eq!(reports[1].skipped_properties, 1);
    assert_eq!(store.relationship_types(), vec!["INSTANCE_OF".to_string()]);
}

#[tokio::test]
async fn test_rejected_statement_does_not_abort_stage() {
    let store = InMemoryGraphStore::new();
    store.reject_relationship_type("INSTANCE_OF");
    let records = vec![
        property("P31", "instance of"),
        property("P279", "subclass of"),
        item("Q1")
            .with_statement("P31", entity_statement("P31", "Q5"))
            .with_statement("P279", entity_statement("P279", "Q6")),
    ];

    let reports = pipeline(&store, records, options(10_000))
        .run(&[Stage::LoadNodes, Stage::LoadEdges])
        .await
        .unwrap();

    assert_eq!(reports[1].failed_statements, 1);
    assert!(store.relationship("Q1", "SUBCLASS_OF", "Q6").is_some());
}

#[tokio::test]
async fn test_commit_failure_aborts_stage() {
    let store = InMemoryGraphStore::new();
    store.fail_commits(true);
    let records: Vec<Record> = (0..50).map(|i| item(&format!("Q{i}"))).collect();
    let options = IngestOptions {
        node_batch_size: 5,
        ..options(10_000)
    };

    let err = pipeline(&store, records, options)
        .run(&[Stage::LoadNodes, Stage::LoadEdges])
        .await
        .unwrap_err();

    match err {
        Error::Stage { stage, source } => {
            assert_eq!(stage, Stage::LoadNodes);
            assert!(matches!(*source, Error::Store(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.node_count(), 0);
}

#[tokio::test]
async fn test_out_of_order_stages_rejected_before_running() {
    let store = InMemoryGraphStore::new();
    let pipeline = pipeline(&store, vec![item("Q1")], options(10_000));

    let err = pipeline
        .run(&[Stage::LoadEdges, Stage::LoadNodes])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::StageOrder { .. }));
    assert_eq!(store.stats().commits, 0);
}

#[tokio::test]
async fn test_reset_wipes_store() {
    let store = InMemoryGraphStore::new();
    let pipeline = pipeline(&store, vec![item("Q1"), item("Q2")], options(10_000));
    pipeline.run_stage(Stage::LoadNodes).await.unwrap();
    assert_eq!(store.node_count(), 2);

    pipeline.run(&[Stage::Reset]).await.unwrap();

    assert_eq!(store.node_count(), 0);
}

#[tokio::test]
async fn test_inspect_renders_configured_entity_without_writing() {
    let store = InMemoryGraphStore::new();
    let records = vec![
        item("Q1"),
        item("Q2013").with_statement("P31", entity_statement("P31", "Q1")),
    ];

    let report = pipeline(&store, records, options(10_000))
        .run_stage(Stage::Inspect)
        .await
        .unwrap();

    let text = report.inspection.unwrap();
    assert!(text.contains("Claim: P31"));
    assert!(text.contains("Data Value: Q1"));
    assert_eq!(store.stats().commits, 0);
}

#[tokio::test]
async fn test_dump_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dump.json");
    std::fs::write(
        &path,
        concat!(
            "[\n",
            r#"{"type":"property","id":"P31","labels":{"en":{"language":"en","value":"instance of"}}},"#,
            "\n",
            r#"{"type":"item","id":"Q515","labels":{"en":{"language":"en","value":"city"}}},"#,
            "\n",
            r#"{"type":"item","id":"Q90","labels":{"en":{"language":"en","value":"Paris"}},"claims":{"P31":[{"mainsnak":{"snaktype":"value","property":"P31","datavalue":{"value":{"entity-type":"item","numeric-id":515,"id":"Q515"},"type":"wikibase-entityid"}}}]}}"#,
            "\n]\n"
        ),
    )
    .unwrap();
    let size = std::fs::metadata(&path).unwrap().len();
    let dump = DumpConfig {
        path,
        url: None,
        user_agent: "test".to_string(),
        download_retries: 0,
        workers: 2,
        channel_capacity: 8,
    };
    let store = InMemoryGraphStore::new();
    let pipeline = Pipeline::new(
        options(10_000),
        Arc::new(store.clone()),
        Arc::new(DumpStream::new(&dump).with_progress(false)),
    );

    let reports = pipeline
        .run(&[Stage::Reset, Stage::LoadNodes, Stage::LoadEdges])
        .await
        .unwrap();

    assert_eq!(reports[0].bytes_read, 0);
    assert_eq!(reports[1].bytes_read, size);
    assert_eq!(reports[2].bytes_read, size);

    assert_eq!(store.node("Q90").unwrap().property_str("label"), Some("Paris"));
    assert!(store.relationship("Q90", "INSTANCE_OF", "Q515").is_some());
}
