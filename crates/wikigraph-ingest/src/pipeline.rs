//! Stage orchestration.
//!
//! Each stage is one independent pass: `reset` wipes the store, `load-nodes`
//! and `load-edges` stream the whole dump through a batcher, `inspect` reads
//! the dump without writing. A failed stage is re-run from the start.

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::batcher::{BatchBuffer, BatchSender, Batcher};
use crate::config::IngestOptions;
use crate::edges::{candidates_from_record, EdgeAccumulator, PropertyCandidates};
use crate::error::Result;
use crate::nodes::{NodeBatchWriter, NodeEntry};
use crate::record::{Record, Snak};
use crate::stage::{validate_order, Stage};
use crate::store::{GraphStore, ENTITY_LABEL, ID_PROPERTY};
use crate::stream::{RecordHandler, RecordStream, StreamStats};

/// Items queued between stream workers and a batch owner.
const BATCH_CHANNEL_CAPACITY: usize = 256;

/// Totals of one stage run.
#[derive(Debug, Clone)]
pub struct StageReport {
    /// Stage that ran.
    pub stage: Stage,
    /// Records streamed.
    pub records: u64,
    /// Source bytes read.
    pub bytes_read: u64,
    /// Nodes written.
    pub nodes_written: u64,
    /// Relationships written.
    pub relationships_written: u64,
    /// Batches committed.
    pub flushes: u64,
    /// Properties skipped for lack of a label.
    pub skipped_properties: u64,
    /// Bulk relationship statements the store rejected.
    pub failed_statements: u64,
    /// MediaInfo records not written.
    pub skipped_media_info: u64,
    /// Text rendering of the inspected entity.
    pub inspection: Option<String>,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl StageReport {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            records: 0,
            bytes_read: 0,
            nodes_written: 0,
            relationships_written: 0,
            flushes: 0,
            skipped_properties: 0,
            failed_statements: 0,
            skipped_media_info: 0,
            inspection: None,
            duration_secs: 0.0,
        }
    }

    /// Records per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.records as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

/// Runs stages against one store and one record stream.
pub struct Pipeline {
    options: IngestOptions,
    store: Arc<dyn GraphStore>,
    stream: Arc<dyn RecordStream>,
}

impl Pipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(
        options: IngestOptions,
        store: Arc<dyn GraphStore>,
        stream: Arc<dyn RecordStream>,
    ) -> Self {
        Self {
            options,
            store,
            stream,
        }
    }

    /// Runs `stages` in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns `Error::StageOrder` before anything runs if `stages` is not
    /// strictly increasing, otherwise the first stage failure wrapped as
    /// `Error::Stage`.
    pub async fn run(&self, stages: &[Stage]) -> Result<Vec<StageReport>> {
        validate_order(stages)?;
        let mut reports = Vec::with_capacity(stages.len());
        for &stage in stages {
            let report = self
                .run_stage(stage)
                .await
                .map_err(|e| e.in_stage(stage))?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// Runs one stage.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of the stage.
    pub async fn run_stage(&self, stage: Stage) -> Result<StageReport> {
        let start = Instant::now();
        let mut report = StageReport::new(stage);
        info!(
            "Running stage {} ({} store, {} stream)",
            stage,
            self.store.store_type(),
            self.stream.source_type()
        );

        match stage {
            Stage::Reset => self.reset().await?,
            Stage::LoadNodes => self.load_nodes(&mut report).await?,
            Stage::LoadEdges => self.load_edges(&mut report).await?,
            Stage::Inspect => self.inspect(&mut report).await?,
        }

        report.duration_secs = start.elapsed().as_secs_f64();
        info!(
            "Stage {} done: {} records, {} nodes, {} relationships in {:.2}s ({:.0} records/sec)",
            stage,
            report.records,
            report.nodes_written,
            report.relationships_written,
            report.duration_secs,
            report.throughput()
        );
        Ok(report)
    }

    async fn reset(&self) -> Result<()> {
        info!("Cleaning database");
        self.store.wipe_all().await
    }

    async fn load_nodes(&self, report: &mut StageReport) -> Result<()> {
        info!("Creating constraints");
        self.store
            .ensure_unique_constraint(ENTITY_LABEL, ID_PROPERTY)
            .await?;

        info!("Creating entities");
        let writer = NodeBatchWriter::new(Arc::clone(&self.store), self.options.node_batch_size);
        let locale = self.options.locale.clone();
        let (stats, nodes) = self
            .stream_into(writer, move |record: Record, sender: BatchSender<NodeEntry>| {
                let entry = NodeEntry::from_record(record, &locale);
                async move { sender.push(entry).await }
            })
            .await?;

        report.records = stats.records;
        report.bytes_read = stats.bytes;
        report.nodes_written = nodes.nodes_written;
        report.flushes = nodes.flushes;
        report.skipped_media_info = nodes.skipped_media_info;
        Ok(())
    }

    async fn load_edges(&self, report: &mut StageReport) -> Result<()> {
        info!("Linking statements");
        let accumulator = EdgeAccumulator::new(
            Arc::clone(&self.store),
            self.options.edge_property_threshold,
        );
        let (stats, edges) = self
            .stream_into(
                accumulator,
                |record: Record, sender: BatchSender<PropertyCandidates>| async move {
                    for item in candidates_from_record(&record) {
                        sender.push(item).await?;
                    }
                    Ok(())
                },
            )
            .await?;

        report.records = stats.records;
        report.bytes_read = stats.bytes;
        report.relationships_written = edges.relationships_written;
        report.flushes = edges.flushes;
        report.skipped_properties = edges.skipped_properties;
        report.failed_statements = edges.failed_statements;
        Ok(())
    }

    async fn inspect(&self, report: &mut StageReport) -> Result<()> {
        let handler = Arc::new(InspectHandler {
            entity: self.options.inspect_entity.clone(),
            found: Mutex::new(None),
            progress: self.progress_bar(),
        });
        let stats = self.stream.process(handler.clone()).await?;
        handler.progress.finish_and_clear();

        report.records = stats.records;
        report.bytes_read = stats.bytes;
        report.inspection = handler.found.lock().take();
        if report.inspection.is_none() {
            warn!("Entity {} not found in dump", self.options.inspect_entity);
        }
        Ok(())
    }

    /// Streams every record through `push` into a batcher owning `buffer`,
    /// then flushes the remainder.
    ///
    /// If the stream fails the remainder is dropped and the batch owner's
    /// own error, if any, takes precedence over the stream's.
    async fn stream_into<B, F, Fut>(&self, buffer: B, push: F) -> Result<(StreamStats, B::Report)>
    where
        B: BatchBuffer,
        F: Fn(Record, BatchSender<B::Item>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let batcher = Batcher::spawn(buffer, BATCH_CHANNEL_CAPACITY);
        let progress = self.progress_bar();
        let handler = Arc::new(BatchHandler {
            sender: batcher.sender(),
            push,
            progress: progress.clone(),
        });

        let outcome = self.stream.process(handler).await;
        progress.finish_and_clear();

        match outcome {
            Ok(stats) => {
                let report = batcher.finish().await?;
                Ok((stats, report))
            }
            Err(stream_err) => match batcher.cancel().await {
                Some(owner_err) => Err(owner_err),
                None => Err(stream_err),
            },
        }
    }

    /// Record counter, hidden when the stream draws its own bar.
    fn progress_bar(&self) -> ProgressBar {
        if !self.options.progress || self.stream.reports_progress() {
            return ProgressBar::hidden();
        }
        create_progress_bar(self.stream.len_hint().unwrap_or(0))
    }
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = if total > 0 {
        ProgressBar::new(total)
    } else {
        ProgressBar::new_spinner()
    };

    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    pb
}

/// Forwards records to a batch owner.
struct BatchHandler<T, F> {
    sender: BatchSender<T>,
    push: F,
    progress: ProgressBar,
}

#[async_trait]
impl<T, F, Fut> RecordHandler for BatchHandler<T, F>
where
    T: Send + 'static,
    F: Fn(Record, BatchSender<T>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, record: Record) -> Result<()> {
        (self.push)(record, self.sender.clone()).await?;
        self.progress.inc(1);
        Ok(())
    }
}

struct InspectHandler {
    entity: String,
    found: Mutex<Option<String>>,
    progress: ProgressBar,
}

#[async_trait]
impl RecordHandler for InspectHandler {
    async fn handle(&self, record: Record) -> Result<()> {
        self.progress.inc(1);
        if record.id == self.entity {
            *self.found.lock() = Some(render_claims(&record));
        }
        Ok(())
    }
}

/// Renders every claim of `record` with its main snak and qualifiers.
#[must_use]
pub fn render_claims(record: &Record) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Entity: {} ({})", record.id, record.kind);

    let mut properties: Vec<&String> = record.claims.keys().collect();
    properties.sort();
    for property in properties {
        for statement in &record.claims[property] {
            let _ = writeln!(out, "Claim: {property}");
            render_snak(&mut out, &statement.main);

            if !statement.qualifiers.is_empty() {
                let _ = writeln!(out, "Qualifiers:");
                let mut qualifiers: Vec<&String> = statement.qualifiers.keys().collect();
                qualifiers.sort();
                for qualifier in qualifiers {
                    let _ = writeln!(out, "Qualifier name: {qualifier}");
                    for snak in &statement.qualifiers[qualifier] {
                        render_snak(&mut out, snak);
                    }
                }
            }
            let _ = writeln!(out, "---------------------------");
        }
    }
    out
}

fn render_snak(out: &mut String, snak: &Snak) {
    let _ = writeln!(out, "Property: {}", snak.property);
    let _ = writeln!(
        out,
        "Data Type: {}",
        snak.datatype.as_deref().unwrap_or("unknown")
    );
    match &snak.value {
        Some(value) => {
            let _ = writeln!(out, "Data Value: {value}");
        }
        None => {
            let _ = writeln!(out, "Data Value: nil");
        }
    }
}
