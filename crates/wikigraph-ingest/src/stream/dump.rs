//! Wikidata JSON dump reader.
//!
//! Dumps are one large JSON array with one entity per line. A blocking reader
//! thread streams raw lines (decompressing `.gz` files on the fly); workers
//! decode and handle them concurrently. Progress is measured in bytes of
//! the file on disk, so a compressed dump still shows a percentage and ETA.

use async_trait::async_trait;
use flate2::read::MultiGzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{dispatch, RecordHandler, RecordStream, StreamStats};
use crate::config::DumpConfig;
use crate::error::{Error, Result};
use crate::record::Record;

/// Stream over a dump file.
pub struct DumpStream {
    path: PathBuf,
    workers: usize,
    channel_capacity: usize,
    progress: bool,
}

impl DumpStream {
    /// Creates a stream over the dump described by `config`.
    #[must_use]
    pub fn new(config: &DumpConfig) -> Self {
        Self {
            path: config.path.clone(),
            workers: config.workers.max(1),
            channel_capacity: config.channel_capacity.max(1),
            progress: true,
        }
    }

    /// Shows or hides the byte progress bar.
    #[must_use]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Dump path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

fn byte_progress(total: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {percent}% (eta {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Lines and file bytes consumed by one read.
struct ReadStats {
    lines: u64,
    bytes: u64,
}

/// Sends `(line number, line)` pairs until the file ends or every receiver
/// is gone.
fn read_lines(
    path: &Path,
    tx: &mpsc::Sender<(u64, String)>,
    progress: bool,
) -> Result<ReadStats> {
    let file = File::open(path)?;
    let pb = byte_progress(file.metadata()?.len(), progress);
    let counted = pb.wrap_read(file);
    let reader: Box<dyn BufRead> = if is_gzip(path) {
        Box::new(BufReader::new(MultiGzDecoder::new(counted)))
    } else {
        Box::new(BufReader::new(counted))
    };

    let mut line_no = 0u64;
    for line in reader.lines() {
        let line = line?;
        line_no += 1;
        if tx.blocking_send((line_no, line)).is_err() {
            debug!("Workers stopped, reader exits at line {}", line_no);
            break;
        }
    }
    pb.finish_and_clear();

    Ok(ReadStats {
        lines: line_no,
        bytes: pb.position(),
    })
}

#[async_trait]
impl RecordStream for DumpStream {
    fn source_type(&self) -> &'static str {
        "dump"
    }

    fn reports_progress(&self) -> bool {
        self.progress
    }

    async fn process(&self, handler: Arc<dyn RecordHandler>) -> Result<StreamStats> {
        if !self.path.exists() {
            return Err(Error::Stream(format!(
                "dump not found: {}",
                self.path.display()
            )));
        }
        info!("Reading dump {}", self.path.display());

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let path = self.path.clone();
        let progress = self.progress;
        let reader = tokio::task::spawn_blocking(move || read_lines(&path, &tx, progress));

        let records = dispatch(rx, self.workers, handler, |(line_no, line): (u64, String)| {
            Record::from_dump_line(&line, line_no)
        })
        .await?;

        let read = reader
            .await
            .map_err(|e| Error::Stream(format!("dump reader panicked: {e}")))??;
        debug!(
            "{} lines, {} bytes, {} records",
            read.lines, read.bytes, records
        );

        Ok(StreamStats {
            records,
            bytes: read.bytes,
        })
    }
}
