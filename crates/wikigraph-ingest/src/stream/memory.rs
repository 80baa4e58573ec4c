//! Stream over records already in memory.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{dispatch, RecordHandler, RecordStream, StreamStats};
use crate::error::Result;
use crate::record::Record;

/// Replays a fixed list of records on every pass, through the same
/// concurrent worker pool as a dump.
pub struct MemoryStream {
    records: Arc<Vec<Record>>,
    workers: usize,
}

impl MemoryStream {
    /// Creates a stream over `records` handled by `workers` tasks.
    #[must_use]
    pub fn new(records: Vec<Record>, workers: usize) -> Self {
        Self {
            records: Arc::new(records),
            workers: workers.max(1),
        }
    }
}

#[async_trait]
impl RecordStream for MemoryStream {
    fn source_type(&self) -> &'static str {
        "memory"
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.records.len() as u64)
    }

    async fn process(&self, handler: Arc<dyn RecordHandler>) -> Result<StreamStats> {
        let (tx, rx) = mpsc::channel(self.workers * 2);
        let records = Arc::clone(&self.records);
        let feeder = tokio::spawn(async move {
            for record in records.iter() {
                if tx.send(record.clone()).await.is_err() {
                    break;
                }
            }
        });

        let records = dispatch(rx, self.workers, handler, |record| Ok(Some(record))).await;
        feeder.abort();
        Ok(StreamStats {
            records: records?,
            bytes: 0,
        })
    }
}
