//! Record streams.
//!
//! A stream delivers every record of a source to a [`RecordHandler`] from a
//! pool of concurrent workers. The first handler error stops the pass and is
//! returned from [`RecordStream::process`].

pub mod dump;
pub mod fetch;
pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::record::Record;

pub use dump::DumpStream;
pub use fetch::DumpFetcher;
pub use memory::MemoryStream;

/// Per-record callback invoked concurrently by stream workers.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    /// Handles one record. An error aborts the whole pass.
    async fn handle(&self, record: Record) -> Result<()>;
}

/// Totals of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Records handed to the handler.
    pub records: u64,
    /// Source bytes read (compressed size for `.gz` dumps), 0 when the
    /// source is not a file.
    pub bytes: u64,
}

/// A source of records that can be read from start to end, repeatedly.
#[async_trait]
pub trait RecordStream: Send + Sync {
    /// Source type name for logs.
    fn source_type(&self) -> &'static str;

    /// Number of records, when known up front.
    fn len_hint(&self) -> Option<u64> {
        None
    }

    /// Whether the stream draws its own progress bar during a pass.
    fn reports_progress(&self) -> bool {
        false
    }

    /// Runs one full pass over the source.
    async fn process(&self, handler: Arc<dyn RecordHandler>) -> Result<StreamStats>;
}

/// Drains `rx` with `workers` tasks, decoding each item and passing the
/// resulting records to `handler`.
///
/// Returns the number of records handled. On the first error the remaining
/// workers are aborted.
pub(crate) async fn dispatch<T, F>(
    rx: mpsc::Receiver<T>,
    workers: usize,
    handler: Arc<dyn RecordHandler>,
    decode: F,
) -> Result<u64>
where
    T: Send + 'static,
    F: Fn(T) -> Result<Option<Record>> + Send + Sync + 'static,
{
    let rx = Arc::new(Mutex::new(rx));
    let decode = Arc::new(decode);
    let mut set = JoinSet::new();

    for _ in 0..workers.max(1) {
        let rx = Arc::clone(&rx);
        let handler = Arc::clone(&handler);
        let decode = Arc::clone(&decode);
        set.spawn(async move {
            let mut handled = 0u64;
            loop {
                let next = rx.lock().await.recv().await;
                let Some(item) = next else {
                    break;
                };
                if let Some(record) = decode(item)? {
                    handler.handle(record).await?;
                    handled += 1;
                }
            }
            Ok::<u64, Error>(handled)
        });
    }

    let mut total = 0u64;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(handled)) => total += handled,
            Ok(Err(e)) => {
                set.abort_all();
                return Err(e);
            }
            Err(e) => {
                set.abort_all();
                return Err(Error::Stream(format!("worker panicked: {e}")));
            }
        }
    }
    Ok(total)
}
