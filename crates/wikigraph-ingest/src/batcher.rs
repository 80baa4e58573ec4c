//! Single-owner batching.
//!
//! A buffer is moved into its own tokio task. Stream workers hold cheap
//! [`BatchSender`] handles and send items over a bounded channel; the owner
//! appends each item, checks the buffer and flushes inline. A flush therefore
//! never races with an append, and a full channel back-pressures the
//! workers while a flush is in flight.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Error, Result};

/// A buffer that is drained to the graph store when full.
#[async_trait]
pub trait BatchBuffer: Send + 'static {
    /// Item appended by producers.
    type Item: Send + 'static;
    /// Totals handed back when the owner stops.
    type Report: Send + 'static;

    /// Appends one item.
    fn push(&mut self, item: Self::Item);

    /// Whether the buffer must be flushed before the next append.
    fn is_full(&self) -> bool;

    /// Whether a final flush has anything to write.
    fn is_empty(&self) -> bool;

    /// Writes the buffered items and resets the buffer.
    async fn flush(&mut self) -> Result<()>;

    /// Consumes the buffer into its totals.
    fn into_report(self) -> Self::Report;
}

enum Command<T> {
    Push(T),
    Finish,
    Cancel,
}

/// Producer handle.
pub struct BatchSender<T> {
    tx: mpsc::Sender<Command<T>>,
}

impl<T> Clone for BatchSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send> BatchSender<T> {
    /// Sends one item to the owner, waiting while the channel is full.
    ///
    /// # Errors
    ///
    /// Returns `Error::BatcherClosed` once the owner has stopped, which
    /// happens after a failed flush.
    pub async fn push(&self, item: T) -> Result<()> {
        self.tx
            .send(Command::Push(item))
            .await
            .map_err(|_| Error::BatcherClosed)
    }
}

/// Owner task of one buffer.
pub struct Batcher<B: BatchBuffer> {
    tx: mpsc::Sender<Command<B::Item>>,
    task: JoinHandle<Result<B::Report>>,
}

impl<B: BatchBuffer> Batcher<B> {
    /// Moves `buffer` into a new owner task fed by a channel of `capacity`.
    #[must_use]
    pub fn spawn(buffer: B, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(own(buffer, rx));
        Self { tx, task }
    }

    /// Returns a producer handle.
    #[must_use]
    pub fn sender(&self) -> BatchSender<B::Item> {
        BatchSender {
            tx: self.tx.clone(),
        }
    }

    /// Flushes what remains and returns the totals.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failed flush.
    pub async fn finish(self) -> Result<B::Report> {
        // A send failure means the owner already stopped; join reports why.
        let _ = self.tx.send(Command::Finish).await;
        join(self.task).await
    }

    /// Stops the owner without flushing the remainder.
    ///
    /// Returns the owner's own error if it had already failed.
    pub async fn cancel(self) -> Option<Error> {
        let _ = self.tx.send(Command::Cancel).await;
        join(self.task).await.err()
    }
}

async fn join<R>(task: JoinHandle<Result<R>>) -> Result<R> {
    task.await
        .map_err(|e| Error::Stream(format!("batch owner panicked: {e}")))?
}

async fn own<B: BatchBuffer>(
    mut buffer: B,
    mut rx: mpsc::Receiver<Command<B::Item>>,
) -> Result<B::Report> {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Push(item) => {
                buffer.push(item);
                if buffer.is_full() {
                    buffer.flush().await?;
                }
            }
            Command::Finish => break,
            Command::Cancel => {
                debug!("Batch owner cancelled, dropping remainder");
                return Ok(buffer.into_report());
            }
        }
    }

    if !buffer.is_empty() {
        buffer.flush().await?;
    }
    Ok(buffer.into_report())
}
