//! Bounded transfer queue between the batcher and the stream writer
//!
//! A FIFO channel holding at most `capacity` batches. Sending suspends while
//! the queue is full, which is what keeps the reader from running arbitrarily
//! far ahead of the writer. Closing is tied to the sender: an explicit
//! [`BatchSender::close`] or dropping the sender both mark the end of the
//! stream, so the queue is closed exactly once on every exit path.

use std::fmt;

use tokio::sync::mpsc;
use tracing::trace;

use super::value::Batch;

/// Create a bounded queue holding at most `capacity` batches
///
/// A capacity of zero is treated as one.
pub fn bounded(capacity: usize) -> (BatchSender, BatchReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        BatchSender {
            inner: Some(tx),
            sent: 0,
        },
        BatchReceiver {
            inner: rx,
            received: 0,
        },
    )
}

/// Reasons a send can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// This sender already closed the queue
    Closed,
    /// The consumer went away; nothing sent from now on will be read
    Disconnected,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Closed => write!(f, "send on a closed batch queue"),
            QueueError::Disconnected => write!(f, "batch queue consumer has stopped"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Producer half of the queue
pub struct BatchSender {
    inner: Option<mpsc::Sender<Batch>>,
    sent: u64,
}

impl BatchSender {
    /// Send a batch, waiting while the queue is full
    pub async fn send(&mut self, batch: Batch) -> Result<(), QueueError> {
        let tx = self.inner.as_ref().ok_or(QueueError::Closed)?;
        let rows = batch.len();
        tx.send(batch).await.map_err(|_| QueueError::Disconnected)?;
        self.sent += 1;
        trace!("Queued batch #{} ({} rows)", self.sent, rows);
        Ok(())
    }

    /// Mark that no further batches will be sent
    ///
    /// Returns `true` only for the call that actually closed the queue.
    pub fn close(&mut self) -> bool {
        match self.inner.take() {
            Some(_) => {
                trace!("Closed batch queue after {} batches", self.sent);
                true
            }
            None => false,
        }
    }

    /// Whether sending is no longer possible, either because this side closed
    /// the queue or because the consumer has gone away
    pub fn is_closed(&self) -> bool {
        self.inner.as_ref().is_none_or(|tx| tx.is_closed())
    }
}

/// Consumer half of the queue
pub struct BatchReceiver {
    inner: mpsc::Receiver<Batch>,
    received: u64,
}

impl BatchReceiver {
    /// Receive the next batch, or `None` once the queue is closed and drained
    pub async fn recv(&mut self) -> Option<Batch> {
        let batch = self.inner.recv().await;
        self.track(batch)
    }

    /// Blocking variant of [`recv`](Self::recv) for use off the async runtime
    ///
    /// Panics if called from within an async execution context.
    pub fn blocking_recv(&mut self) -> Option<Batch> {
        let batch = self.inner.blocking_recv();
        self.track(batch)
    }

    /// Number of batches received so far
    pub fn received(&self) -> u64 {
        self.received
    }

    fn track(&mut self, batch: Option<Batch>) -> Option<Batch> {
        if batch.is_some() {
            self.received += 1;
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::value::{Row, Value};

    fn batch(tag: i64, rows: usize) -> Batch {
        (0..rows)
            .map(|i| Row::new(vec![Value::Integer(tag), Value::Integer(i as i64)]))
            .collect()
    }

    #[tokio::test]
    async fn test_fifo_then_closed() {
        let (mut tx, mut rx) = bounded(4);
        for tag in 0..3 {
            tx.send(batch(tag, 2)).await.unwrap();
        }
        assert!(tx.close());

        for tag in 0..3 {
            let b = rx.recv().await.unwrap();
            assert_eq!(b[0][0], Value::Integer(tag));
        }
        assert!(rx.recv().await.is_none());
        assert!(rx.recv().await.is_none());
        assert_eq!(rx.received(), 3);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut tx, mut rx) = bounded(1);
        assert!(tx.close());
        assert!(!tx.close());
        assert!(tx.is_closed());
        assert_eq!(tx.send(batch(0, 1)).await, Err(QueueError::Closed));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_sender_closes_queue() {
        let (mut tx, mut rx) = bounded(2);
        tx.send(batch(9, 1)).await.unwrap();
        drop(tx);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_consumer_gone() {
        let (mut tx, rx) = bounded(2);
        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(tx.send(batch(1, 1)).await, Err(QueueError::Disconnected));
    }

    #[tokio::test]
    async fn test_send_blocks_while_full() {
        let (mut tx, mut rx) = bounded(1);
        tx.send(batch(0, 1)).await.unwrap();

        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(50), tx.send(batch(1, 1))).await;
        assert!(blocked.is_err(), "second send should wait for capacity");

        assert!(rx.recv().await.is_some());
        tx.send(batch(2, 1)).await.unwrap();
        let next = rx.recv().await.unwrap();
        assert_eq!(next[0][0], Value::Integer(2));
    }
}
