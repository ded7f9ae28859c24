//! Grouping of source rows into fixed-size batches
//!
//! The batcher is the production side of the pipeline. It pulls rows from a
//! [`RowSource`], fills batches of at most `capacity` rows and pushes each
//! full batch into the transfer queue, waiting whenever the queue is full.
//! A non-empty remainder is sent once more at end of data. The queue is
//! closed on every exit path.

use std::mem;

use tracing::{debug, info};

use crate::error::SheetError;

use super::queue::{BatchSender, QueueError};
use super::source::RowSource;
use super::value::Batch;

/// Counters for a completed production run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Rows read from the source
    pub rows: u64,
    /// Batches handed to the queue
    pub batches: u64,
}

/// Why the production side stopped early
#[derive(Debug)]
pub enum ProduceError {
    /// The source failed to produce a row
    Source {
        error: SheetError,
        /// Whether the writer had already stopped when the source failed
        consumer_gone: bool,
    },
    /// The writer stopped consuming; its own error explains why
    ConsumerGone,
}

/// Accumulates rows into batches and hands them to the queue
#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    capacity: usize,
}

impl Batcher {
    /// Create a batcher producing batches of at most `capacity` rows
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }

    /// Drain the source into the queue
    ///
    /// Takes ownership of the sender so the queue is closed however this
    /// returns. On a source error the partially filled batch is discarded.
    ///
    /// # Arguments
    /// * `source` - Row source to drain
    /// * `queue` - Producer half of the transfer queue
    ///
    /// # Returns
    /// * `Result<BatchStats, ProduceError>` - Counters, or why production stopped
    pub async fn run<S>(&self, source: &mut S, mut queue: BatchSender) -> Result<BatchStats, ProduceError>
    where
        S: RowSource + ?Sized,
    {
        let width = source.columns().len();
        let mut stats = BatchStats::default();
        let mut current: Batch = Vec::with_capacity(self.capacity);

        loop {
            let row = match source.next_row().await {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(error) => return Err(Self::abort(&mut queue, error, current.len())),
            };

            if row.len() != width {
                let error = SheetError::Scan(format!(
                    "row {} has {} values but the result has {} columns",
                    stats.rows + 1,
                    row.len(),
                    width
                ));
                return Err(Self::abort(&mut queue, error, current.len()));
            }

            current.push(row);
            stats.rows += 1;

            if current.len() >= self.capacity {
                let full = mem::replace(&mut current, Vec::with_capacity(self.capacity));
                Self::hand_off(&mut queue, full, &mut stats).await?;
            }
        }

        if !current.is_empty() {
            Self::hand_off(&mut queue, current, &mut stats).await?;
        }

        queue.close();
        info!(
            "Finished reading: {} rows in {} batches",
            stats.rows, stats.batches
        );
        Ok(stats)
    }

    async fn hand_off(
        queue: &mut BatchSender,
        batch: Batch,
        stats: &mut BatchStats,
    ) -> Result<(), ProduceError> {
        let rows = batch.len();
        match queue.send(batch).await {
            Ok(()) => {
                stats.batches += 1;
                debug!("Sent batch #{} ({} rows)", stats.batches, rows);
                if stats.batches % 10 == 0 {
                    info!(
                        "Progress: {} rows read ({} batches)",
                        stats.rows, stats.batches
                    );
                }
                Ok(())
            }
            Err(QueueError::Disconnected) | Err(QueueError::Closed) => {
                debug!("Writer stopped consuming; abandoning production");
                Err(ProduceError::ConsumerGone)
            }
        }
    }

    fn abort(queue: &mut BatchSender, error: SheetError, discarded: usize) -> ProduceError {
        let consumer_gone = queue.is_closed();
        queue.close();
        debug!(
            "Source failed, discarding {} buffered rows: {}",
            discarded, error
        );
        ProduceError::Source {
            error,
            consumer_gone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::queue::{self, BatchReceiver};
    use crate::export::source::tests::MockRowSource;
    use crate::export::value::{Row, Value};

    async fn drain(rx: &mut BatchReceiver) -> Vec<Batch> {
        let mut batches = Vec::new();
        while let Some(batch) = rx.recv().await {
            batches.push(batch);
        }
        batches
    }

    #[tokio::test]
    async fn test_batch_count_is_ceiling() {
        for (rows, capacity, expected) in [(0, 3, 0), (1, 3, 1), (3, 3, 1), (7, 3, 3), (9, 3, 3)] {
            let mut source = MockRowSource::numbered(rows);
            let (tx, mut rx) = queue::bounded(16);

            let stats = Batcher::new(capacity).run(&mut source, tx).await.unwrap();
            let batches = drain(&mut rx).await;

            assert_eq!(stats.batches, expected, "rows={rows} capacity={capacity}");
            assert_eq!(batches.len() as u64, expected);
            assert_eq!(stats.rows, rows as u64);
            assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), rows);
            assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= capacity));
        }
    }

    #[tokio::test]
    async fn test_reference_batch_sizes() {
        let mut source = MockRowSource::numbered(25_000);
        let (tx, mut rx) = queue::bounded(10);

        let consumer = tokio::spawn(async move { drain(&mut rx).await });
        let stats = Batcher::new(10_000).run(&mut source, tx).await.unwrap();
        let batches = consumer.await.unwrap();

        assert_eq!(stats, BatchStats { rows: 25_000, batches: 3 });
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10_000, 10_000, 5_000]);
        assert_eq!(batches[2][4_999][0], Value::Integer(24_999));
    }

    #[tokio::test]
    async fn test_source_failure_discards_partial_batch() {
        // Two full batches of 4, then a partial of 3, then failure
        let mut source = MockRowSource::numbered(11).failing_after();
        let (tx, mut rx) = queue::bounded(8);

        let err = Batcher::new(4).run(&mut source, tx).await.unwrap_err();
        let batches = drain(&mut rx).await;

        assert_eq!(batches.len(), 2);
        match err {
            ProduceError::Source {
                error: SheetError::Scan(msg),
                consumer_gone,
            } => {
                assert!(msg.contains("connection reset"));
                assert!(!consumer_gone);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_immediate_failure_still_closes_queue() {
        let mut source = MockRowSource::numbered(0).failing_after();
        let (tx, mut rx) = queue::bounded(2);

        assert!(Batcher::new(10).run(&mut source, tx).await.is_err());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_consumer_gone_stops_production() {
        let mut source = MockRowSource::numbered(10);
        let (tx, rx) = queue::bounded(1);
        drop(rx);

        let err = Batcher::new(2).run(&mut source, tx).await.unwrap_err();
        assert!(matches!(err, ProduceError::ConsumerGone));
    }

    #[tokio::test]
    async fn test_source_failure_after_consumer_gone_is_flagged() {
        let mut source = MockRowSource::numbered(1).failing_after();
        let (tx, rx) = queue::bounded(1);
        drop(rx);

        let err = Batcher::new(5).run(&mut source, tx).await.unwrap_err();
        assert!(matches!(
            err,
            ProduceError::Source {
                consumer_gone: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_ragged_row_is_scan_error() {
        let rows = vec![
            Row::new(vec![Value::Integer(1), Value::Null]),
            Row::new(vec![Value::Integer(2)]),
        ];
        let mut source = MockRowSource::new(&["a", "b"], rows);
        let (tx, mut rx) = queue::bounded(2);

        let err = Batcher::new(10).run(&mut source, tx).await.unwrap_err();
        assert!(matches!(
            err,
            ProduceError::Source {
                error: SheetError::Scan(_),
                ..
            }
        ));
        assert!(rx.recv().await.is_none());
    }
}
