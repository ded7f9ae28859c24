//! Single-consumer stream writer
//!
//! The stream writer is the only component that appends data rows to the
//! output document. It runs as its own task, takes batches off the transfer
//! queue in order and renders each row at the next document position.
//!
//! State machine: `Idle → Running → {Completed | Failed}`. The first render
//! error moves the writer to `Failed`; it stops consuming immediately, drops
//! its end of the queue (so a producer blocked on a full queue wakes up) and
//! reports the error through the completion protocol.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Result, SheetError};

use super::completion::{self, CompletionSignal, CompletionWaiter, WriterReport};
use super::progress::ProgressTracker;
use super::queue::BatchReceiver;
use super::value::Batch;
use super::writers::{FIRST_DATA_ROW, RowSink};

/// Lifecycle of a [`StreamWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Position of the next data row in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCursor {
    next: u32,
}

impl WriteCursor {
    /// Cursor pointing at the row right after the header
    pub fn new() -> Self {
        Self {
            next: FIRST_DATA_ROW,
        }
    }

    pub fn position(&self) -> u32 {
        self.next
    }

    /// Move to the following row
    pub fn advance(&mut self) -> Result<()> {
        self.next = self
            .next
            .checked_add(1)
            .ok_or_else(|| SheetError::Render("row position overflow".to_string()))?;
        Ok(())
    }

    /// Number of data rows behind the cursor
    pub fn rows_written(&self) -> u64 {
        u64::from(self.next - FIRST_DATA_ROW)
    }
}

impl Default for WriteCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer of the transfer queue
pub struct StreamWriter {
    sink: Box<dyn RowSink>,
    cursor: WriteCursor,
    state: WriterState,
    batches: u64,
    tracker: ProgressTracker,
}

impl StreamWriter {
    /// Create an idle writer over a sink whose header is already written
    pub fn new(sink: Box<dyn RowSink>, tracker: ProgressTracker) -> Self {
        Self {
            sink,
            cursor: WriteCursor::new(),
            state: WriterState::Idle,
            batches: 0,
            tracker,
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn rows_written(&self) -> u64 {
        self.cursor.rows_written()
    }

    /// Start the writer on a blocking worker thread
    ///
    /// # Arguments
    /// * `queue` - Consumer half of the transfer queue
    ///
    /// # Returns
    /// * `WriterHandle` - Handle to wait for the writer's outcome
    pub fn spawn(self, queue: BatchReceiver) -> WriterHandle {
        let (signal, waiter) = completion::channel();
        let task = tokio::task::spawn_blocking(move || self.run(queue, signal));
        WriterHandle { waiter, task }
    }

    fn run(mut self, mut queue: BatchReceiver, signal: CompletionSignal) {
        match self.consume(&mut queue) {
            Ok(()) => {
                let report = WriterReport {
                    rows_written: self.cursor.rows_written(),
                    batches: self.batches,
                    sink: self.sink,
                };
                signal.complete(report);
            }
            Err(err) => {
                drop(queue);
                signal.fail(err);
            }
        }
    }

    /// Render batches until the queue is closed and drained, or a row fails
    ///
    /// Must not be called from within an async context.
    pub fn consume(&mut self, queue: &mut BatchReceiver) -> Result<()> {
        self.state = WriterState::Running;
        debug!("Stream writer running");

        while let Some(batch) = queue.blocking_recv() {
            if let Err(err) = self.render_batch(batch) {
                self.state = WriterState::Failed;
                self.tracker.finish();
                debug!(
                    "Stream writer failed after {} rows: {}",
                    self.cursor.rows_written(),
                    err
                );
                return Err(err);
            }
        }

        self.state = WriterState::Completed;
        self.tracker.finish();
        info!(
            "Wrote {} rows from {} batches",
            self.cursor.rows_written(),
            self.batches
        );
        Ok(())
    }

    fn render_batch(&mut self, batch: Batch) -> Result<()> {
        let rows = batch.len();
        for row in &batch {
            self.sink.write_row(self.cursor.position(), row)?;
            self.cursor.advance()?;
        }

        self.batches += 1;
        self.tracker.update(self.cursor.rows_written());
        debug!(
            "Rendered batch #{} ({} rows, next row {})",
            self.batches,
            rows,
            self.cursor.position() + 1
        );
        Ok(())
    }
}

/// Handle to a running [`StreamWriter`]
pub struct WriterHandle {
    waiter: CompletionWaiter,
    task: JoinHandle<()>,
}

impl WriterHandle {
    /// Wait for the writer to reach a terminal state
    ///
    /// Returns only after the writer task itself has finished.
    pub async fn join(self) -> Result<WriterReport> {
        let outcome = self.waiter.wait().await;
        match self.task.await {
            Ok(()) => outcome,
            Err(e) => Err(SheetError::Pipeline(format!("writer task aborted: {e}"))),
        }
    }
}
