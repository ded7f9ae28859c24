//! Writer completion protocol
//!
//! The stream writer reports its terminal state through two one-shot
//! signals: `done` carrying the [`WriterReport`], and `error` carrying the
//! first render failure. [`CompletionSignal`] is consumed by whichever signal
//! fires, so at most one of them can ever be sent. The waiting side selects
//! over both and takes exactly one.

use tokio::sync::oneshot;

use crate::error::{Result, SheetError};

use super::writers::RowSink;

/// What a successfully completed writer hands back to the coordinator
pub struct WriterReport {
    /// Number of data rows rendered
    pub rows_written: u64,
    /// Number of batches consumed
    pub batches: u64,
    /// The output document, ready to be finalized
    pub sink: Box<dyn RowSink>,
}

impl std::fmt::Debug for WriterReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterReport")
            .field("rows_written", &self.rows_written)
            .field("batches", &self.batches)
            .finish_non_exhaustive()
    }
}

/// Create a linked signal/waiter pair
pub fn channel() -> (CompletionSignal, CompletionWaiter) {
    let (done_tx, done_rx) = oneshot::channel();
    let (error_tx, error_rx) = oneshot::channel();
    (
        CompletionSignal {
            done: done_tx,
            error: error_tx,
        },
        CompletionWaiter {
            done: done_rx,
            error: error_rx,
        },
    )
}

/// Writer side of the protocol
pub struct CompletionSignal {
    done: oneshot::Sender<WriterReport>,
    error: oneshot::Sender<SheetError>,
}

impl CompletionSignal {
    /// Report that the queue closed and every row was rendered
    pub fn complete(self, report: WriterReport) {
        // A dropped waiter means the coordinator is gone; nobody to tell.
        let _ = self.done.send(report);
    }

    /// Report the first fatal render error
    pub fn fail(self, err: SheetError) {
        let _ = self.error.send(err);
    }
}

/// Coordinator side of the protocol
pub struct CompletionWaiter {
    done: oneshot::Receiver<WriterReport>,
    error: oneshot::Receiver<SheetError>,
}

impl CompletionWaiter {
    /// Wait for whichever signal the writer sends
    ///
    /// If the writer goes away without sending either (it panicked), a
    /// [`SheetError::Pipeline`] is returned instead of waiting forever.
    pub async fn wait(self) -> Result<WriterReport> {
        let CompletionWaiter {
            mut done,
            mut error,
        } = self;

        tokio::select! {
            Ok(err) = &mut error => Err(err),
            Ok(report) = &mut done => Ok(report),
            else => Err(SheetError::Pipeline(
                "writer stopped without reporting completion".to_string(),
            )),
        }
    }
}
