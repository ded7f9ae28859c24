//! Export coordinator for orchestrating export operations
//!
//! This module wires the pipeline together: it writes the header, starts the
//! stream writer as its own task, drives the batcher on the calling task and
//! then waits for the writer's single completion signal before persisting
//! the document.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{Result, SheetError};

use super::batcher::{BatchStats, Batcher, ProduceError};
use super::completion::WriterReport;
use super::progress::ProgressTracker;
use super::queue;
use super::source::RowSource;
use super::writer::StreamWriter;
use super::writers::RowSink;

/// Rows per batch unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Batches buffered between producer and writer unless configured otherwise
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Result of an export operation
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    /// Number of data rows written
    pub rows_exported: u64,
    /// Number of batches that went through the queue
    pub batches: u64,
    /// File size in bytes
    pub file_size_bytes: u64,
    /// Time taken, including persisting the document
    pub elapsed: Duration,
}

impl ExportResult {
    /// Average throughput; zero when no measurable time has passed
    pub fn rows_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rows_exported as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for ExportResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Process completed:")?;
        writeln!(f, "Total rows exported: {}", self.rows_exported)?;
        writeln!(f, "Total execution time: {}", format_elapsed(self.elapsed))?;
        write!(f, "Average rows per second: {:.2}", self.rows_per_second())
    }
}

/// Render a duration rounded to whole seconds, e.g. `0s`, `42s`, `1m5s`, `2h0m7s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let mut secs = elapsed.as_secs();
    if elapsed.subsec_millis() >= 500 {
        secs += 1;
    }

    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Coordinator for export operations
///
/// Owns the row source and the output document for the duration of a run.
/// The production side (source + batcher) runs on the task that calls
/// [`ExportCoordinator::execute`]; the stream writer runs on a blocking
/// worker thread.
pub struct ExportCoordinator {
    source: Box<dyn RowSource>,
    sink: Box<dyn RowSink>,
    tracker: ProgressTracker,
    batch_size: usize,
    queue_capacity: usize,
    started: Option<Instant>,
}

impl ExportCoordinator {
    /// Create a new export coordinator
    ///
    /// # Arguments
    /// * `source` - Opened row source; its column set becomes the header
    /// * `sink` - Freshly opened output document
    /// * `tracker` - Progress display, handed to the writer
    pub fn new(source: Box<dyn RowSource>, sink: Box<dyn RowSink>, tracker: ProgressTracker) -> Self {
        Self {
            source,
            sink,
            tracker,
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            started: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Measure elapsed time from `started` instead of from `execute`
    ///
    /// Lets the reported time cover connecting and opening the cursor.
    pub fn with_start_time(mut self, started: Instant) -> Self {
        self.started = Some(started);
        self
    }

    /// Execute the export operation
    ///
    /// 1. Write the header row
    /// 2. Start the stream writer
    /// 3. Drain the source through the batcher into the queue
    /// 4. Release the cursor
    /// 5. Wait for the writer to finish
    /// 6. Persist the document
    ///
    /// The writer has always terminated by the time this returns, whatever
    /// the outcome.
    ///
    /// # Returns
    /// * `Result<ExportResult>` - Export statistics, or the first error reported
    pub async fn execute(self) -> Result<ExportResult> {
        let Self {
            mut source,
            mut sink,
            tracker,
            batch_size,
            queue_capacity,
            started,
        } = self;
        let start_time = started.unwrap_or_else(Instant::now);

        info!(
            "Starting export: {} columns, batch size {}, queue capacity {}",
            source.columns().len(),
            batch_size,
            queue_capacity
        );

        if let Err(e) = sink.write_header(source.columns()) {
            close_source(source.as_mut()).await;
            return Err(e);
        }

        let (tx, rx) = queue::bounded(queue_capacity);
        let writer = StreamWriter::new(sink, tracker).spawn(rx);

        let produced = Batcher::new(batch_size).run(source.as_mut(), tx).await;
        close_source(source.as_mut()).await;

        let written = writer.join().await;
        let report = resolve_outcome(produced, written)?;

        let WriterReport {
            rows_written,
            batches,
            sink,
        } = report;

        debug!("Persisting output document");
        let file_size_bytes = tokio::task::spawn_blocking(move || sink.finalize())
            .await
            .map_err(|e| SheetError::Pipeline(format!("persist task aborted: {e}")))??;

        let elapsed = start_time.elapsed();
        info!(
            "Export completed: {} rows, {} bytes, {} ms",
            rows_written,
            file_size_bytes,
            elapsed.as_millis()
        );

        Ok(ExportResult {
            rows_exported: rows_written,
            batches,
            file_size_bytes,
            elapsed,
        })
    }
}

async fn close_source(source: &mut dyn RowSource) {
    if let Err(e) = source.close().await {
        warn!("Failed to close cursor: {}", e);
    }
}

/// Pick the single outcome of a run from both sides' results
///
/// A render failure that happened before the source failed takes precedence;
/// otherwise the production-side error is reported.
fn resolve_outcome(
    produced: std::result::Result<BatchStats, ProduceError>,
    written: Result<WriterReport>,
) -> Result<WriterReport> {
    match (produced, written) {
        (Ok(stats), Ok(report)) => {
            if stats.rows != report.rows_written {
                return Err(SheetError::Pipeline(format!(
                    "read {} rows but wrote {}",
                    stats.rows, report.rows_written
                )));
            }
            Ok(report)
        }
        (Ok(_), Err(e)) | (Err(ProduceError::ConsumerGone), Err(e)) => Err(e),
        (Err(ProduceError::ConsumerGone), Ok(_)) => Err(SheetError::Pipeline(
            "writer stopped consuming without reporting an error".to_string(),
        )),
        (
            Err(ProduceError::Source {
                consumer_gone: true,
                ..
            }),
            Err(writer_error),
        ) => Err(writer_error),
        (Err(ProduceError::Source { error, .. }), _) => Err(error),
    }
}
