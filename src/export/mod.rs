//! Streaming export pipeline
//!
//! Rows flow from a [`RowSource`] through the [`Batcher`] into a bounded
//! transfer queue, and from there to a single [`StreamWriter`] that renders
//! them into the output document:
//!
//! ```text
//! RowSource → Batcher → queue (K batches) → StreamWriter → RowSink
//! ```
//!
//! The queue applies backpressure: when the writer falls behind, the batcher
//! waits, so memory use is bounded by `(K + 2) × batch_size` rows no matter
//! how large the result set is. The [`ExportCoordinator`] owns the lifecycle
//! of a run and reports exactly one outcome.

pub mod batcher;
pub mod completion;
pub mod coordinator;
pub mod progress;
pub mod queue;
pub mod source;
pub mod value;
pub mod writer;
pub mod writers;

pub use batcher::{BatchStats, Batcher, ProduceError};
pub use coordinator::{ExportCoordinator, ExportResult};
pub use progress::ProgressTracker;
pub use queue::{BatchReceiver, BatchSender, QueueError};
pub use source::{PgRowSource, RowSource};
pub use value::{Batch, ColumnSet, Row, Value};
pub use writer::{StreamWriter, WriteCursor, WriterHandle, WriterState};
pub use writers::{RowSink, open_sink};
