//! Deferred submissions.
//!
//! Exam results recorded while offline are queued here and submitted when
//! the host signals that connectivity is back (the `exam-result-sync` tag).

pub mod queue;

pub use queue::{DrainReport, PendingSyncItem, SyncQueue, SyncStatus};
