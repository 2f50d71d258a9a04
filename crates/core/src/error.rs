//! Error types for the ST 2110 output library.

use crate::provider::ChunkStatus;

/// Errors that can occur in the ST 2110 output library.
///
/// Variants map to the failure modes of the stack:
///
/// - **Configuration**: [`Config`](Self::Config) — the stream cannot be
///   created from the given resolution/format/option combination.
/// - **Allocation**: [`Allocation`](Self::Allocation),
///   [`CopyFailed`](Self::CopyFailed) — frame memory problems.
/// - **Provider**: [`Provider`](Self::Provider) — the chunk provider returned
///   an unrecoverable status. Transient statuses (`NoFreeChunk`, `QueueFull`)
///   are retried internally and never surface here.
/// - **Tracking**: [`OutOfOrderCompletion`](Self::OutOfOrderCompletion) —
///   the completion tracker observed hardware completions out of registration
///   order, which indicates provider or scheduling corruption.
/// - **Lifecycle**: [`NotActive`](Self::NotActive),
///   [`AlreadyRunning`](Self::AlreadyRunning),
///   [`NoFreeFrame`](Self::NoFreeFrame).
#[derive(Debug, thiserror::Error)]
pub enum St2110Error {
    /// Invalid stream configuration (zero frame size, unmappable
    /// resolution/pixel-format combination, payload search failure with
    /// multi-SRD disabled, ...).
    #[error("invalid stream configuration: {0}")]
    Config(String),

    /// Frame buffer allocation failed.
    #[error("frame allocation failed: {0}")]
    Allocation(String),

    /// An asynchronous frame copy reported failure. The owning stream must
    /// stop.
    #[error("frame data copy failed")]
    CopyFailed,

    /// The chunk provider returned an unrecoverable status.
    #[error("chunk provider failure during {operation}: {status:?}")]
    Provider {
        /// The provider call that failed (`next_chunk`, `commit_chunk`, ...).
        operation: &'static str,
        /// The status the provider returned.
        status: ChunkStatus,
    },

    /// The completion tracker saw a completion token out of registration
    /// order.
    #[error("out-of-order chunk completion: expected token {expected}, got {actual}")]
    OutOfOrderCompletion {
        /// Token registered first.
        expected: u64,
        /// Token the provider reported.
        actual: u64,
    },

    /// Operation requires an active stream.
    #[error("stream is not active")]
    NotActive,

    /// [`OutputStream::start`](crate::stream::OutputStream::start) was called
    /// while the worker was already running.
    #[error("stream already running")]
    AlreadyRunning,

    /// No free frame was available and the locking mode does not block.
    #[error("no free frame available")]
    NoFreeFrame,

    /// Underlying I/O error (software provider socket setup).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for `Result<T, St2110Error>`.
pub type Result<T> = std::result::Result<T, St2110Error>;
