//! Error types for the benchmark harness.
//!
//! The taxonomy follows the harness's failure policy: transport establishment
//! is retried and never surfaces here, while anything that goes wrong after a
//! connection is up invalidates the measurement and is fatal for the owning
//! worker.

use std::time::Duration;

use thiserror::Error;

use crate::connection::Role;

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a benchmark session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Invalid transport upgrade handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// The endpoint closed the connection.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// A worker task died; the session cannot continue.
    #[error("{role} worker failed: {detail}")]
    WorkerFailed {
        /// Role of the worker that failed.
        role: Role,
        /// Rendered cause.
        detail: String,
    },

    /// A round's completion count never reached the expected population.
    #[error("round stalled after {received}/{expected} completions (deadline {limit:?})")]
    RoundStalled {
        /// Completion signals consumed before the deadline expired.
        received: usize,
        /// Completion signals the round required.
        expected: usize,
        /// The deadline that expired.
        limit: Duration,
    },

    /// A coordinator wait other than completion collection timed out.
    #[error("stalled waiting for {phase} (deadline {limit:?})")]
    Stalled {
        /// What the coordinator was waiting on.
        phase: &'static str,
        /// The deadline that expired.
        limit: Duration,
    },

    /// A coordination channel closed while the session was still running.
    #[error("coordination channel closed: {0}")]
    ChannelClosed(&'static str),

    /// Rejected configuration, reported before any connection is made.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
