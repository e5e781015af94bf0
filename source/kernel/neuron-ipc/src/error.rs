// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy shared by every IPC operation.

/// Result type returned by IPC operations.
pub type Result<T> = core::result::Result<T, IpcError>;

/// Errors produced by capability tables, rights transfer and port queues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IpcError {
    /// Name is unknown in the calling task's table (or its right is in flight).
    #[error("name does not denote a right in this task")]
    InvalidName,
    /// The port's receiver is gone; the other end will never answer.
    #[error("port is dead")]
    PortDead,
    /// Queue at capacity and the caller asked not to block.
    #[error("port queue is full")]
    QueueFull,
    /// Bounded wait expired before the operation could complete.
    #[error("operation timed out")]
    Timeout,
    /// Nothing to receive and the caller asked not to block.
    #[error("operation would block")]
    WouldBlock,
    /// Caller-chosen name is already bound.
    #[error("name already in use")]
    NameInUse,
    /// Wrong right kind for the operation; a caller programming error.
    #[error("precondition violated: {0}")]
    PreconditionViolation(&'static str),
    /// Capability table has no free slots.
    #[error("capability table is full")]
    NoSpace,
    /// Inline body or attached rights exceed the configured bounds.
    #[error("message exceeds configured limits")]
    MessageTooLarge,
    /// Argument outside its permitted range.
    #[error("invalid argument value")]
    InvalidValue,
    /// The Receive right moved to another holder while the caller was receiving on it.
    #[error("receive right changed hands during the wait")]
    ReceiverChanged,
    /// The task was terminated; its table no longer exists.
    #[error("task has terminated")]
    TaskTerminated,
}

impl IpcError {
    /// Returns `true` for backpressure errors a caller may retry.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::QueueFull | Self::Timeout | Self::WouldBlock)
    }
}
