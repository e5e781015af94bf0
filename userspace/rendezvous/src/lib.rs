// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Name registry library mapping symbolic names to Send rights
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit + property tests, integration tests in `tests/`
//!
//! PUBLIC API:
//!   - protocol: v1 request/response frames
//!   - Registry: the registry task's private map (register/lookup/unregister/prune)
//!   - RegistryClient: blocking client facade over the well-known registry name
//!
//! The registry is an ordinary task reached only through its well-known port;
//! nothing here shares memory with its callers.

#![forbid(unsafe_code)]
#![deny(clippy::all)]

mod client;
pub mod protocol;
mod registry;

pub use client::RegistryClient;
pub use registry::Registry;

use neuron_ipc::IpcError;
use protocol::{DecodeError, Status};

/// Result alias for registry operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors produced by the name registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A live entry already uses the symbolic name.
    #[error("name already registered")]
    NameAlreadyRegistered,
    /// No live entry for the symbolic name.
    #[error("name not found")]
    NotFound,
    /// Symbolic name exceeds the protocol bound.
    #[error("name exceeds {} bytes", protocol::MAX_NAME_LEN)]
    NameTooLong,
    /// Registry reached its configured capacity.
    #[error("registry is full")]
    Full,
    /// Caller could not prove it holds a right to the registered port.
    #[error("caller does not hold the registered port")]
    NotOwner,
    /// Frame or attached rights do not follow the protocol.
    #[error("malformed registry message")]
    Malformed,
    /// Peer speaks an unknown version or opcode.
    #[error("unsupported registry request")]
    Unsupported,
    /// Registry could not complete the request.
    #[error("registry unavailable")]
    Unavailable,
    /// Underlying IPC failure.
    #[error("ipc failure: {0}")]
    Ipc(#[from] IpcError),
}

impl Error {
    /// Maps a response status to the error it reports (`None` for OK).
    pub const fn from_status(status: Status) -> Option<Self> {
        match status {
            Status::Ok => None,
            Status::NotFound => Some(Self::NotFound),
            Status::AlreadyRegistered => Some(Self::NameAlreadyRegistered),
            Status::Malformed => Some(Self::Malformed),
            Status::Full => Some(Self::Full),
            Status::NotOwner => Some(Self::NotOwner),
            Status::Unsupported => Some(Self::Unsupported),
            Status::TooLarge => Some(Self::NameTooLong),
            Status::Unavailable => Some(Self::Unavailable),
        }
    }

    /// Status the registry reports for this error.
    pub const fn status(self) -> Status {
        match self {
            Self::NameAlreadyRegistered => Status::AlreadyRegistered,
            Self::NotFound => Status::NotFound,
            Self::NameTooLong => Status::TooLarge,
            Self::Full => Status::Full,
            Self::NotOwner => Status::NotOwner,
            Self::Malformed => Status::Malformed,
            Self::Unsupported => Status::Unsupported,
            Self::Unavailable | Self::Ipc(_) => Status::Unavailable,
        }
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Malformed => Self::Malformed,
            DecodeError::Unsupported => Self::Unsupported,
            DecodeError::TooLarge => Self::NameTooLong,
        }
    }
}
