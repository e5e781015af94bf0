// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Capability-based port IPC (ports, rights, capability tables, message transfer)
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit + property tests per module, integration tests in `tests/`
//!
//! PUBLIC API:
//!   - Kernel: single authority owning the port arena and special ports
//!   - Task: per-task handle wrapping a private capability table
//!   - Name / RightKind / Disposition: task-local handles and transfer modes
//!   - OutgoingMessage / ReceivedMessage: send/receive payloads
//!   - Wait: blocking policy shared by both ends of a port
//!   - IpcError: error taxonomy for every operation
//!
//! INVARIANTS:
//!   - A port has zero or one Receive right at any instant
//!   - Rights are only minted inside this crate (unforgeable outside it)
//!   - Failed operations leave the caller's table fully rolled back

#![forbid(unsafe_code)]
#![deny(clippy::all)]

mod cap;
pub mod config;
mod error;
pub mod ipc;
mod kernel;
pub mod notify;
mod port;
mod rights;
mod space;
mod task;
mod types;
mod wait;

pub use cap::EntrySerial;
pub use config::{ConfigError, KernelConfig};
pub use error::{IpcError, Result};
pub use ipc::header::{HeaderBits, MessageHeader};
pub use ipc::{OutgoingMessage, ReceivedMessage};
pub use kernel::{Kernel, SpecialPort};
pub use port::PortStatus;
pub use rights::{Disposition, RightKind};
pub use task::Task;
pub use types::{Name, PortId, PortSetId, TaskId};
pub use wait::Wait;
