// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Dead-name notifications delivered when a watched port dies
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: NOTIFY_DEAD_NAME, parse_dead_name_notification()
//! INVARIANTS: A request fires at most once; the body is the watcher's name, little-endian

use crate::ipc::ReceivedMessage;
use crate::rights::SendOnceRight;
use crate::types::Name;

/// Message id of a kernel-generated dead-name notification.
pub const NOTIFY_DEAD_NAME: i32 = 0x48;

/// Pending request: tell `notify` when the port behind `name` dies.
#[derive(Debug)]
pub(crate) struct DeadNameRequest {
    pub(crate) name: Name,
    pub(crate) notify: SendOnceRight,
}

pub(crate) fn encode(name: Name) -> Vec<u8> {
    name.raw().to_le_bytes().to_vec()
}

/// Extracts the watched name from a dead-name notification.
///
/// Returns `None` for any other message.
pub fn parse_dead_name_notification(message: &ReceivedMessage) -> Option<Name> {
    if message.id != NOTIFY_DEAD_NAME {
        return None;
    }
    let raw: [u8; 4] = message.body.as_slice().try_into().ok()?;
    Some(Name::from_raw(u32::from_le_bytes(raw)))
}
