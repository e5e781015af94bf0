// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Newtypes for task-local names and kernel object identities
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: Name, PortId, PortSetId, TaskId
//! INVARIANTS: Names are only meaningful inside one capability table; ids are never reused

use core::fmt;

/// Task-local handle bound to exactly one right in that task's capability table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(u32);

impl Name {
    /// Never bound; mirrors a null port name.
    pub const NULL: Self = Self(0);
    /// Send right to the name registry's well-known port.
    pub const REGISTRY: Self = Self(1);
    /// Send right to the kernel/host information port.
    pub const HOST: Self = Self(2);
    /// Send right to the debug-control port.
    pub const DEBUG: Self = Self(3);
    /// Receive right to the task's private control port.
    pub const TASK_SELF: Self = Self(4);

    /// Reserved names seeded at task creation and kept across image replacement.
    pub const RESERVED: [Self; 4] = [Self::REGISTRY, Self::HOST, Self::DEBUG, Self::TASK_SELF];

    /// First name handed out by dynamic allocation.
    pub(crate) const FIRST_DYNAMIC: u32 = 8;

    /// Creates a name from its raw value (e.g. decoded from a message body).
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw name value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` for names in the reserved bootstrap range.
    #[inline]
    pub const fn is_reserved(self) -> bool {
        self.0 != 0 && self.0 < Self::FIRST_DYNAMIC
    }

    #[inline]
    pub(crate) const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable identity of a port inside the kernel arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(u64);

impl PortId {
    #[inline]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identity value.
    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port:{}", self.0)
    }
}

/// Stable identity of a port set inside the kernel arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortSetId(u64);

impl PortSetId {
    #[inline]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identity value.
    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PortSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pset:{}", self.0)
    }
}

/// Identity of a task (independent unit of concurrent execution).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u32);

impl TaskId {
    /// The kernel itself; holds special-port receive rights until claimed.
    pub const KERNEL: Self = Self(0);

    #[inline]
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw task identifier.
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task:{}", self.0)
    }
}
