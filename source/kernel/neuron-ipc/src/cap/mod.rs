// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-task capability table mapping names to rights
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: EntrySerial
//! DEPENDS_ON: rights::Right
//! INVARIANTS:
//!   - Each bound name maps to exactly one right
//!   - Name 0 is never bound; dynamic allocation starts above the reserved range
//!   - A name whose right is in transit stays unavailable until commit or rollback
//!   - Every binding receives a process-wide unique serial

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::error::IpcError;
use crate::rights::Right;
use crate::types::{Name, PortId};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Identity of one binding of a name; changes whenever the name is rebound.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntrySerial(u64);

impl EntrySerial {
    fn next() -> Self {
        Self(NEXT_SERIAL.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw serial value.
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntrySerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "serial:{}", self.0)
    }
}

#[derive(Debug)]
struct Entry {
    right: Right,
    serial: EntrySerial,
}

#[derive(Debug)]
enum Slot {
    Empty,
    Bound(Entry),
    InTransit(EntrySerial),
}

/// Failed binding; carries the right back so the caller can release it.
#[derive(Debug)]
pub struct BindError {
    pub error: IpcError,
    pub right: Right,
}

/// Per-task capability table.
#[derive(Debug)]
pub struct CapTable {
    slots: Vec<Slot>,
}

impl CapTable {
    /// Creates an empty table sized for `slots` entries.
    pub fn with_capacity(slots: usize) -> Self {
        let mut table = Vec::with_capacity(slots);
        table.resize_with(slots, || Slot::Empty);
        Self { slots: table }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of dynamic slots still available to [`CapTable::allocate`].
    pub fn free_slots(&self) -> usize {
        self.slots
            .iter()
            .skip(Name::FIRST_DYNAMIC as usize)
            .filter(|slot| matches!(slot, Slot::Empty))
            .count()
    }

    /// Binds `right` to the lowest free dynamic name.
    pub fn allocate(&mut self, right: Right) -> Result<Name, BindError> {
        let first = Name::FIRST_DYNAMIC as usize;
        let free = self
            .slots
            .iter()
            .enumerate()
            .skip(first)
            .find_map(|(index, slot)| matches!(slot, Slot::Empty).then_some(index));
        let Some(index) = free else {
            return Err(BindError { error: IpcError::NoSpace, right });
        };
        let Ok(raw) = u32::try_from(index) else {
            return Err(BindError { error: IpcError::NoSpace, right });
        };
        self.slots[index] = Slot::Bound(Entry { right, serial: EntrySerial::next() });
        Ok(Name::from_raw(raw))
    }

    /// Binds `right` to a caller-chosen name.
    pub fn insert(&mut self, name: Name, right: Right) -> Result<EntrySerial, BindError> {
        if name == Name::NULL {
            return Err(BindError { error: IpcError::InvalidName, right });
        }
        let Some(slot) = self.slots.get_mut(name.as_index()) else {
            return Err(BindError { error: IpcError::InvalidName, right });
        };
        if !matches!(slot, Slot::Empty) {
            return Err(BindError { error: IpcError::NameInUse, right });
        }
        let serial = EntrySerial::next();
        *slot = Slot::Bound(Entry { right, serial });
        Ok(serial)
    }

    fn slot_mut_unchecked(&mut self, name: Name) -> &mut Slot {
        &mut self.slots[name.as_index()]
    }

    fn entry(&self, name: Name) -> Result<&Entry, IpcError> {
        match self.slots.get(name.as_index()) {
            Some(Slot::Bound(entry)) if name != Name::NULL => Ok(entry),
            _ => Err(IpcError::InvalidName),
        }
    }

    fn entry_mut(&mut self, name: Name) -> Result<&mut Entry, IpcError> {
        match self.slots.get_mut(name.as_index()) {
            Some(Slot::Bound(entry)) if name != Name::NULL => Ok(entry),
            _ => Err(IpcError::InvalidName),
        }
    }

    /// Returns the right bound to `name`.
    pub fn lookup(&self, name: Name) -> Result<&Right, IpcError> {
        self.entry(name).map(|entry| &entry.right)
    }

    pub fn serial(&self, name: Name) -> Result<EntrySerial, IpcError> {
        self.entry(name).map(|entry| entry.serial)
    }

    /// Unbinds `name`, returning its right.
    pub fn extract(&mut self, name: Name) -> Result<Right, IpcError> {
        self.entry(name)?;
        match core::mem::replace(self.slot_mut_unchecked(name), Slot::Empty) {
            Slot::Bound(entry) => Ok(entry.right),
            // `entry` above proved the slot is bound.
            _ => Err(IpcError::InvalidName),
        }
    }

    /// Swaps the right under `name` in place, keeping the binding's serial.
    pub fn replace(&mut self, name: Name, right: Right) -> Result<Right, IpcError> {
        let entry = self.entry_mut(name)?;
        Ok(core::mem::replace(&mut entry.right, right))
    }

    /// Takes the right out of `name` while keeping the name reserved.
    pub fn begin_transit(&mut self, name: Name) -> Result<Right, IpcError> {
        let serial = self.entry(name)?.serial;
        match core::mem::replace(self.slot_mut_unchecked(name), Slot::InTransit(serial)) {
            Slot::Bound(entry) => Ok(entry.right),
            _ => Err(IpcError::InvalidName),
        }
    }

    /// Frees a name whose right was delivered.
    pub fn finish_transit(&mut self, name: Name) {
        if let Some(slot) = self.slots.get_mut(name.as_index()) {
            if matches!(slot, Slot::InTransit(_)) {
                *slot = Slot::Empty;
            }
        }
    }

    /// Puts a right back under the name it was taken from.
    pub fn abort_transit(&mut self, name: Name, right: Right) -> Result<(), Right> {
        match self.slots.get_mut(name.as_index()) {
            Some(slot) => match *slot {
                Slot::InTransit(serial) => {
                    *slot = Slot::Bound(Entry { right, serial });
                    Ok(())
                }
                _ => Err(right),
            },
            None => Err(right),
        }
    }

    /// Bound names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = Name> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Bound(_) => u32::try_from(index).ok().map(Name::from_raw),
            _ => None,
        })
    }

    /// Name under which this table holds the Receive right for `port`.
    pub fn find_receive(&self, port: PortId) -> Option<Name> {
        self.names().find(|name| {
            matches!(self.lookup(*name), Ok(Right::Receive(receive)) if receive.port() == port)
        })
    }

    /// Unbinds every name selected by `remove`, returning the removed rights.
    ///
    /// Names in transit are forgotten as well; their rights are owned by the sender.
    pub fn drain_where(&mut self, mut remove: impl FnMut(Name) -> bool) -> Vec<Right> {
        let mut removed = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Ok(raw) = u32::try_from(index) else { break };
            if !remove(Name::from_raw(raw)) {
                continue;
            }
            match core::mem::replace(slot, Slot::Empty) {
                Slot::Bound(entry) => removed.push(entry.right),
                Slot::Empty | Slot::InTransit(_) => {}
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests_prop;
