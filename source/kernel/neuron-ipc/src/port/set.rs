// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Port sets: wait on several receive rights at once.

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::types::{PortId, PortSetId};

#[derive(Debug)]
pub(crate) struct SetState {
    pub(crate) members: Vec<PortId>,
    /// Next member to inspect; rotates so no ready port starves the others.
    pub(crate) cursor: usize,
    pub(crate) alive: bool,
}

#[derive(Debug)]
pub(crate) struct PortSet {
    id: PortSetId,
    state: Mutex<SetState>,
    signal: Condvar,
}

impl PortSet {
    pub(crate) fn new(id: PortSetId) -> Self {
        Self {
            id,
            state: Mutex::new(SetState { members: Vec::new(), cursor: 0, alive: true }),
            signal: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> PortSetId {
        self.id
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SetState> {
        self.state.lock()
    }

    pub(crate) fn condvar(&self) -> &Condvar {
        &self.signal
    }

    /// Wakes receivers after a member became readable.
    ///
    /// Taking the lock orders the wake-up after any in-progress scan.
    pub(crate) fn signal(&self) {
        let _state = self.state.lock();
        self.signal.notify_all();
    }

    pub(crate) fn remove(&self, port: PortId) -> bool {
        let mut state = self.state.lock();
        let before = state.members.len();
        state.members.retain(|member| *member != port);
        let removed = state.members.len() != before;
        if removed {
            self.signal.notify_all();
        }
        removed
    }

    /// Marks the set dead and returns its former members.
    pub(crate) fn shut_down(&self) -> Vec<PortId> {
        let mut state = self.state.lock();
        state.alive = false;
        let members = core::mem::take(&mut state.members);
        drop(state);
        self.signal.notify_all();
        members
    }
}
