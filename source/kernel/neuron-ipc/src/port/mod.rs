// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Port object with a bounded FIFO queue and blocking enqueue/dequeue
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: PortStatus
//! DEPENDS_ON: ipc::Message, wait::{Wait, Deadline}
//! INVARIANTS:
//!   - Queue mutation and the liveness flag are serialized by one mutex
//!   - mark_dead wakes every waiter and only reports a death once
//!   - Counters only grow while the port is alive (checked under the queue lock)
//!   - Every detach of the receiver bumps the epoch; dequeues from an older epoch fail

mod set;

pub(crate) use set::PortSet;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use log::trace;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{IpcError, Result};
use crate::ipc::Message;
use crate::notify::DeadNameRequest;
use crate::types::{PortId, PortSetId, TaskId};
use crate::wait::{Deadline, Wait};

/// Snapshot of a port's attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortStatus {
    /// Messages currently queued.
    pub queued: usize,
    /// Queue capacity.
    pub queue_limit: usize,
    /// Outstanding Send rights.
    pub send_rights: u32,
    /// Outstanding send-once rights.
    pub send_once_rights: u32,
    pub alive: bool,
    /// `false` while the Receive right is in transit.
    pub has_receiver: bool,
    /// Port set this port currently belongs to.
    pub in_set: Option<PortSetId>,
}

/// Enqueue failure; hands the message back so its rights can be rolled back.
#[derive(Debug)]
pub(crate) struct Bounced {
    pub(crate) error: IpcError,
    pub(crate) message: Message,
}

/// Everything a dying port leaves behind for the arena to clean up.
#[derive(Debug)]
pub(crate) struct Death {
    pub(crate) drained: Vec<Message>,
    pub(crate) notify: Vec<DeadNameRequest>,
    /// Ports holding a dead-name request that targets this one.
    pub(crate) watching: Vec<PortId>,
    pub(crate) set: Option<PortSetId>,
}

#[derive(Debug)]
struct PortState {
    queue: VecDeque<Message>,
    limit: usize,
    receiver: Option<TaskId>,
    epoch: u64,
    alive: bool,
    set: Option<PortSetId>,
    notify: Vec<DeadNameRequest>,
    watching: Vec<PortId>,
}

/// Kernel-owned communication endpoint.
#[derive(Debug)]
pub(crate) struct Port {
    id: PortId,
    state: Mutex<PortState>,
    readable: Condvar,
    writable: Condvar,
    send_rights: AtomicU32,
    send_once_rights: AtomicU32,
}

impl Port {
    pub(crate) fn new(id: PortId, limit: usize, receiver: TaskId) -> Self {
        Self {
            id,
            state: Mutex::new(PortState {
                queue: VecDeque::with_capacity(limit),
                limit,
                receiver: Some(receiver),
                epoch: 0,
                alive: true,
                set: None,
                notify: Vec::new(),
                watching: Vec::new(),
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            send_rights: AtomicU32::new(0),
            send_once_rights: AtomicU32::new(0),
        }
    }

    fn id(&self) -> PortId {
        self.id
    }

    /// Appends `message`, blocking per `wait` while the queue is full.
    ///
    /// Returns the port set to signal, if the port belongs to one.
    pub(crate) fn enqueue(
        &self,
        message: Message,
        wait: Wait,
    ) -> core::result::Result<Option<PortSetId>, Bounced> {
        let deadline = wait.deadline();
        let mut state = self.state.lock();
        loop {
            if !state.alive {
                return Err(Bounced { error: IpcError::PortDead, message });
            }
            if state.queue.len() < state.limit {
                state.queue.push_back(message);
                self.readable.notify_all();
                return Ok(state.set);
            }
            if let Err(error) = self.park(&self.writable, &mut state, deadline, IpcError::QueueFull)
            {
                return Err(Bounced { error, message });
            }
        }
    }

    /// Removes the oldest message, blocking per `wait` while the queue is empty.
    ///
    /// `epoch` is the receiver epoch the caller observed while holding the
    /// Receive right; once the right moves the dequeue fails with `ReceiverChanged`.
    pub(crate) fn dequeue(&self, epoch: u64, wait: Wait) -> Result<Message> {
        let deadline = wait.deadline();
        let mut state = self.state.lock();
        loop {
            if state.epoch != epoch {
                return Err(IpcError::ReceiverChanged);
            }
            if let Some(message) = state.queue.pop_front() {
                self.writable.notify_one();
                return Ok(message);
            }
            if !state.alive {
                return Err(IpcError::PortDead);
            }
            self.park(&self.readable, &mut state, deadline, IpcError::WouldBlock)?;
        }
    }

    /// Pops a message if one is ready; used when scanning port sets.
    pub(crate) fn try_dequeue(&self) -> Option<Message> {
        let mut state = self.state.lock();
        let message = state.queue.pop_front()?;
        self.writable.notify_one();
        Some(message)
    }

    /// Waits on `condvar` until notified or the deadline passes.
    fn park(
        &self,
        condvar: &Condvar,
        state: &mut MutexGuard<'_, PortState>,
        deadline: Deadline,
        not_ready: IpcError,
    ) -> Result<()> {
        match deadline {
            Deadline::Now => Err(not_ready),
            Deadline::Never => {
                condvar.wait(state);
                Ok(())
            }
            Deadline::At(at) => {
                if Instant::now() >= at {
                    return Err(IpcError::Timeout);
                }
                condvar.wait_until(state, at);
                Ok(())
            }
        }
    }

    /// Delivers a kernel notification regardless of the queue limit.
    pub(crate) fn push_notification(
        &self,
        message: Message,
    ) -> core::result::Result<Option<PortSetId>, Message> {
        let mut state = self.state.lock();
        if !state.alive {
            return Err(message);
        }
        state.queue.push_back(message);
        self.readable.notify_all();
        Ok(state.set)
    }

    /// Flips the port to dead and wakes every waiter.
    ///
    /// Returns `None` when the port was already dead.
    pub(crate) fn mark_dead(&self) -> Option<Death> {
        let mut state = self.state.lock();
        if !state.alive {
            return None;
        }
        state.alive = false;
        state.receiver = None;
        let death = Death {
            drained: state.queue.drain(..).collect(),
            notify: core::mem::take(&mut state.notify),
            watching: core::mem::take(&mut state.watching),
            set: state.set.take(),
        };
        drop(state);
        trace!(target: "port", "{} dead, {} queued dropped", self.id(), death.drained.len());
        self.readable.notify_all();
        self.writable.notify_all();
        Some(death)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.state.lock().alive
    }

    pub(crate) fn retain_send(&self) -> Result<()> {
        let state = self.state.lock();
        if !state.alive {
            return Err(IpcError::PortDead);
        }
        self.send_rights.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub(crate) fn retain_send_once(&self) -> Result<()> {
        let state = self.state.lock();
        if !state.alive {
            return Err(IpcError::PortDead);
        }
        self.send_once_rights.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub(crate) fn release_send(&self) {
        Self::saturating_release(&self.send_rights);
    }

    pub(crate) fn release_send_once(&self) {
        Self::saturating_release(&self.send_once_rights);
    }

    fn saturating_release(counter: &AtomicU32) {
        let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
            count.checked_sub(1)
        });
    }

    /// Dead with no counted rights left: safe to drop from the arena.
    pub(crate) fn is_garbage(&self) -> bool {
        let state = self.state.lock();
        !state.alive
            && self.send_rights.load(Ordering::Acquire) == 0
            && self.send_once_rights.load(Ordering::Acquire) == 0
    }

    pub(crate) fn status(&self) -> PortStatus {
        let state = self.state.lock();
        PortStatus {
            queued: state.queue.len(),
            queue_limit: state.limit,
            send_rights: self.send_rights.load(Ordering::Acquire),
            send_once_rights: self.send_once_rights.load(Ordering::Acquire),
            alive: state.alive,
            has_receiver: state.receiver.is_some(),
            in_set: state.set,
        }
    }

    /// Changes the queue capacity; already-queued messages are kept.
    pub(crate) fn set_limit(&self, limit: usize) {
        let mut state = self.state.lock();
        state.limit = limit;
        drop(state);
        self.writable.notify_all();
    }

    pub(crate) fn receiver_epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Clears the receiver and wakes dequeuers still waiting for the old holder.
    pub(crate) fn detach_receiver(&self) {
        let mut state = self.state.lock();
        state.receiver = None;
        state.epoch = state.epoch.wrapping_add(1);
        drop(state);
        self.readable.notify_all();
    }

    pub(crate) fn attach_receiver(&self, receiver: TaskId) {
        self.state.lock().receiver = Some(receiver);
    }

    /// Records membership; a port belongs to at most one set.
    pub(crate) fn join_set(&self, set: PortSetId) -> Result<()> {
        let mut state = self.state.lock();
        if !state.alive {
            return Err(IpcError::PortDead);
        }
        match state.set {
            Some(current) if current == set => Ok(()),
            Some(_) => Err(IpcError::PreconditionViolation("port already belongs to a set")),
            None => {
                state.set = Some(set);
                Ok(())
            }
        }
    }

    pub(crate) fn leave_set(&self) -> Option<PortSetId> {
        self.state.lock().set.take()
    }

    pub(crate) fn has_messages(&self) -> bool {
        !self.state.lock().queue.is_empty()
    }

    /// Registers a dead-name request; hands it back if the port already died.
    pub(crate) fn add_notification(
        &self,
        request: DeadNameRequest,
    ) -> core::result::Result<(), DeadNameRequest> {
        let mut state = self.state.lock();
        if !state.alive {
            return Err(request);
        }
        state.notify.push(request);
        Ok(())
    }

    /// Hands back the pending requests that would notify `target`.
    pub(crate) fn cancel_notifications(&self, target: PortId) -> Vec<DeadNameRequest> {
        let mut state = self.state.lock();
        let (cancelled, kept): (Vec<_>, Vec<_>) = core::mem::take(&mut state.notify)
            .into_iter()
            .partition(|request| request.notify.port() == target);
        state.notify = kept;
        cancelled
    }

    /// Remembers that `watched` holds a request notifying this port.
    ///
    /// Returns `false` if this port is already dead.
    pub(crate) fn watch(&self, watched: PortId) -> bool {
        let mut state = self.state.lock();
        if !state.alive {
            return false;
        }
        if !state.watching.contains(&watched) {
            state.watching.push(watched);
        }
        true
    }

    pub(crate) fn unwatch(&self, watched: PortId) {
        self.state.lock().watching.retain(|id| *id != watched);
    }
}
