// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel arena of ports and port sets indexed by stable identity
//! OWNERS: @kernel-ipc-team
//! DEPENDS_ON: port::{Port, PortSet}, rights (counter bookkeeping)
//! INVARIANTS:
//!   - Ids are never reused
//!   - A port is removed only when dead and no counted right references it
//!   - Lock order: port set -> arena map -> port queue

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::RwLock;

use crate::config::KernelConfig;
use crate::error::{IpcError, Result};
use crate::ipc::Message;
use crate::notify::{self, DeadNameRequest, NOTIFY_DEAD_NAME};
use crate::port::{Bounced, Port, PortSet, PortStatus};
use crate::rights::{PortSetRight, ReceiveRight};
use crate::types::{PortId, PortSetId, TaskId};
use crate::wait::{Deadline, Wait};

/// Every port and port set known to one kernel instance.
#[derive(Debug)]
pub(crate) struct PortSpace {
    ports: RwLock<HashMap<PortId, Arc<Port>>>,
    sets: RwLock<HashMap<PortSetId, Arc<PortSet>>>,
    next_port: AtomicU64,
    next_set: AtomicU64,
    default_limit: usize,
}

impl PortSpace {
    pub(crate) fn new(config: &KernelConfig) -> Self {
        Self {
            ports: RwLock::new(HashMap::new()),
            sets: RwLock::new(HashMap::new()),
            next_port: AtomicU64::new(1),
            next_set: AtomicU64::new(1),
            default_limit: config.default_queue_limit,
        }
    }

    /// Creates a live port and returns its single Receive right.
    pub(crate) fn create_port(&self, receiver: TaskId) -> ReceiveRight {
        let id = PortId::from_raw(self.next_port.fetch_add(1, Ordering::Relaxed));
        let port = Arc::new(Port::new(id, self.default_limit, receiver));
        self.ports.write().insert(id, port);
        debug!(target: "port", "{id} created for {receiver}");
        ReceiveRight::new(id)
    }

    pub(crate) fn create_port_set(&self) -> PortSetRight {
        let id = PortSetId::from_raw(self.next_set.fetch_add(1, Ordering::Relaxed));
        self.sets.write().insert(id, Arc::new(PortSet::new(id)));
        debug!(target: "port", "{id} created");
        PortSetRight::new(id)
    }

    pub(crate) fn port(&self, id: PortId) -> Option<Arc<Port>> {
        self.ports.read().get(&id).cloned()
    }

    fn set(&self, id: PortSetId) -> Option<Arc<PortSet>> {
        self.sets.read().get(&id).cloned()
    }

    pub(crate) fn is_alive(&self, id: PortId) -> bool {
        self.port(id).is_some_and(|port| port.is_alive())
    }

    /// Ports still present in the arena (live or awaiting collection).
    pub(crate) fn port_count(&self) -> usize {
        self.ports.read().len()
    }

    pub(crate) fn status(&self, id: PortId) -> Result<PortStatus> {
        Ok(self.port(id).ok_or(IpcError::PortDead)?.status())
    }

    /// Kills a port: wakes waiters, drops queued messages and fires notifications.
    ///
    /// Returns `false` if the port was already dead.
    pub(crate) fn kill(&self, id: PortId) -> bool {
        let Some(port) = self.port(id) else {
            return false;
        };
        let Some(death) = port.mark_dead() else {
            return false;
        };
        debug!(
            target: "port",
            "{id} died ({} queued, {} watchers)",
            death.drained.len(),
            death.notify.len()
        );
        if let Some(set) = death.set.and_then(|set| self.set(set)) {
            set.remove(id);
        }
        for message in death.drained {
            self.release_message(message);
        }
        for request in death.notify {
            self.fire_dead_name(id, request);
        }
        for watched in death.watching {
            self.cancel_dead_names(watched, id);
        }
        self.collect_if_garbage(id);
        true
    }

    pub(crate) fn drop_send(&self, id: PortId) {
        if let Some(port) = self.port(id) {
            port.release_send();
            self.collect_if_garbage(id);
        }
    }

    pub(crate) fn drop_send_once(&self, id: PortId) {
        if let Some(port) = self.port(id) {
            port.release_send_once();
            self.collect_if_garbage(id);
        }
    }

    fn collect_if_garbage(&self, id: PortId) {
        let mut ports = self.ports.write();
        if ports.get(&id).is_some_and(|port| port.is_garbage()) {
            ports.remove(&id);
            trace!(target: "port", "{id} collected");
        }
    }

    /// Releases every right a message still carries.
    pub(crate) fn release_message(&self, message: Message) {
        let Message { reply, rights, .. } = message;
        for carried in reply.into_iter().chain(rights) {
            self.release_carried(carried);
        }
    }

    /// Enqueues on `id` and wakes set receivers.
    pub(crate) fn deliver(
        &self,
        id: PortId,
        message: Message,
        wait: Wait,
    ) -> core::result::Result<(), Bounced> {
        let Some(port) = self.port(id) else {
            return Err(Bounced { error: IpcError::PortDead, message });
        };
        if let Some(set) = port.enqueue(message, wait)?.and_then(|set| self.set(set)) {
            set.signal();
        }
        Ok(())
    }

    /// Current receiver epoch; read it while the Receive right is held.
    pub(crate) fn receiver_epoch(&self, id: PortId) -> Result<u64> {
        Ok(self.port(id).ok_or(IpcError::PortDead)?.receiver_epoch())
    }

    pub(crate) fn dequeue(&self, id: PortId, epoch: u64, wait: Wait) -> Result<Message> {
        self.port(id).ok_or(IpcError::PortDead)?.dequeue(epoch, wait)
    }

    /// Dequeues from the next ready member of a set, rotating between members.
    pub(crate) fn dequeue_set(&self, id: PortSetId, wait: Wait) -> Result<(PortId, Message)> {
        let set = self.set(id).ok_or(IpcError::PortDead)?;
        let deadline = wait.deadline();
        let mut state = set.lock();
        loop {
            if !state.alive {
                return Err(IpcError::PortDead);
            }
            let count = state.members.len();
            for step in 0..count {
                let index = (state.cursor + step) % count;
                let member = state.members[index];
                if let Some(message) = self.port(member).and_then(|port| port.try_dequeue()) {
                    state.cursor = (index + 1) % count;
                    return Ok((member, message));
                }
            }
            match deadline {
                Deadline::Now => return Err(IpcError::WouldBlock),
                Deadline::Never => set.condvar().wait(&mut state),
                Deadline::At(at) => {
                    if deadline.expired() {
                        return Err(IpcError::Timeout);
                    }
                    set.condvar().wait_until(&mut state, at);
                }
            }
        }
    }

    /// Adds a port to a set; fails if it already belongs to another one.
    pub(crate) fn add_to_set(&self, set: PortSetId, id: PortId) -> Result<()> {
        let set = self.set(set).ok_or(IpcError::InvalidName)?;
        let port = self.port(id).ok_or(IpcError::PortDead)?;
        let mut state = set.lock();
        if !state.alive {
            return Err(IpcError::InvalidName);
        }
        port.join_set(set.id())?;
        if !state.members.contains(&id) {
            state.members.push(id);
        }
        if port.has_messages() {
            set.condvar().notify_all();
        }
        Ok(())
    }

    pub(crate) fn remove_from_set(&self, set: PortSetId, id: PortId) -> Result<()> {
        let set = self.set(set).ok_or(IpcError::InvalidName)?;
        let port = self.port(id).ok_or(IpcError::PortDead)?;
        if !set.remove(id) {
            return Err(IpcError::PreconditionViolation("port is not a member of this set"));
        }
        port.leave_set();
        Ok(())
    }

    pub(crate) fn destroy_set(&self, id: PortSetId) {
        let Some(set) = self.sets.write().remove(&id) else {
            return;
        };
        for member in set.shut_down() {
            if let Some(port) = self.port(member) {
                port.leave_set();
            }
        }
        debug!(target: "port", "{id} destroyed");
    }

    /// Clears the receiver while a Receive right travels; returns the set it left.
    pub(crate) fn detach_receiver(&self, id: PortId) -> Option<PortSetId> {
        let port = self.port(id)?;
        port.detach_receiver();
        let set = port.leave_set()?;
        if let Some(pset) = self.set(set) {
            pset.remove(id);
        }
        Some(set)
    }

    /// Installs a new receiver, optionally restoring set membership.
    pub(crate) fn attach_receiver(&self, id: PortId, receiver: TaskId, set: Option<PortSetId>) {
        let Some(port) = self.port(id) else {
            return;
        };
        port.attach_receiver(receiver);
        if let Some(set) = set {
            if let Err(err) = self.add_to_set(set, id) {
                debug!(target: "port", "{id} could not rejoin {set}: {err}");
            }
        }
    }

    pub(crate) fn set_queue_limit(&self, id: PortId, limit: usize) -> Result<()> {
        self.port(id).ok_or(IpcError::PortDead)?.set_limit(limit);
        Ok(())
    }

    /// Arms a dead-name request, firing it at once if the port is already gone.
    ///
    /// The notify port records the watched port so its death cancels the request.
    pub(crate) fn request_dead_name(&self, id: PortId, request: DeadNameRequest) {
        let target = request.notify.port();
        let Some(notify_port) = self.port(target).filter(|port| port.watch(id)) else {
            self.consume(request.notify);
            return;
        };
        let pending = match self.port(id) {
            Some(port) => port.add_notification(request),
            None => Err(request),
        };
        match pending {
            Err(request) => self.fire_dead_name(id, request),
            // The notify port may have died between watch and add.
            Ok(()) if !notify_port.is_alive() => self.cancel_dead_names(id, target),
            Ok(()) => {}
        }
    }

    /// Drops the requests on `watched` that would notify the dead port `target`.
    fn cancel_dead_names(&self, watched: PortId, target: PortId) {
        let Some(port) = self.port(watched) else {
            return;
        };
        let cancelled = port.cancel_notifications(target);
        if !cancelled.is_empty() {
            trace!(target: "port", "{} dead-name requests on {watched} cancelled", cancelled.len());
        }
        for request in cancelled {
            self.consume(request.notify);
        }
    }

    fn fire_dead_name(&self, watched: PortId, request: DeadNameRequest) {
        let DeadNameRequest { name, notify } = request;
        let target = notify.port();
        if let Some(port) = self.port(target) {
            port.unwatch(watched);
        }
        let message = Message::notification(NOTIFY_DEAD_NAME, notify::encode(name));
        match self.port(target).map(|port| port.push_notification(message)) {
            Some(Ok(set)) => {
                if let Some(set) = set.and_then(|set| self.set(set)) {
                    set.signal();
                }
                trace!(target: "port", "dead-name notification for {name} sent to {target}");
            }
            Some(Err(message)) => self.release_message(message),
            None => {}
        }
        self.consume(notify);
    }
}
