// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Task handle wrapping a private capability table
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests + property tests (tests_prop.rs)
//! PUBLIC API: Task (port/right management, fork/exec/terminate; send/receive live in ipc)
//! DEPENDS_ON: kernel::Kernel, cap::CapTable, rights, space::PortSpace
//! INVARIANTS:
//!   - One mutex serializes every access to a task's table
//!   - fork hands the child fresh reserved entries and nothing else
//!   - exec keeps reserved entries (same serials) and releases everything else
//!   - A terminated task holds no rights

use core::fmt;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::cap::{BindError, CapTable, EntrySerial};
use crate::error::{IpcError, Result};
use crate::kernel::Kernel;
use crate::notify::DeadNameRequest;
use crate::port::PortStatus;
use crate::rights::{Carried, DeadName, Disposition, Origin, Right, RightKind, Staged};
use crate::space::PortSpace;
use crate::types::{Name, PortId, TaskId};

/// Handle to a task; clones share the same capability table.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

struct TaskInner {
    id: TaskId,
    kernel: Kernel,
    caps: Mutex<Option<CapTable>>,
}

impl Drop for TaskInner {
    fn drop(&mut self) {
        if let Some(table) = self.caps.get_mut().take() {
            release_table(self.kernel.space(), table);
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("terminated", &self.inner.caps.lock().is_none())
            .finish()
    }
}

fn release_table(space: &PortSpace, mut table: CapTable) {
    for right in table.drain_where(|_| true) {
        space.release(right);
    }
}

impl Task {
    pub(crate) fn new(id: TaskId, kernel: Kernel, table: CapTable) -> Self {
        Self { inner: Arc::new(TaskInner { id, kernel, caps: Mutex::new(Some(table)) }) }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn kernel(&self) -> &Kernel {
        &self.inner.kernel
    }

    pub(crate) fn space(&self) -> &PortSpace {
        self.inner.kernel.space()
    }

    /// Locks the capability table; fails once the task terminated.
    pub(crate) fn caps(&self) -> Result<MappedMutexGuard<'_, CapTable>> {
        MutexGuard::try_map(self.inner.caps.lock(), Option::as_mut)
            .map_err(|_| IpcError::TaskTerminated)
    }

    /// Binds `right` under a fresh name, handing it back on failure.
    pub(crate) fn bind(&self, right: Right) -> core::result::Result<Name, BindError> {
        match self.caps() {
            Ok(mut table) => table.allocate(right),
            Err(error) => Err(BindError { error, right }),
        }
    }

    fn bind_or_release(&self, table: &mut CapTable, right: Right) -> Result<Name> {
        table.allocate(right).map_err(|refused| {
            self.space().release(refused.right);
            refused.error
        })
    }

    fn receive_port(table: &CapTable, name: Name) -> Result<PortId> {
        match table.lookup(name)? {
            Right::Receive(receive) => Ok(receive.port()),
            _ => Err(IpcError::PreconditionViolation("operation requires a receive right")),
        }
    }

    /// Creates a port and binds its Receive right.
    pub fn allocate_port(&self) -> Result<Name> {
        let mut table = self.caps()?;
        let receive = self.space().create_port(self.id());
        self.bind_or_release(&mut table, Right::Receive(receive))
    }

    /// Creates a port and returns `(receive, send)` names minted at the same instant.
    pub fn create_port(&self) -> Result<(Name, Name)> {
        let space = self.space();
        let mut table = self.caps()?;
        if table.free_slots() < 2 {
            return Err(IpcError::NoSpace);
        }
        let receive = space.create_port(self.id());
        let send = match space.make_send(&receive) {
            Ok(send) => send,
            Err(err) => {
                space.release(Right::Receive(receive));
                return Err(err);
            }
        };
        let receive_name = self.bind_or_release(&mut table, Right::Receive(receive))?;
        let send_name = self.bind_or_release(&mut table, Right::Send(send))?;
        Ok((receive_name, send_name))
    }

    /// Mints a Send right from the Receive right `receive`.
    pub fn make_send(&self, receive: Name) -> Result<Name> {
        let mut table = self.caps()?;
        let send = match table.lookup(receive)? {
            Right::Receive(right) => self.space().make_send(right)?,
            _ => return Err(IpcError::PreconditionViolation("make-send requires a receive right")),
        };
        self.bind_or_release(&mut table, Right::Send(send))
    }

    /// Mints a send-once right from the Receive right `receive`.
    pub fn make_send_once(&self, receive: Name) -> Result<Name> {
        let mut table = self.caps()?;
        let once = match table.lookup(receive)? {
            Right::Receive(right) => self.space().make_send_once(right)?,
            _ => {
                return Err(IpcError::PreconditionViolation(
                    "make-send-once requires a receive right",
                ))
            }
        };
        self.bind_or_release(&mut table, Right::SendOnce(once))
    }

    /// Copies a Send right under a new name.
    ///
    /// Duplicating a right whose port died yields a fresh dead name, not an error.
    pub fn duplicate(&self, name: Name) -> Result<Name> {
        let space = self.space();
        let mut table = self.caps()?;
        space.reconcile(&mut table, name)?;
        let copy = match table.lookup(name)? {
            Right::Send(send) => match space.duplicate(send) {
                Ok(copy) => Right::Send(copy),
                Err(_) => Right::DeadName(DeadName::new(send.port())),
            },
            Right::DeadName(dead) => Right::DeadName(*dead),
            _ => return Err(IpcError::PreconditionViolation("duplicate requires a send right")),
        };
        self.bind_or_release(&mut table, copy)
    }

    /// Unbinds `name` and releases its right.
    ///
    /// Destroying a Receive right kills the port.
    pub fn destroy(&self, name: Name) -> Result<()> {
        let right = self.caps()?.extract(name)?;
        debug!(target: "task", "{} destroyed {name} ({:?})", self.id(), right.kind());
        self.space().release(right);
        Ok(())
    }

    /// Binds a right derived from `source` under the caller-chosen `target` name.
    ///
    /// `Move` renames the entry; the other dispositions mint as they do in messages.
    pub fn insert_right(&self, target: Name, source: Name, disposition: Disposition) -> Result<()> {
        let space = self.space();
        let mut table = self.caps()?;
        if table.lookup(target).is_ok() {
            return Err(IpcError::NameInUse);
        }
        let Staged { carried, origin } =
            space.transfer_into_message(&mut table, source, disposition)?;
        let receive_port = match &carried {
            Carried::Receive(receive) => Some(receive.port()),
            _ => None,
        };
        match table.insert(target, carried.into_right()) {
            Ok(_) => {
                space.commit_transfer(&mut table, origin);
                if let Some(port) = receive_port {
                    let set = match origin {
                        Origin::Moved { set, .. } => set,
                        Origin::Minted => None,
                    };
                    space.attach_receiver(port, self.id(), set);
                }
                Ok(())
            }
            Err(BindError { error, right }) => {
                match Carried::from_right(right) {
                    Ok(carried) => {
                        space.rollback_transfer(&mut table, Staged { carried, origin }, self.id())
                    }
                    Err(right) => space.release(right),
                }
                Err(error)
            }
        }
    }

    /// Access mode of `name`, after converting a right to a dead port.
    pub fn kind(&self, name: Name) -> Result<RightKind> {
        let mut table = self.caps()?;
        self.space().reconcile(&mut table, name)?;
        Ok(table.lookup(name)?.kind())
    }

    /// Returns `true` when both names reference the same port.
    pub fn same_port(&self, a: Name, b: Name) -> Result<bool> {
        let table = self.caps()?;
        let left = table.lookup(a)?.port();
        let right = table.lookup(b)?.port();
        Ok(left.is_some() && left == right)
    }

    /// Serial of the entry bound to `name`; identifies one binding instance.
    pub fn right_serial(&self, name: Name) -> Result<EntrySerial> {
        self.caps()?.serial(name)
    }

    /// Bound names in ascending order.
    pub fn names(&self) -> Result<Vec<Name>> {
        Ok(self.caps()?.names().collect())
    }

    pub fn port_status(&self, receive: Name) -> Result<PortStatus> {
        let port = Self::receive_port(&*self.caps()?, receive)?;
        self.space().status(port)
    }

    /// Changes the queue capacity of the port behind `receive`.
    pub fn set_queue_limit(&self, receive: Name, limit: usize) -> Result<()> {
        let max = self.kernel().config().max_queue_limit;
        let port = Self::receive_port(&*self.caps()?, receive)?;
        if limit == 0 || limit > max {
            return Err(IpcError::InvalidValue);
        }
        self.space().set_queue_limit(port, limit)
    }

    pub fn allocate_port_set(&self) -> Result<Name> {
        let mut table = self.caps()?;
        let set = self.space().create_port_set();
        self.bind_or_release(&mut table, Right::PortSet(set))
    }

    /// Adds the port behind `member` (a Receive name) to `set`.
    pub fn port_set_insert(&self, set: Name, member: Name) -> Result<()> {
        let table = self.caps()?;
        let set = match table.lookup(set)? {
            Right::PortSet(set) => set.set(),
            _ => return Err(IpcError::PreconditionViolation("expected a port-set right")),
        };
        let port = Self::receive_port(&table, member)?;
        self.space().add_to_set(set, port)
    }

    pub fn port_set_remove(&self, set: Name, member: Name) -> Result<()> {
        let table = self.caps()?;
        let set = match table.lookup(set)? {
            Right::PortSet(set) => set.set(),
            _ => return Err(IpcError::PreconditionViolation("expected a port-set right")),
        };
        let port = Self::receive_port(&table, member)?;
        self.space().remove_from_set(set, port)
    }

    /// Requests a notification on `notify` (a Receive name) when the port behind
    /// `name` dies. Fires immediately if it is already dead.
    pub fn request_dead_name_notification(&self, name: Name, notify: Name) -> Result<()> {
        let space = self.space();
        let mut table = self.caps()?;
        space.reconcile(&mut table, name)?;
        let watched = match table.lookup(name)? {
            Right::Send(send) => send.port(),
            Right::SendOnce(once) => once.port(),
            Right::DeadName(dead) => dead.port(),
            _ => {
                return Err(IpcError::PreconditionViolation(
                    "dead-name requests require a send, send-once or dead name",
                ))
            }
        };
        let notify = match table.lookup(notify)? {
            Right::Receive(receive) => space.make_send_once(receive)?,
            _ => {
                return Err(IpcError::PreconditionViolation(
                    "notifications are delivered to a receive right",
                ))
            }
        };
        drop(table);
        space.request_dead_name(watched, DeadNameRequest { name, notify });
        Ok(())
    }

    /// Process duplication: the child gets fresh reserved entries only.
    pub fn fork(&self) -> Result<Task> {
        self.caps()?;
        let child = self.kernel().create_task()?;
        info!(target: "task", "{} forked into {}", self.id(), child.id());
        Ok(child)
    }

    /// Process-image replacement: releases every non-reserved name.
    pub fn exec(&self) -> Result<()> {
        let released = self.caps()?.drain_where(|name| !name.is_reserved());
        let count = released.len();
        for right in released {
            self.space().release(right);
        }
        info!(target: "task", "{} exec released {count} rights", self.id());
        Ok(())
    }

    /// Releases every right; later operations fail with `TaskTerminated`.
    pub fn terminate(&self) {
        let table = self.inner.caps.lock().take();
        if let Some(table) = table {
            release_table(self.space(), table);
            info!(target: "task", "{} terminated", self.id());
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.caps.lock().is_none()
    }
}

/// Mints a Send right from `owner`'s Receive right and binds it in `to`.
#[cfg(test)]
pub(crate) fn grant_send(owner: &Task, receive: Name, to: &Task) -> Name {
    let send = {
        let table = owner.caps().unwrap();
        match table.lookup(receive).unwrap() {
            Right::Receive(right) => owner.space().make_send(right).unwrap(),
            other => panic!("expected a receive right, found {other:?}"),
        }
    };
    to.bind(Right::Send(send)).unwrap()
}

#[cfg(test)]
mod tests_prop;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::ipc::OutgoingMessage;
    use crate::notify::{parse_dead_name_notification, NOTIFY_DEAD_NAME};
    use crate::wait::Wait;
    use std::time::Duration;

    fn kernel() -> Kernel {
        Kernel::boot(KernelConfig::default()).unwrap()
    }

    #[test]
    fn create_port_mints_receive_and_send() {
        let task = kernel().create_task().unwrap();
        let (receive, send) = task.create_port().unwrap();
        assert_eq!(task.kind(receive).unwrap(), RightKind::Receive);
        assert_eq!(task.kind(send).unwrap(), RightKind::Send);
        assert!(task.same_port(receive, send).unwrap());
        assert_eq!(task.port_status(receive).unwrap().send_rights, 1);
    }

    #[test]
    fn destroying_receive_turns_sends_into_dead_names() {
        let task = kernel().create_task().unwrap();
        let (receive, send) = task.create_port().unwrap();
        task.destroy(receive).unwrap();
        assert_eq!(task.kind(send).unwrap(), RightKind::DeadName);
        let copy = task.duplicate(send).unwrap();
        assert_eq!(task.kind(copy).unwrap(), RightKind::DeadName);
        assert_eq!(task.kernel().port_count(), 4);
    }

    #[test]
    fn duplicate_rejects_receive_right() {
        let task = kernel().create_task().unwrap();
        let receive = task.allocate_port().unwrap();
        assert!(matches!(task.duplicate(receive), Err(IpcError::PreconditionViolation(_))));
    }

    #[test]
    fn queue_limit_bounds() {
        let task = kernel().create_task().unwrap();
        let receive = task.allocate_port().unwrap();
        assert_eq!(task.set_queue_limit(receive, 0), Err(IpcError::InvalidValue));
        assert_eq!(task.set_queue_limit(receive, 17), Err(IpcError::InvalidValue));
        task.set_queue_limit(receive, 1).unwrap();
        assert_eq!(task.port_status(receive).unwrap().queue_limit, 1);
    }

    #[test]
    fn insert_right_renames_and_mints() {
        let task = kernel().create_task().unwrap();
        let receive = task.allocate_port().unwrap();
        let chosen = Name::from_raw(40);
        task.insert_right(chosen, receive, Disposition::MakeSend).unwrap();
        assert_eq!(task.kind(chosen).unwrap(), RightKind::Send);
        assert_eq!(
            task.insert_right(chosen, receive, Disposition::MakeSend),
            Err(IpcError::NameInUse)
        );

        let moved = Name::from_raw(41);
        task.insert_right(moved, receive, Disposition::Move).unwrap();
        assert_eq!(task.kind(moved).unwrap(), RightKind::Receive);
        assert_eq!(task.kind(receive), Err(IpcError::InvalidName));
        assert!(task.port_status(moved).unwrap().has_receiver);
    }

    #[test]
    fn exec_keeps_reserved_serials() {
        let task = kernel().create_task().unwrap();
        let before = task.right_serial(Name::REGISTRY).unwrap();
        let extra = task.allocate_port().unwrap();
        task.exec().unwrap();
        assert_eq!(task.right_serial(Name::REGISTRY).unwrap(), before);
        assert_eq!(task.kind(extra), Err(IpcError::InvalidName));
        assert_eq!(task.names().unwrap(), Name::RESERVED.to_vec());
    }

    #[test]
    fn fork_reassigns_reserved_entries() {
        let parent = kernel().create_task().unwrap();
        let private = parent.allocate_port().unwrap();
        let child = parent.fork().unwrap();
        assert_eq!(child.kind(Name::REGISTRY).unwrap(), RightKind::Send);
        assert_ne!(
            child.right_serial(Name::REGISTRY).unwrap(),
            parent.right_serial(Name::REGISTRY).unwrap()
        );
        assert_eq!(child.kind(private), Err(IpcError::InvalidName));
        assert_eq!(child.kind(Name::TASK_SELF).unwrap(), RightKind::Receive);
        assert_eq!(child.port_status(Name::TASK_SELF).unwrap().send_rights, 0);
    }

    #[test]
    fn terminate_kills_owned_ports() {
        let kernel = kernel();
        let owner = kernel.create_task().unwrap();
        let peer = kernel.create_task().unwrap();
        let receive = owner.allocate_port().unwrap();
        let send = owner.make_send(receive).unwrap();
        let mailbox = grant_send(&peer, Name::TASK_SELF, &owner);
        let message = OutgoingMessage::new(mailbox).attach(send, Disposition::Move);
        owner.send(message, Wait::NonBlocking).unwrap();
        let delivered = peer.receive(Name::TASK_SELF, Wait::NonBlocking).unwrap();
        owner.terminate();
        assert!(owner.is_terminated());
        assert_eq!(owner.allocate_port(), Err(IpcError::TaskTerminated));
        assert_eq!(peer.kind(delivered.rights[0]).unwrap(), RightKind::DeadName);
    }

    #[test]
    fn dead_name_notification_fires_once() {
        let kernel = kernel();
        let watcher = kernel.create_task().unwrap();
        let (receive, send) = watcher.create_port().unwrap();
        let notify = watcher.allocate_port().unwrap();
        watcher.request_dead_name_notification(send, notify).unwrap();
        watcher.destroy(receive).unwrap();

        let note = watcher.receive(notify, Wait::Timeout(Duration::from_secs(1))).unwrap();
        assert_eq!(note.id, NOTIFY_DEAD_NAME);
        assert_eq!(parse_dead_name_notification(&note), Some(send));
        assert_eq!(watcher.receive(notify, Wait::NonBlocking).unwrap_err(), IpcError::WouldBlock);
    }

    #[test]
    fn dead_name_request_on_dead_port_fires_immediately() {
        let watcher = kernel().create_task().unwrap();
        let (receive, send) = watcher.create_port().unwrap();
        let notify = watcher.allocate_port().unwrap();
        watcher.destroy(receive).unwrap();
        watcher.request_dead_name_notification(send, notify).unwrap();
        let note = watcher.receive(notify, Wait::NonBlocking).unwrap();
        assert_eq!(parse_dead_name_notification(&note), Some(send));
    }
}
