// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Typed rights and the rules for moving them across task boundaries
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: RightKind, Disposition
//! DEPENDS_ON: space::PortSpace (counters, liveness), cap::CapTable
//! INVARIANTS:
//!   - Right values are not `Clone`: each value accounts for exactly one counter unit
//!   - Only this crate can mint rights; every mint goes through a live-port check
//!   - Copy is valid for Send only; MakeSend/MakeSendOnce require Receive;
//!     Move accepts Receive, Send, SendOnce and dead names
//!   - A right whose port died in transit materializes as a dead name, never an error

use log::debug;

use crate::cap::CapTable;
use crate::error::{IpcError, Result};
use crate::space::PortSpace;
use crate::types::{Name, PortId, PortSetId, TaskId};

/// Exclusive right to dequeue from a port.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "rights must be bound to a name or released"]
pub struct ReceiveRight {
    port: PortId,
}

/// Shared right to enqueue on a port.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "rights must be bound to a name or released"]
pub struct SendRight {
    port: PortId,
}

/// Single-use right to enqueue on a port.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "rights must be bound to a name or released"]
pub struct SendOnceRight {
    port: PortId,
}

/// Right to receive from any member of a port set.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "rights must be bound to a name or released"]
pub struct PortSetRight {
    set: PortSetId,
}

/// Inert placeholder left behind when the referenced port died.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeadName {
    port: PortId,
}

macro_rules! port_right {
    ($ty:ident) => {
        impl $ty {
            #[inline]
            pub(crate) const fn new(port: PortId) -> Self {
                Self { port }
            }

            /// Port referenced by this right.
            #[inline]
            pub const fn port(&self) -> PortId {
                self.port
            }
        }
    };
}

port_right!(ReceiveRight);
port_right!(SendRight);
port_right!(SendOnceRight);
port_right!(DeadName);

impl PortSetRight {
    #[inline]
    pub(crate) const fn new(set: PortSetId) -> Self {
        Self { set }
    }

    /// Port set referenced by this right.
    #[inline]
    pub const fn set(&self) -> PortSetId {
        self.set
    }
}

/// A capability stored under a name in a task's table.
#[derive(Debug, PartialEq, Eq)]
pub enum Right {
    Receive(ReceiveRight),
    Send(SendRight),
    SendOnce(SendOnceRight),
    PortSet(PortSetRight),
    DeadName(DeadName),
}

impl Right {
    /// Returns the access mode of this right.
    pub const fn kind(&self) -> RightKind {
        match self {
            Self::Receive(_) => RightKind::Receive,
            Self::Send(_) => RightKind::Send,
            Self::SendOnce(_) => RightKind::SendOnce,
            Self::PortSet(_) => RightKind::PortSet,
            Self::DeadName(_) => RightKind::DeadName,
        }
    }

    /// Port referenced by this right; `None` for port sets.
    pub const fn port(&self) -> Option<PortId> {
        match self {
            Self::Receive(right) => Some(right.port),
            Self::Send(right) => Some(right.port),
            Self::SendOnce(right) => Some(right.port),
            Self::DeadName(right) => Some(right.port),
            Self::PortSet(_) => None,
        }
    }
}

/// Access mode of a right, as reported to tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RightKind {
    Receive,
    Send,
    SendOnce,
    PortSet,
    DeadName,
}

/// Transfer mode applied to a right embedded in a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Duplicate a Send right; the sender keeps its own.
    Copy,
    /// Hand over the right; the sender's name is invalidated.
    Move,
    /// Mint a new Send right from a held Receive right.
    MakeSend,
    /// Mint a new send-once right from a held Receive right.
    MakeSendOnce,
}

impl Disposition {
    /// Wire code used in message headers (0 means "no right").
    pub const fn code(self) -> u8 {
        match self {
            Self::Copy => 1,
            Self::Move => 2,
            Self::MakeSend => 3,
            Self::MakeSendOnce => 4,
        }
    }

    /// Decodes a header wire code.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Copy),
            2 => Some(Self::Move),
            3 => Some(Self::MakeSend),
            4 => Some(Self::MakeSendOnce),
            _ => None,
        }
    }
}

/// A right travelling inside a message.
#[derive(Debug)]
pub(crate) enum Carried {
    Receive(ReceiveRight),
    Send(SendRight),
    SendOnce(SendOnceRight),
    Dead(DeadName),
}

impl Carried {
    pub(crate) const fn port(&self) -> PortId {
        match self {
            Self::Receive(right) => right.port,
            Self::Send(right) => right.port,
            Self::SendOnce(right) => right.port,
            Self::Dead(right) => right.port,
        }
    }

    pub(crate) fn into_right(self) -> Right {
        match self {
            Self::Receive(right) => Right::Receive(right),
            Self::Send(right) => Right::Send(right),
            Self::SendOnce(right) => Right::SendOnce(right),
            Self::Dead(right) => Right::DeadName(right),
        }
    }

    /// Converts a table right back for travel; port sets never travel.
    pub(crate) fn from_right(right: Right) -> core::result::Result<Self, Right> {
        match right {
            Right::Receive(right) => Ok(Self::Receive(right)),
            Right::Send(right) => Ok(Self::Send(right)),
            Right::SendOnce(right) => Ok(Self::SendOnce(right)),
            Right::DeadName(right) => Ok(Self::Dead(right)),
            other @ Right::PortSet(_) => Err(other),
        }
    }
}

/// Where a staged right came from, so a failed send can put it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Minted for this message (copy, make-send, make-send-once).
    Minted,
    /// Taken out of the sender's table; the name stays reserved until commit.
    Moved { name: Name, set: Option<PortSetId> },
}

/// A right prepared for a message but not yet committed.
#[derive(Debug)]
pub(crate) struct Staged {
    pub(crate) carried: Carried,
    pub(crate) origin: Origin,
}

impl PortSpace {
    /// Mints a Send right without disturbing the Receive right.
    pub(crate) fn make_send(&self, receive: &ReceiveRight) -> Result<SendRight> {
        self.mint_send(receive.port)
    }

    /// Mints a send-once right from a held Receive right.
    pub(crate) fn make_send_once(&self, receive: &ReceiveRight) -> Result<SendOnceRight> {
        self.mint_send_once(receive.port)
    }

    /// Copies a Send right; fails with `PortDead` once the port is gone.
    pub(crate) fn duplicate(&self, send: &SendRight) -> Result<SendRight> {
        self.mint_send(send.port)
    }

    pub(crate) fn mint_send(&self, port: PortId) -> Result<SendRight> {
        self.port(port).ok_or(IpcError::PortDead)?.retain_send()?;
        Ok(SendRight::new(port))
    }

    pub(crate) fn mint_send_once(&self, port: PortId) -> Result<SendOnceRight> {
        self.port(port).ok_or(IpcError::PortDead)?.retain_send_once()?;
        Ok(SendOnceRight::new(port))
    }

    /// Retires a send-once right after its single use.
    pub(crate) fn consume(&self, once: SendOnceRight) {
        self.drop_send_once(once.port);
    }

    /// Releases a right: decrements counters, kills ports or tears down sets.
    pub(crate) fn release(&self, right: Right) {
        match right {
            Right::Receive(receive) => {
                self.kill(receive.port);
            }
            Right::Send(send) => self.drop_send(send.port),
            Right::SendOnce(once) => self.drop_send_once(once.port),
            Right::PortSet(set) => self.destroy_set(set.set),
            Right::DeadName(_) => {}
        }
    }

    pub(crate) fn release_carried(&self, carried: Carried) {
        self.release(carried.into_right());
    }

    /// Converts a Send/SendOnce entry whose port died into a dead name.
    pub(crate) fn reconcile(&self, table: &mut CapTable, name: Name) -> Result<()> {
        let port = match table.lookup(name)? {
            Right::Send(send) => send.port,
            Right::SendOnce(once) => once.port,
            _ => return Ok(()),
        };
        if self.is_alive(port) {
            return Ok(());
        }
        let stale = table.replace(name, Right::DeadName(DeadName::new(port)))?;
        self.release(stale);
        debug!(target: "cap", "{name} became a dead name ({port})");
        Ok(())
    }

    /// Resolves `name` per `disposition` into a right ready to travel.
    pub(crate) fn transfer_into_message(
        &self,
        table: &mut CapTable,
        name: Name,
        disposition: Disposition,
    ) -> Result<Staged> {
        self.reconcile(table, name)?;
        let carried = match disposition {
            Disposition::Copy => match table.lookup(name)? {
                Right::Send(send) => match self.duplicate(send) {
                    Ok(copy) => Carried::Send(copy),
                    Err(_) => Carried::Dead(DeadName::new(send.port)),
                },
                Right::DeadName(dead) => Carried::Dead(*dead),
                _ => return Err(IpcError::PreconditionViolation("copy requires a send right")),
            },
            Disposition::MakeSend => match table.lookup(name)? {
                Right::Receive(receive) => Carried::Send(self.make_send(receive)?),
                _ => {
                    return Err(IpcError::PreconditionViolation(
                        "make-send requires a receive right",
                    ))
                }
            },
            Disposition::MakeSendOnce => match table.lookup(name)? {
                Right::Receive(receive) => Carried::SendOnce(self.make_send_once(receive)?),
                _ => {
                    return Err(IpcError::PreconditionViolation(
                        "make-send-once requires a receive right",
                    ))
                }
            },
            Disposition::Move => return self.stage_move(table, name),
        };
        Ok(Staged { carried, origin: Origin::Minted })
    }

    fn stage_move(&self, table: &mut CapTable, name: Name) -> Result<Staged> {
        let right = table.begin_transit(name)?;
        let mut set = None;
        let carried = match right {
            Right::Receive(receive) => {
                set = self.detach_receiver(receive.port);
                Carried::Receive(receive)
            }
            Right::Send(send) => Carried::Send(send),
            Right::SendOnce(once) => Carried::SendOnce(once),
            Right::DeadName(dead) => Carried::Dead(dead),
            Right::PortSet(pset) => {
                if let Err(right) = table.abort_transit(name, Right::PortSet(pset)) {
                    self.release(right);
                }
                return Err(IpcError::PreconditionViolation("port-set rights cannot be moved"));
            }
        };
        Ok(Staged { carried, origin: Origin::Moved { name, set } })
    }

    /// Finalizes a staged right once its message is queued.
    pub(crate) fn commit_transfer(&self, table: &mut CapTable, origin: Origin) {
        if let Origin::Moved { name, .. } = origin {
            table.finish_transit(name);
        }
    }

    /// Undoes a staged transfer: minted rights are released, moved rights restored.
    pub(crate) fn rollback_transfer(&self, table: &mut CapTable, staged: Staged, owner: TaskId) {
        match staged.origin {
            Origin::Minted => self.release_carried(staged.carried),
            Origin::Moved { name, set } => {
                if let Carried::Receive(receive) = &staged.carried {
                    self.attach_receiver(receive.port, owner, set);
                }
                if let Err(right) = table.abort_transit(name, staged.carried.into_right()) {
                    self.release(right);
                }
            }
        }
    }

    /// Binds a transferred right into the recipient's table under a fresh name.
    pub(crate) fn materialize_in_recipient(
        &self,
        table: &mut CapTable,
        carried: Carried,
        recipient: TaskId,
    ) -> Result<Name> {
        let right = match carried {
            Carried::Receive(receive) => {
                self.attach_receiver(receive.port, recipient, None);
                Right::Receive(receive)
            }
            Carried::Send(send) if !self.is_alive(send.port) => {
                let dead = DeadName::new(send.port);
                self.release(Right::Send(send));
                Right::DeadName(dead)
            }
            Carried::SendOnce(once) if !self.is_alive(once.port) => {
                let dead = DeadName::new(once.port);
                self.release(Right::SendOnce(once));
                Right::DeadName(dead)
            }
            other => other.into_right(),
        };
        table.allocate(right).map_err(|refused| {
            self.release(refused.right);
            refused.error
        })
    }
}
