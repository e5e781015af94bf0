// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Message transfer protocol (send/receive through capability names)
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: OutgoingMessage, ReceivedMessage, Task::send(), Task::receive()
//! DEPENDS_ON: rights (staging), space (delivery), cap (name resolution)
//! INVARIANTS:
//!   - Wrong right kinds and unknown names fail before any blocking
//!   - A send either queues every staged right or restores the sender's table
//!   - A receive either binds every carried right or binds none of them
//!   - The capability table lock is never held while blocking on a queue

pub mod header;

use log::{trace, warn};

use crate::cap::CapTable;
use crate::error::{IpcError, Result};
use crate::port::Bounced;
use crate::rights::{Carried, Disposition, Origin, Right, SendOnceRight, Staged};
use crate::space::PortSpace;
use crate::task::Task;
use crate::types::{Name, PortId, PortSetId, TaskId};
use crate::wait::Wait;

use header::{HeaderBits, MessageHeader};

/// Message as it sits in a port queue.
#[derive(Debug)]
pub(crate) struct Message {
    pub(crate) header: MessageHeader,
    pub(crate) body: Vec<u8>,
    pub(crate) reply: Option<Carried>,
    pub(crate) rights: Vec<Carried>,
}

impl Message {
    /// Kernel-originated message without rights.
    pub(crate) fn notification(id: i32, body: Vec<u8>) -> Self {
        let header = MessageHeader::new(
            HeaderBits::empty(),
            Disposition::Move.code(),
            0,
            len_u32(body.len()),
            id,
            0,
        );
        Self { header, body, reply: None, rights: Vec::new() }
    }
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Message to be sent through a Send or send-once name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub destination: Name,
    /// Operation code chosen by the sender.
    pub id: i32,
    pub body: Vec<u8>,
    /// Rights to attach, each with its transfer mode.
    pub rights: Vec<(Name, Disposition)>,
    pub reply: Option<(Name, Disposition)>,
}

impl OutgoingMessage {
    pub fn new(destination: Name) -> Self {
        Self { destination, id: 0, body: Vec::new(), rights: Vec::new(), reply: None }
    }

    pub fn with_id(mut self, id: i32) -> Self {
        self.id = id;
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Attaches the right named `name`, transferred per `disposition`.
    pub fn attach(mut self, name: Name, disposition: Disposition) -> Self {
        self.rights.push((name, disposition));
        self
    }

    /// Asks for a one-shot reply on the port whose Receive right is `receive`.
    pub fn reply_to(self, receive: Name) -> Self {
        self.reply_with(receive, Disposition::MakeSendOnce)
    }

    pub fn reply_with(mut self, name: Name, disposition: Disposition) -> Self {
        self.reply = Some((name, disposition));
        self
    }
}

/// Message handed to a receiver, with every right bound to a fresh name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub header: MessageHeader,
    pub id: i32,
    /// Receive name of the port the message arrived on (`Name::NULL` for a set
    /// member that was moved out of the caller's table after the dequeue).
    pub local: Name,
    pub body: Vec<u8>,
    /// Reply right, if the sender attached one.
    pub reply: Option<Name>,
    /// Attached rights in attachment order.
    pub rights: Vec<Name>,
}

enum Source {
    /// Port plus the receiver epoch seen under the table lock.
    Port(PortId, u64),
    Set(PortSetId),
}

struct Prepared {
    target: PortId,
    once: Option<SendOnceRight>,
    reply: Option<Staged>,
    rights: Vec<Staged>,
}

impl Task {
    /// Sends `message`, blocking per `wait` while the destination queue is full.
    pub fn send(&self, message: OutgoingMessage, wait: Wait) -> Result<()> {
        let config = self.kernel().config();
        if message.body.len() > config.max_inline_bytes
            || message.rights.len() > config.max_rights_per_message
        {
            return Err(IpcError::MessageTooLarge);
        }
        let space = self.space();
        let owner = self.id();
        let OutgoingMessage { destination, id, body, rights, reply } = message;

        let prepared = {
            let mut table = self.caps()?;
            prepare(space, &mut table, owner, destination, reply, &rights)?
        };
        let Prepared { target, once, reply: staged_reply, rights: staged } = prepared;

        let mut bits = HeaderBits::empty();
        if !staged.is_empty() {
            bits |= HeaderBits::COMPLEX;
        }
        let local = match (&staged_reply, reply) {
            (Some(_), Some((_, disposition))) => {
                bits |= HeaderBits::REPLY;
                disposition.code()
            }
            _ => 0,
        };
        let remote = if once.is_some() { Disposition::Move } else { Disposition::Copy };
        let count = u16::try_from(staged.len()).map_err(|_| IpcError::MessageTooLarge)?;
        let header = MessageHeader::new(bits, remote.code(), local, len_u32(body.len()), id, count);

        let reply_origin = staged_reply.as_ref().map(|staged| staged.origin);
        let (carried, origins): (Vec<Carried>, Vec<Origin>) =
            staged.into_iter().map(|staged| (staged.carried, staged.origin)).unzip();
        let message =
            Message { header, body, reply: staged_reply.map(|staged| staged.carried), rights: carried };

        match space.deliver(target, message, wait) {
            Ok(()) => {
                if let Ok(mut table) = self.caps() {
                    for origin in reply_origin.into_iter().chain(origins) {
                        space.commit_transfer(&mut table, origin);
                    }
                    if once.is_some() {
                        table.finish_transit(destination);
                    }
                }
                if let Some(once) = once {
                    space.consume(once);
                }
                trace!(target: "ipc", "{owner} sent id {id} to {target} via {destination}");
                Ok(())
            }
            Err(Bounced { error, message }) => {
                let Message { reply: bounced_reply, rights: bounced, .. } = message;
                match self.caps() {
                    Ok(mut table) => {
                        for (carried, origin) in bounced.into_iter().zip(origins) {
                            space.rollback_transfer(&mut table, Staged { carried, origin }, owner);
                        }
                        match (bounced_reply, reply_origin) {
                            (Some(carried), Some(origin)) => {
                                space.rollback_transfer(&mut table, Staged { carried, origin }, owner)
                            }
                            (Some(carried), None) => space.release_carried(carried),
                            _ => {}
                        }
                        if let Some(once) = once {
                            if let Err(right) =
                                table.abort_transit(destination, Right::SendOnce(once))
                            {
                                space.release(right);
                            }
                        }
                        if error == IpcError::PortDead {
                            // The destination converts to a dead name; failure here is moot.
                            let _ = space.reconcile(&mut table, destination);
                        }
                    }
                    Err(_) => {
                        for carried in bounced_reply.into_iter().chain(bounced) {
                            space.release_carried(carried);
                        }
                        if let Some(once) = once {
                            space.release(Right::SendOnce(once));
                        }
                    }
                }
                Err(error)
            }
        }
    }

    /// Receives one message on a Receive or port-set name.
    pub fn receive(&self, on: Name, wait: Wait) -> Result<ReceivedMessage> {
        let space = self.space();
        let owner = self.id();
        let source = match self.caps()?.lookup(on)? {
            Right::Receive(receive) => {
                Source::Port(receive.port(), space.receiver_epoch(receive.port())?)
            }
            Right::PortSet(set) => Source::Set(set.set()),
            _ => {
                return Err(IpcError::PreconditionViolation(
                    "receive requires a receive or port-set right",
                ))
            }
        };
        let (port, message) = match source {
            Source::Port(id, epoch) => (id, space.dequeue(id, epoch, wait)?),
            Source::Set(id) => space.dequeue_set(id, wait)?,
        };

        let mut table = match self.caps() {
            Ok(table) => table,
            Err(err) => {
                space.release_message(message);
                return Err(err);
            }
        };
        let needed = message.rights.len() + usize::from(message.reply.is_some());
        if table.free_slots() < needed {
            warn!(
                target: "ipc",
                "{owner}: dropping message id {} on {port}, {needed} names needed",
                message.header.id
            );
            space.release_message(message);
            return Err(IpcError::NoSpace);
        }

        let Message { header, body, reply, rights } = message;
        let has_reply = reply.is_some();
        let mut names = materialize_all(space, &mut table, owner, reply.into_iter().chain(rights))?;
        let reply = if has_reply { Some(names.remove(0)) } else { None };
        let local = table.find_receive(port).unwrap_or(Name::NULL);
        trace!(target: "ipc", "{owner} received id {} on {local}", header.id);
        Ok(ReceivedMessage { header, id: header.id, local, body, reply, rights: names })
    }
}

/// Resolves the destination and stages every attached right under the table lock.
fn prepare(
    space: &PortSpace,
    table: &mut CapTable,
    owner: TaskId,
    destination: Name,
    reply: Option<(Name, Disposition)>,
    rights: &[(Name, Disposition)],
) -> Result<Prepared> {
    space.reconcile(table, destination)?;
    let (target, is_once) = match table.lookup(destination)? {
        Right::Send(send) => (send.port(), false),
        Right::SendOnce(once) => (once.port(), true),
        Right::DeadName(_) => return Err(IpcError::PortDead),
        Right::Receive(_) | Right::PortSet(_) => {
            return Err(IpcError::PreconditionViolation(
                "destination must be a send or send-once right",
            ))
        }
    };
    let once = if is_once {
        match table.begin_transit(destination)? {
            Right::SendOnce(once) => Some(once),
            other => {
                if let Err(right) = table.abort_transit(destination, other) {
                    space.release(right);
                }
                return Err(IpcError::InvalidName);
            }
        }
    } else {
        None
    };

    match stage_all(space, table, owner, target, reply, rights) {
        Ok((reply, rights)) => Ok(Prepared { target, once, reply, rights }),
        Err(err) => {
            if let Some(once) = once {
                if let Err(right) = table.abort_transit(destination, Right::SendOnce(once)) {
                    space.release(right);
                }
            }
            Err(err)
        }
    }
}

fn stage_all(
    space: &PortSpace,
    table: &mut CapTable,
    owner: TaskId,
    target: PortId,
    reply: Option<(Name, Disposition)>,
    rights: &[(Name, Disposition)],
) -> Result<(Option<Staged>, Vec<Staged>)> {
    let mut staged_reply = None;
    let mut staged = Vec::with_capacity(rights.len());
    let mut failure = None;

    if let Some((name, disposition)) = reply {
        match space.transfer_into_message(table, name, disposition) {
            Ok(right) if matches!(right.carried, Carried::Receive(_)) => {
                space.rollback_transfer(table, right, owner);
                failure = Some(IpcError::PreconditionViolation(
                    "reply must be a send or send-once right",
                ));
            }
            Ok(right) => staged_reply = Some(right),
            Err(err) => failure = Some(err),
        }
    }
    if failure.is_none() {
        for &(name, disposition) in rights {
            match space.transfer_into_message(table, name, disposition) {
                Ok(right) => staged.push(right),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
    }
    let into_own_port = staged
        .iter()
        .any(|right| matches!(&right.carried, Carried::Receive(receive) if receive.port() == target));
    if failure.is_none() && into_own_port {
        failure = Some(IpcError::PreconditionViolation(
            "a receive right cannot be sent to its own port",
        ));
    }

    if let Some(err) = failure {
        for right in staged.into_iter().rev() {
            space.rollback_transfer(table, right, owner);
        }
        if let Some(right) = staged_reply {
            space.rollback_transfer(table, right, owner);
        }
        return Err(err);
    }
    Ok((staged_reply, staged))
}

/// Binds carried rights to fresh names; on failure unbinds what was bound.
fn materialize_all(
    space: &PortSpace,
    table: &mut CapTable,
    owner: TaskId,
    carried: impl Iterator<Item = Carried>,
) -> Result<Vec<Name>> {
    let mut carried = carried;
    let mut names = Vec::new();
    while let Some(right) = carried.next() {
        match space.materialize_in_recipient(table, right, owner) {
            Ok(name) => names.push(name),
            Err(err) => {
                for rest in carried {
                    space.release_carried(rest);
                }
                for name in names {
                    if let Ok(right) = table.extract(name) {
                        space.release(right);
                    }
                }
                return Err(err);
            }
        }
    }
    Ok(names)
}
