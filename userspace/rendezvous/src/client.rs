// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Client facade speaking the v1 protocol to the registry's well-known port.
//!
//! Every call allocates a private reply port, sends a request carrying a
//! send-once reply right and waits for the answer. The reply port is destroyed
//! before the call returns, so a late answer is discarded by the kernel.

use core::time::Duration;

use log::{debug, warn};
use neuron_ipc::{
    Disposition, IpcError, Name, OutgoingMessage, ReceivedMessage, RightKind, Task, Wait,
};

use crate::protocol::{self, Op, Status};
use crate::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Blocking registry client bound to one task.
#[derive(Debug)]
pub struct RegistryClient<'t> {
    task: &'t Task,
    registry: Name,
    wait: Wait,
}

impl<'t> RegistryClient<'t> {
    /// Client using the task's reserved registry name.
    pub fn new(task: &'t Task) -> Self {
        Self { task, registry: Name::REGISTRY, wait: Wait::Timeout(DEFAULT_TIMEOUT) }
    }

    /// Overrides the Send right used to reach the registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Name) -> Self {
        self.registry = registry;
        self
    }

    /// Overrides how long requests and replies may block.
    #[must_use]
    pub fn with_wait(mut self, wait: Wait) -> Self {
        self.wait = wait;
        self
    }

    /// Registers a Send right minted from the caller's Receive right `receive`.
    pub fn register(&self, service: &str, receive: Name) -> Result<()> {
        self.call(Op::Register, service, Some((receive, Disposition::MakeSend)))?;
        Ok(())
    }

    /// Registers a copy of the caller's Send right `send`.
    pub fn register_send(&self, service: &str, send: Name) -> Result<()> {
        self.call(Op::Register, service, Some((send, Disposition::Copy)))?;
        Ok(())
    }

    /// Resolves `service` to a fresh Send right bound in the caller's table.
    pub fn lookup(&self, service: &str) -> Result<Name> {
        self.call(Op::Lookup, service, None)?.ok_or(Error::Malformed)
    }

    /// Removes `service`; `proof` must name a right to the registered port.
    pub fn unregister(&self, service: &str, proof: Name) -> Result<()> {
        let disposition = match self.task.kind(proof)? {
            RightKind::Receive => Disposition::MakeSend,
            _ => Disposition::Copy,
        };
        self.call(Op::Unregister, service, Some((proof, disposition)))?;
        Ok(())
    }

    fn call(
        &self,
        op: Op,
        service: &str,
        right: Option<(Name, Disposition)>,
    ) -> Result<Option<Name>> {
        let frame = protocol::encode_request(op, service)?;
        let reply_port = self.task.allocate_port()?;
        let outcome = self.exchange(op, frame, right, reply_port);
        if let Err(err) = self.task.destroy(reply_port) {
            debug!(target: "rendezvous", "reply port {reply_port}: {err}");
        }
        outcome
    }

    fn exchange(
        &self,
        op: Op,
        frame: Vec<u8>,
        right: Option<(Name, Disposition)>,
        reply_port: Name,
    ) -> Result<Option<Name>> {
        let mut request =
            OutgoingMessage::new(self.registry).with_id(i32::from(op.code())).with_body(frame);
        if let Some((name, disposition)) = right {
            request = request.attach(name, disposition);
        }
        self.task.send(request.reply_to(reply_port), self.wait).map_err(unreachable_registry)?;
        let response = self.task.receive(reply_port, self.wait)?;
        self.decode(op, response)
    }

    fn decode(&self, op: Op, response: ReceivedMessage) -> Result<Option<Name>> {
        let ReceivedMessage { body, rights, reply, .. } = response;
        let decoded = protocol::decode_response(&body, op);
        let expected = match decoded {
            Ok(Status::Ok) if op == Op::Lookup => 1,
            _ => 0,
        };
        if rights.len() != expected || reply.is_some() {
            warn!(
                target: "rendezvous",
                "{op:?} response carried {} rights, expected {expected}",
                rights.len()
            );
            for name in rights.into_iter().chain(reply) {
                self.discard(name);
            }
            return Err(Error::Malformed);
        }
        match Error::from_status(decoded?) {
            None => Ok(rights.first().copied()),
            Some(err) => Err(err),
        }
    }

    fn discard(&self, name: Name) {
        if let Err(err) = self.task.destroy(name) {
            debug!(target: "rendezvous", "discarding {name}: {err}");
        }
    }
}

/// A dead registry port is reported as unavailable, not as an IPC fault.
fn unreachable_registry(err: IpcError) -> Error {
    match err {
        IpcError::PortDead => Error::Unavailable,
        other => Error::Ipc(other),
    }
}
