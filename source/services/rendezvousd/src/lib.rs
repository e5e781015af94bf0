// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Name registry daemon: single-threaded actor on the well-known registry port
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Config unit tests, service tests in `tests/service.rs`
//!
//! PUBLIC API:
//!   - spawn(): claim the registry port and serve it on a dedicated thread
//!   - serve(): the actor loop, usable on any thread that owns the port
//!   - run_selfcheck(): register/lookup/echo round trip used by the binary
//!   - ReadyNotifier: readiness callback
//!
//! The registry map is touched only by the loop below, one request at a time.

#![forbid(unsafe_code)]
#![deny(clippy::all)]

mod config;

pub use config::{DaemonConfig, RegistryConfig};

use std::io;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, info, warn};
use neuron_ipc::{
    ConfigError, Disposition, IpcError, Kernel, Name, OutgoingMessage, ReceivedMessage,
    SpecialPort, Task, Wait,
};
use rendezvous::protocol::{self, Op, Request, Status, RESPONSE_BIT};
use rendezvous::{Registry, RegistryClient};
use thiserror::Error;

/// Service name used by the self-check.
pub const ECHO_SERVICE: &str = "svc.echo";
/// Message id of the self-check echo request.
pub const ECHO_ID: i32 = 0x4543;

/// Callback invoked once the registry port is being served.
pub struct ReadyNotifier(Box<dyn FnOnce() + Send>);

impl ReadyNotifier {
    /// Create a new notifier from the supplied closure.
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(func))
    }

    /// Execute the wrapped callback.
    pub fn notify(self) {
        (self.0)();
    }
}

/// Errors surfaced by the daemon.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("ipc failure: {0}")]
    Ipc(#[from] IpcError),
    #[error("registry request failed: {0}")]
    Registry(#[from] rendezvous::Error),
    /// Failed to start the worker thread.
    #[error("failed to spawn registry worker: {source}")]
    Spawn {
        source: io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Worker exited before signalling readiness, or panicked.
    #[error("registry worker stopped unexpectedly")]
    Stopped,
    #[error("self-check failed: {0}")]
    SelfCheck(String),
}

/// Serves registry requests arriving on `port` until the port dies.
///
/// `port` must be a Receive right in the registry's task. Dead entries are
/// swept whenever the port stays idle for the prune interval, and at least
/// that often under load.
pub fn serve(
    registry: &mut Registry,
    port: Name,
    config: &RegistryConfig,
    notifier: ReadyNotifier,
) -> Result<(), ServerError> {
    let task = registry.task().clone();
    let interval = config.prune_interval();
    let idle = Wait::Timeout(interval);
    notifier.notify();
    info!(target: "rendezvousd", "serving registry on {port} ({})", task.id());

    let mut last_sweep = Instant::now();
    loop {
        match task.receive(port, idle) {
            Ok(request) => handle(registry, request),
            Err(IpcError::Timeout) => {}
            Err(IpcError::PortDead | IpcError::TaskTerminated) => {
                info!(target: "rendezvousd", "registry port closed, exiting");
                return Ok(());
            }
            Err(IpcError::ReceiverChanged) => {
                info!(target: "rendezvousd", "registry port handed off, exiting");
                return Ok(());
            }
            Err(IpcError::NoSpace) => {
                warn!(target: "rendezvousd", "request dropped: registry table full");
            }
            Err(err) => return Err(err.into()),
        }
        if last_sweep.elapsed() >= interval {
            let pruned = registry.prune();
            if pruned > 0 {
                debug!(target: "rendezvousd", "swept {pruned} dead entries");
            }
            last_sweep = Instant::now();
        }
    }
}

fn handle(registry: &mut Registry, request: ReceivedMessage) {
    let task = registry.task().clone();
    let ReceivedMessage { body, reply, rights, .. } = request;
    let Some(reply) = reply else {
        warn!(target: "rendezvousd", "request without reply right dropped");
        discard_all(&task, &rights);
        return;
    };
    let raw_op = body.get(3).copied().unwrap_or(0);
    let (status, answer) = match protocol::decode_request(&body) {
        Err(err) => {
            discard_all(&task, &rights);
            (err.status(), None)
        }
        Ok(request) if rights.len() != request.op.request_rights() => {
            warn!(
                target: "rendezvousd",
                "{:?} carried {} rights, expected {}",
                request.op,
                rights.len(),
                request.op.request_rights()
            );
            discard_all(&task, &rights);
            (Status::Malformed, None)
        }
        Ok(request) => dispatch(registry, request, rights.first().copied()),
    };
    respond(&task, reply, raw_op, status, answer);
}

fn dispatch(registry: &mut Registry, request: Request, right: Option<Name>) -> (Status, Option<Name>) {
    let Request { op, name } = request;
    let outcome = match (op, right) {
        (Op::Register, Some(right)) => registry.register(&name, right).map(|()| None),
        (Op::Lookup, None) => registry.lookup(&name).map(Some),
        (Op::Unregister, Some(proof)) => registry.unregister(&name, proof).map(|()| None),
        (_, stray) => {
            discard_all(registry.task(), stray.as_slice());
            Err(rendezvous::Error::Malformed)
        }
    };
    match outcome {
        Ok(answer) => (Status::Ok, answer),
        Err(err) => {
            debug!(target: "rendezvousd", "{op:?} {name}: {err}");
            (err.status(), None)
        }
    }
}

fn respond(task: &Task, reply: Name, raw_op: u8, status: Status, answer: Option<Name>) {
    let mut message = OutgoingMessage::new(reply)
        .with_id(i32::from(raw_op | RESPONSE_BIT))
        .with_body(protocol::encode_raw_response(raw_op, status));
    if let Some(answer) = answer {
        message = message.attach(answer, Disposition::Move);
    }
    // Never block on a client that stopped draining its reply port.
    if let Err(err) = task.send(message, Wait::NonBlocking) {
        warn!(target: "rendezvousd", "reply via {reply} failed: {err}");
        discard_all(task, answer.as_slice());
        discard_all(task, &[reply]);
    }
}

fn discard_all(task: &Task, names: &[Name]) {
    for &name in names {
        if let Err(err) = task.destroy(name) {
            debug!(target: "rendezvousd", "discarding {name}: {err}");
        }
    }
}

/// Running registry actor.
#[derive(Debug)]
pub struct ServiceHandle {
    task: Task,
    join: Option<JoinHandle<Result<(), ServerError>>>,
}

impl ServiceHandle {
    /// Task that owns the registry port.
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Kills the registry port and waits for the loop to exit.
    pub fn shutdown(mut self) -> Result<(), ServerError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), ServerError> {
        self.task.terminate();
        match self.join.take() {
            Some(join) => join.join().map_err(|_| ServerError::Stopped)?,
            None => Ok(()),
        }
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            if let Err(err) = self.stop() {
                warn!(target: "rendezvousd", "registry worker: {err}");
            }
        }
    }
}

/// Claims the kernel's registry port and serves it on a new thread.
///
/// Returns once the worker is ready; every task of `kernel` then reaches it
/// through [`Name::REGISTRY`].
pub fn spawn(kernel: &Kernel, config: RegistryConfig) -> Result<ServiceHandle, ServerError> {
    config.validate(kernel.config())?;
    let task = kernel.create_task()?;
    let port = kernel.claim_special_port(SpecialPort::Registry, &task)?;
    task.set_queue_limit(port, config.queue_limit)?;

    let (ready_tx, ready_rx) = mpsc::channel();
    let worker = task.clone();
    let join = thread::Builder::new()
        .name("svc-rendezvousd".into())
        .spawn(move || {
            let mut registry = Registry::new(worker, config.max_entries);
            let notifier = ReadyNotifier::new(move || {
                let _ = ready_tx.send(());
            });
            let result = serve(&mut registry, port, &config, notifier);
            registry.clear();
            result
        })
        .map_err(|source| ServerError::Spawn { source })?;

    let mut handle = ServiceHandle { task, join: Some(join) };
    if ready_rx.recv().is_err() {
        return Err(handle.stop().err().unwrap_or(ServerError::Stopped));
    }
    Ok(handle)
}

/// Payload exchanged by the self-check: `number` (i32 LE) followed by UTF-8 text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EchoPayload {
    pub number: i32,
    pub text: String,
}

impl EchoPayload {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.text.len());
        out.extend_from_slice(&self.number.to_le_bytes());
        out.extend_from_slice(self.text.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (number, text) = bytes.split_first_chunk::<4>()?;
        let text = core::str::from_utf8(text).ok()?;
        Some(Self { number: i32::from_le_bytes(*number), text: text.to_owned() })
    }
}

/// Boots a kernel, starts the registry and runs a register/lookup/echo round trip.
pub fn run_selfcheck(config: &DaemonConfig) -> Result<(), ServerError> {
    let kernel = Kernel::boot(config.kernel.clone())?;
    let service = spawn(&kernel, config.registry.clone())?;
    let wait = Wait::Timeout(config.registry.request_timeout());

    let server = kernel.create_task()?;
    let inbox = server.allocate_port()?;
    RegistryClient::new(&server).with_wait(wait).register(ECHO_SERVICE, inbox)?;

    let client = kernel.create_task()?;
    let route = RegistryClient::new(&client).with_wait(wait).lookup(ECHO_SERVICE)?;
    let payload = EchoPayload { number: 42, text: "Muhaha".into() };
    client.send(OutgoingMessage::new(route).with_id(ECHO_ID).with_body(payload.to_bytes()), wait)?;

    let received = server.receive(inbox, wait)?;
    match EchoPayload::from_bytes(&received.body) {
        Some(echo) if echo == payload && received.id == ECHO_ID => {
            info!(target: "rendezvousd", "self-check ok: {} {:?}", echo.number, echo.text);
        }
        other => return Err(ServerError::SelfCheck(format!("unexpected echo {other:?}"))),
    }
    service.shutdown()
}
