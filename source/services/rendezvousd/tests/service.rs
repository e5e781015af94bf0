// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Registry daemon driven through its well-known port
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 9 integration tests

use std::thread;
use std::time::{Duration, Instant};

use neuron_ipc::{IpcError, Kernel, KernelConfig, Name, OutgoingMessage, RightKind, Wait};
use rendezvous::protocol::{self, Op, Status, OP_LOOKUP, RESPONSE_BIT};
use rendezvous::{Error, RegistryClient};
use rendezvousd::{DaemonConfig, EchoPayload, RegistryConfig, ServerError, ServiceHandle};

const WAIT: Wait = Wait::Timeout(Duration::from_secs(2));

fn start_with(config: RegistryConfig) -> (Kernel, ServiceHandle) {
    let kernel = Kernel::boot(KernelConfig::default()).expect("boot");
    let service = rendezvousd::spawn(&kernel, config).expect("spawn");
    (kernel, service)
}

fn start() -> (Kernel, ServiceHandle) {
    start_with(RegistryConfig::default())
}

/// Sends a raw frame to the registry and returns the response body.
fn raw_call(task: &neuron_ipc::Task, body: Vec<u8>) -> Vec<u8> {
    let reply = task.allocate_port().unwrap();
    task.send(OutgoingMessage::new(Name::REGISTRY).with_body(body).reply_to(reply), WAIT).unwrap();
    let response = task.receive(reply, WAIT).unwrap();
    assert!(response.rights.is_empty());
    response.body
}

#[test]
fn register_lookup_and_echo() {
    let (kernel, _service) = start();
    let server = kernel.create_task().unwrap();
    let inbox = server.allocate_port().unwrap();
    RegistryClient::new(&server).register("svc.echo", inbox).unwrap();

    let client = kernel.create_task().unwrap();
    let route = RegistryClient::new(&client).lookup("svc.echo").unwrap();
    assert_eq!(client.kind(route).unwrap(), RightKind::Send);

    let payload = EchoPayload { number: 42, text: "Muhaha".into() };
    client.send(OutgoingMessage::new(route).with_body(payload.to_bytes()), WAIT).unwrap();
    let received = server.receive(inbox, WAIT).unwrap();
    assert_eq!(EchoPayload::from_bytes(&received.body), Some(payload));
}

#[test]
fn live_registration_is_not_hijacked() {
    let (kernel, _service) = start();
    let owner = kernel.create_task().unwrap();
    let inbox = owner.allocate_port().unwrap();
    RegistryClient::new(&owner).register("svc.a", inbox).unwrap();

    let intruder = kernel.create_task().unwrap();
    let fake = intruder.allocate_port().unwrap();
    assert_eq!(
        RegistryClient::new(&intruder).register("svc.a", fake),
        Err(Error::NameAlreadyRegistered)
    );
    // The rejected right was released by the registry.
    assert_eq!(intruder.port_status(fake).unwrap().send_rights, 0);

    let route = RegistryClient::new(&intruder).lookup("svc.a").unwrap();
    intruder.send(OutgoingMessage::new(route).with_id(9), WAIT).unwrap();
    assert_eq!(owner.receive(inbox, WAIT).unwrap().id, 9);
}

#[test]
fn dead_entry_is_replaced_and_hidden() {
    let (kernel, _service) = start();
    let first = kernel.create_task().unwrap();
    let old = first.allocate_port().unwrap();
    RegistryClient::new(&first).register("svc.b", old).unwrap();
    first.destroy(old).unwrap();

    let client = kernel.create_task().unwrap();
    assert_eq!(RegistryClient::new(&client).lookup("svc.b"), Err(Error::NotFound));

    let second = kernel.create_task().unwrap();
    let fresh = second.allocate_port().unwrap();
    RegistryClient::new(&second).register("svc.b", fresh).unwrap();
    let route = RegistryClient::new(&client).lookup("svc.b").unwrap();
    client.send(OutgoingMessage::new(route).with_id(3), WAIT).unwrap();
    assert_eq!(second.receive(fresh, WAIT).unwrap().id, 3);
}

#[test]
fn unregister_requires_a_right_to_the_port() {
    let (kernel, _service) = start();
    let owner = kernel.create_task().unwrap();
    let inbox = owner.allocate_port().unwrap();
    let registry = RegistryClient::new(&owner);
    registry.register("svc.c", inbox).unwrap();

    let stranger = kernel.create_task().unwrap();
    let (_, other) = stranger.create_port().unwrap();
    assert_eq!(RegistryClient::new(&stranger).unregister("svc.c", other), Err(Error::NotOwner));

    registry.unregister("svc.c", inbox).unwrap();
    assert_eq!(registry.lookup("svc.c"), Err(Error::NotFound));
    assert_eq!(owner.port_status(inbox).unwrap().send_rights, 0);
}

#[test]
fn malformed_requests_get_status_replies() {
    let (kernel, _service) = start();
    let task = kernel.create_task().unwrap();

    let empty_name = raw_call(&task, vec![b'R', b'Z', 1, OP_LOOKUP, 0]);
    assert_eq!(protocol::decode_response(&empty_name, Op::Lookup), Ok(Status::Malformed));

    let unknown = raw_call(&task, vec![b'R', b'Z', 1, 9, 1, b'x']);
    assert_eq!(unknown, vec![b'R', b'Z', 1, 9 | RESPONSE_BIT, Status::Unsupported.code()]);

    // REGISTER without the Send right it must carry.
    let frame = protocol::encode_request(Op::Register, "svc.d").unwrap();
    let missing = raw_call(&task, frame);
    assert_eq!(protocol::decode_response(&missing, Op::Register), Ok(Status::Malformed));
}

#[test]
fn full_registry_refuses_new_names() {
    let config = RegistryConfig { max_entries: 2, ..RegistryConfig::default() };
    let (kernel, _service) = start_with(config);
    let task = kernel.create_task().unwrap();
    let registry = RegistryClient::new(&task);
    for service in ["svc.1", "svc.2"] {
        let port = task.allocate_port().unwrap();
        registry.register(service, port).unwrap();
    }
    let port = task.allocate_port().unwrap();
    assert_eq!(registry.register("svc.3", port), Err(Error::Full));
}

#[test]
fn idle_sweep_releases_dead_entries() {
    let config = RegistryConfig { prune_interval_ms: 10, ..RegistryConfig::default() };
    let (kernel, _service) = start_with(config);
    let task = kernel.create_task().unwrap();
    let baseline = kernel.port_count();

    let port = task.allocate_port().unwrap();
    RegistryClient::new(&task).register("svc.e", port).unwrap();
    task.destroy(port).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while kernel.port_count() != baseline {
        assert!(Instant::now() < deadline, "dead entry was never swept");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn shutdown_makes_registry_unavailable() {
    let (kernel, service) = start();
    let task = kernel.create_task().unwrap();
    assert!(matches!(
        rendezvousd::spawn(&kernel, RegistryConfig::default()),
        Err(ServerError::Ipc(IpcError::PreconditionViolation(_)))
    ));

    service.shutdown().unwrap();
    assert_eq!(RegistryClient::new(&task).lookup("svc"), Err(Error::Unavailable));
    assert_eq!(task.kind(Name::REGISTRY).unwrap(), RightKind::DeadName);
    let late = kernel.create_task().unwrap();
    assert_eq!(RegistryClient::new(&late).lookup("svc"), Err(Error::Unavailable));
}

#[test]
fn selfcheck_passes_with_defaults() {
    rendezvousd::run_selfcheck(&DaemonConfig::default()).unwrap();
}
