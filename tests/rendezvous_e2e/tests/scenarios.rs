// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Cross-crate scenarios for ports, rights and the name registry
//! TESTS: register/lookup echo, dead port, backpressure, reserved-name asymmetry,
//!        ordering, idempotent death, duplicate independence, registry restart

use std::thread;
use std::time::{Duration, Instant};

use neuron_ipc::notify::{parse_dead_name_notification, NOTIFY_DEAD_NAME};
use neuron_ipc::{IpcError, KernelConfig, Name, OutgoingMessage, RightKind, Wait};
use rendezvous::{Error, RegistryClient};
use rendezvous_e2e::{Harness, WAIT};
use rendezvousd::EchoPayload;

#[test]
fn register_lookup_echo() {
    let harness = Harness::boot();
    let a = harness.kernel.create_task().unwrap();
    let inbox = a.allocate_port().unwrap();
    RegistryClient::new(&a).register("svc.echo", inbox).unwrap();

    let b = harness.kernel.create_task().unwrap();
    let route = RegistryClient::new(&b).lookup("svc.echo").unwrap();
    let payload = EchoPayload { number: 42, text: "Muhaha".into() };
    b.send(OutgoingMessage::new(route).with_body(payload.to_bytes()), WAIT).unwrap();

    let received = a.receive(inbox, WAIT).unwrap();
    assert_eq!(EchoPayload::from_bytes(&received.body), Some(payload));
    assert_eq!(received.local, inbox);
}

#[test]
fn dead_port_after_receiver_exit() {
    let harness = Harness::boot();
    let a = harness.kernel.create_task().unwrap();
    let inbox = a.allocate_port().unwrap();
    RegistryClient::new(&a).register("svc.gone", inbox).unwrap();
    let b = harness.kernel.create_task().unwrap();
    let route = RegistryClient::new(&b).lookup("svc.gone").unwrap();

    a.terminate();
    assert_eq!(b.send(OutgoingMessage::new(route), WAIT), Err(IpcError::PortDead));
    let copy = b.duplicate(route).unwrap();
    assert_eq!(b.kind(copy).unwrap(), RightKind::DeadName);
    assert_eq!(RegistryClient::new(&b).lookup("svc.gone"), Err(Error::NotFound));
}

#[test]
fn queue_backpressure_per_policy() {
    let harness = Harness::boot_with(KernelConfig { default_queue_limit: 1, ..Default::default() });
    let task = harness.kernel.create_task().unwrap();
    let (receive, send) = task.create_port().unwrap();
    task.send(OutgoingMessage::new(send).with_id(1), Wait::NonBlocking).unwrap();

    let started = Instant::now();
    let timeout = Wait::Timeout(Duration::from_millis(40));
    assert_eq!(task.send(OutgoingMessage::new(send).with_id(2), timeout), Err(IpcError::Timeout));
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(
        task.send(OutgoingMessage::new(send).with_id(2), Wait::NonBlocking),
        Err(IpcError::QueueFull)
    );
    assert_eq!(task.port_status(receive).unwrap().queued, 1);
}

#[test]
fn blocked_sender_resumes_after_dequeue() {
    let harness = Harness::boot();
    let owner = harness.kernel.create_task().unwrap();
    let (receive, send) = owner.create_port().unwrap();
    owner.set_queue_limit(receive, 1).unwrap();
    owner.send(OutgoingMessage::new(send).with_id(1), Wait::NonBlocking).unwrap();

    let sender = {
        let owner = owner.clone();
        thread::spawn(move || owner.send(OutgoingMessage::new(send).with_id(2), WAIT))
    };
    thread::sleep(Duration::from_millis(20));
    assert_eq!(owner.receive(receive, WAIT).unwrap().id, 1);
    sender.join().unwrap().unwrap();
    assert_eq!(owner.receive(receive, WAIT).unwrap().id, 2);
}

#[test]
fn reserved_names_fork_and_exec() {
    let harness = Harness::boot();
    let parent = harness.kernel.create_task().unwrap();
    let inherited = parent.right_serial(Name::REGISTRY).unwrap();
    let scratch = parent.allocate_port().unwrap();

    let child = parent.fork().unwrap();
    assert_eq!(child.kind(Name::REGISTRY).unwrap(), RightKind::Send);
    assert_ne!(child.right_serial(Name::REGISTRY).unwrap(), inherited);
    assert_eq!(child.kind(scratch), Err(IpcError::InvalidName));
    // The child's registry right is live: it can use the registry on its own.
    let port = child.allocate_port().unwrap();
    RegistryClient::new(&child).register("svc.child", port).unwrap();

    parent.exec().unwrap();
    assert_eq!(parent.right_serial(Name::REGISTRY).unwrap(), inherited);
    assert_eq!(parent.kind(scratch), Err(IpcError::InvalidName));
    assert_eq!(parent.names().unwrap(), Name::RESERVED.to_vec());
    RegistryClient::new(&parent).lookup("svc.child").unwrap();
}

#[test]
fn single_port_preserves_fifo_order() {
    let harness = Harness::boot();
    let task = harness.kernel.create_task().unwrap();
    let (receive, send) = task.create_port().unwrap();
    let producer = {
        let task = task.clone();
        thread::spawn(move || {
            for id in 0..32 {
                task.send(OutgoingMessage::new(send).with_id(id), Wait::Blocking).unwrap();
            }
        })
    };
    let received: Vec<i32> =
        (0..32).map(|_| task.receive(receive, WAIT).unwrap().id).collect();
    producer.join().unwrap();
    assert_eq!(received, (0..32).collect::<Vec<_>>());
}

#[test]
fn port_death_notifies_once() {
    let harness = Harness::boot();
    let watcher = harness.kernel.create_task().unwrap();
    let notify = watcher.allocate_port().unwrap();
    let owner = harness.kernel.create_task().unwrap();
    let inbox = owner.allocate_port().unwrap();
    RegistryClient::new(&owner).register("svc.watch", inbox).unwrap();
    let route = RegistryClient::new(&watcher).lookup("svc.watch").unwrap();
    watcher.request_dead_name_notification(route, notify).unwrap();

    owner.destroy(inbox).unwrap();
    owner.terminate();
    owner.terminate();

    let message = watcher.receive(notify, WAIT).unwrap();
    assert_eq!(message.id, NOTIFY_DEAD_NAME);
    assert_eq!(parse_dead_name_notification(&message), Some(route));
    assert_eq!(watcher.receive(notify, Wait::NonBlocking), Err(IpcError::WouldBlock));
}

#[test]
fn duplicates_are_independent() {
    let harness = Harness::boot();
    let owner = harness.kernel.create_task().unwrap();
    let (receive, send) = owner.create_port().unwrap();
    let copies: Vec<Name> = (0..3).map(|_| owner.duplicate(send).unwrap()).collect();
    assert_eq!(owner.port_status(receive).unwrap().send_rights, 4);

    owner.destroy(send).unwrap();
    owner.destroy(copies[0]).unwrap();
    for (id, copy) in copies[1..].iter().enumerate() {
        owner.send(OutgoingMessage::new(*copy).with_id(id as i32), WAIT).unwrap();
    }
    assert_eq!(owner.receive(receive, WAIT).unwrap().id, 0);
    assert_eq!(owner.receive(receive, WAIT).unwrap().id, 1);
    assert_eq!(owner.port_status(receive).unwrap().send_rights, 2);
}

#[test]
fn registry_outage_is_reported_as_unavailable() {
    let mut harness = Harness::boot();
    let task = harness.kernel.create_task().unwrap();
    let inbox = task.allocate_port().unwrap();
    RegistryClient::new(&task).register("svc.x", inbox).unwrap();

    harness.stop_registry();
    assert_eq!(RegistryClient::new(&task).lookup("svc.x"), Err(Error::Unavailable));
    // The service port itself is unaffected by the registry's death.
    assert!(task.port_status(inbox).unwrap().alive);
}
