// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for rights movement between tasks
//! OWNERS: @kernel-ipc-team
//! NOTE: Tests only; no kernel logic.
//!
//! TEST_SCOPE:
//!   - At most one Receive right exists per port, whatever moves happen
//!   - Send-right counters match the rights actually bound in tables
//!
//! TEST_SCENARIOS:
//!   - receive_right_stays_unique(): random create/move/destroy sequences across two tasks
//!   - send_counters_track_bindings(): random duplicate/destroy sequences on one port

use std::collections::HashMap;

use proptest::prelude::*;

use super::{grant_send, Task};
use crate::config::KernelConfig;
use crate::ipc::OutgoingMessage;
use crate::kernel::Kernel;
use crate::rights::{Disposition, Right};
use crate::types::{Name, PortId};
use crate::wait::Wait;

#[derive(Clone, Debug)]
enum Op {
    Create { task: usize },
    Move { from: usize, pick: usize },
    Destroy { task: usize, pick: usize },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..2).prop_map(|task| Op::Create { task }),
        (0usize..2, any::<usize>()).prop_map(|(from, pick)| Op::Move { from, pick }),
        (0usize..2, any::<usize>()).prop_map(|(task, pick)| Op::Destroy { task, pick }),
    ]
}

/// Dynamic names bound to Receive rights, with the port each one refers to.
fn receive_names(task: &Task) -> Vec<(Name, PortId)> {
    let table = task.caps().unwrap();
    table
        .names()
        .filter(|name| !name.is_reserved())
        .filter_map(|name| match table.lookup(name) {
            Ok(Right::Receive(receive)) => Some((name, receive.port())),
            _ => None,
        })
        .collect()
}

proptest! {
    #[test]
    fn receive_right_stays_unique(ops in proptest::collection::vec(arb_op(), 1..40)) {
        let kernel = Kernel::boot(KernelConfig { default_queue_limit: 16, ..KernelConfig::default() }).unwrap();
        let tasks = [kernel.create_task().unwrap(), kernel.create_task().unwrap()];
        let mailboxes = [
            grant_send(&tasks[1], Name::TASK_SELF, &tasks[0]),
            grant_send(&tasks[0], Name::TASK_SELF, &tasks[1]),
        ];

        for op in ops {
            match op {
                Op::Create { task } => {
                    let _ = tasks[task].allocate_port();
                }
                Op::Move { from, pick } => {
                    let held = receive_names(&tasks[from]);
                    if held.is_empty() {
                        continue;
                    }
                    let (name, _) = held[pick % held.len()];
                    let message = OutgoingMessage::new(mailboxes[from]).attach(name, Disposition::Move);
                    tasks[from].send(message, Wait::NonBlocking).unwrap();
                    let received = tasks[1 - from].receive(Name::TASK_SELF, Wait::NonBlocking).unwrap();
                    prop_assert_eq!(received.rights.len(), 1);
                    prop_assert!(tasks[from].kind(name).is_err());
                }
                Op::Destroy { task, pick } => {
                    let held = receive_names(&tasks[task]);
                    if held.is_empty() {
                        continue;
                    }
                    tasks[task].destroy(held[pick % held.len()].0).unwrap();
                }
            }

            let mut owners: HashMap<PortId, usize> = HashMap::new();
            for task in &tasks {
                for (_, port) in receive_names(task) {
                    *owners.entry(port).or_default() += 1;
                }
            }
            prop_assert!(owners.values().all(|count| *count == 1));
        }
    }

    #[test]
    fn send_counters_track_bindings(ops in proptest::collection::vec(any::<bool>(), 1..32)) {
        let kernel = Kernel::boot(KernelConfig::default()).unwrap();
        let task = kernel.create_task().unwrap();
        let (receive, first) = task.create_port().unwrap();
        let mut sends = vec![first];
        for duplicate in ops {
            if duplicate || sends.len() == 1 {
                let source = sends[0];
                sends.push(task.duplicate(source).unwrap());
            } else if let Some(name) = sends.pop() {
                task.destroy(name).unwrap();
            }
            prop_assert_eq!(task.port_status(receive).unwrap().send_rights as usize, sends.len());
        }
    }
}
