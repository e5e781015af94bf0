// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel authority owning the port arena, special ports and task creation
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: Kernel (boot/create_task/claim_special_port), SpecialPort
//! DEPENDS_ON: space::PortSpace, task::Task, config::KernelConfig
//! INVARIANTS:
//!   - Special ports exist from boot; their Receive rights stay with the kernel until claimed
//!   - Every task starts with exactly the reserved names, nothing else

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;

use crate::cap::{BindError, CapTable};
use crate::config::{ConfigError, KernelConfig};
use crate::error::{IpcError, Result};
use crate::rights::{DeadName, ReceiveRight, Right};
use crate::space::PortSpace;
use crate::task::Task;
use crate::types::{Name, PortId, TaskId};

/// Well-known ports whose Send rights every task receives at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpecialPort {
    /// Name registry (bound to [`Name::REGISTRY`]).
    Registry,
    /// Kernel/host information (bound to [`Name::HOST`]).
    Host,
    /// Debug control (bound to [`Name::DEBUG`]).
    Debug,
}

impl SpecialPort {
    pub const ALL: [Self; 3] = [Self::Registry, Self::Host, Self::Debug];

    /// Reserved name under which tasks find this port.
    pub const fn name(self) -> Name {
        match self {
            Self::Registry => Name::REGISTRY,
            Self::Host => Name::HOST,
            Self::Debug => Name::DEBUG,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Registry => 0,
            Self::Host => 1,
            Self::Debug => 2,
        }
    }
}

/// Shared handle to one kernel instance.
#[derive(Clone, Debug)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

#[derive(Debug)]
struct KernelInner {
    config: KernelConfig,
    space: PortSpace,
    next_task: AtomicU32,
    special: [PortId; 3],
    unclaimed: Mutex<[Option<ReceiveRight>; 3]>,
}

impl Kernel {
    /// Boots a kernel with validated limits and fresh special ports.
    pub fn boot(config: KernelConfig) -> core::result::Result<Self, ConfigError> {
        config.validate()?;
        let space = PortSpace::new(&config);
        let receives = SpecialPort::ALL.map(|_| space.create_port(TaskId::KERNEL));
        let special = [receives[0].port(), receives[1].port(), receives[2].port()];
        info!(
            target: "task",
            "kernel booted: registry={} host={} debug={}",
            special[0], special[1], special[2]
        );
        Ok(Self {
            inner: Arc::new(KernelInner {
                config,
                space,
                next_task: AtomicU32::new(1),
                special,
                unclaimed: Mutex::new(receives.map(Some)),
            }),
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.inner.config
    }

    pub(crate) fn space(&self) -> &PortSpace {
        &self.inner.space
    }

    /// Creates a task seeded with the reserved names.
    pub fn create_task(&self) -> Result<Task> {
        let id = TaskId::from_raw(self.inner.next_task.fetch_add(1, Ordering::Relaxed));
        let table = self.seed_table(id)?;
        debug!(target: "task", "{id} created");
        Ok(Task::new(id, self.clone(), table))
    }

    /// Fresh table holding only the reserved entries for task `id`.
    pub(crate) fn seed_table(&self, id: TaskId) -> Result<CapTable> {
        let space = self.space();
        let mut table = CapTable::with_capacity(self.inner.config.cap_table_slots);
        for special in SpecialPort::ALL {
            let port = self.inner.special[special.index()];
            let right = match space.mint_send(port) {
                Ok(send) => Right::Send(send),
                Err(_) => Right::DeadName(DeadName::new(port)),
            };
            bind(space, &mut table, special.name(), right)?;
        }
        let control = space.create_port(id);
        bind(space, &mut table, Name::TASK_SELF, Right::Receive(control))?;
        Ok(table)
    }

    /// Hands the Receive right of a special port to `task`.
    ///
    /// Each special port can be claimed once; the returned name is dynamic.
    pub fn claim_special_port(&self, special: SpecialPort, task: &Task) -> Result<Name> {
        let receive = self.inner.unclaimed.lock()[special.index()]
            .take()
            .ok_or(IpcError::PreconditionViolation("special port already claimed"))?;
        let port = receive.port();
        let space = self.space();
        space.attach_receiver(port, task.id(), None);
        match task.bind(Right::Receive(receive)) {
            Ok(name) => {
                info!(target: "task", "{special:?} port {port} claimed by {} as {name}", task.id());
                Ok(name)
            }
            Err(BindError { error, right: Right::Receive(receive) }) => {
                space.attach_receiver(port, TaskId::KERNEL, None);
                self.inner.unclaimed.lock()[special.index()] = Some(receive);
                Err(error)
            }
            Err(BindError { error, right }) => {
                space.release(right);
                Err(error)
            }
        }
    }

    /// Returns `true` while the special port has a live receiver (or is unclaimed).
    pub fn special_port_alive(&self, special: SpecialPort) -> bool {
        self.space().is_alive(self.inner.special[special.index()])
    }

    /// Ports still held in the arena, live or awaiting collection.
    pub fn port_count(&self) -> usize {
        self.space().port_count()
    }
}

fn bind(space: &PortSpace, table: &mut CapTable, name: Name, right: Right) -> Result<()> {
    table.insert(name, right).map(|_| ()).map_err(|refused| {
        space.release(refused.right);
        refused.error
    })
}
