// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Registry state owned by the registry task.
//!
//! Every stored right lives in the registry task's own capability table; the
//! map only remembers which name holds it. Entries whose port died are pruned
//! lazily on lookup/register and by periodic sweeps.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, info, warn};
use neuron_ipc::{Name, RightKind, Task};

use crate::protocol::MAX_NAME_LEN;
use crate::{Error, Result};

#[derive(Debug)]
struct Entry {
    right: Name,
    registered_at: Instant,
}

/// Symbolic name to Send right map, private to one registry task.
#[derive(Debug)]
pub struct Registry {
    task: Task,
    entries: HashMap<String, Entry>,
    max_entries: usize,
}

impl Registry {
    pub fn new(task: Task, max_entries: usize) -> Self {
        Self { task, entries: HashMap::new(), max_entries }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, service: &str) -> bool {
        self.entries.contains_key(service)
    }

    /// Stores `right` (a name in the registry task) under `service`.
    ///
    /// Takes ownership of `right`: on any failure it is destroyed. A prior
    /// entry is replaced only when its port is already dead.
    pub fn register(&mut self, service: &str, right: Name) -> Result<()> {
        let outcome = self.try_register(service, right);
        if outcome.is_err() {
            self.discard(right);
        }
        outcome
    }

    fn try_register(&mut self, service: &str, right: Name) -> Result<()> {
        if service.len() > MAX_NAME_LEN {
            return Err(Error::NameTooLong);
        }
        if service.is_empty() {
            return Err(Error::Malformed);
        }
        if self.task.kind(right)? != RightKind::Send {
            return Err(Error::Malformed);
        }
        if let Some(existing) = self.entries.get(service) {
            if self.is_live(existing.right) {
                warn!(target: "rendezvous", "register {service}: live entry exists");
                return Err(Error::NameAlreadyRegistered);
            }
            self.evict(service);
        }
        if self.entries.len() >= self.max_entries && self.prune() == 0 {
            return Err(Error::Full);
        }
        self.entries
            .insert(service.to_owned(), Entry { right, registered_at: Instant::now() });
        info!(target: "rendezvous", "registered {service} as {right}");
        Ok(())
    }

    /// Returns a fresh Send right (in the registry task) for `service`.
    pub fn lookup(&mut self, service: &str) -> Result<Name> {
        let entry = self.entries.get(service).ok_or(Error::NotFound)?;
        let copy = self.task.duplicate(entry.right)?;
        if self.task.kind(copy)? == RightKind::DeadName {
            self.discard(copy);
            self.evict(service);
            debug!(target: "rendezvous", "lookup {service}: port died, entry pruned");
            return Err(Error::NotFound);
        }
        Ok(copy)
    }

    /// Removes `service` if `proof` references the same port. Consumes `proof`.
    pub fn unregister(&mut self, service: &str, proof: Name) -> Result<()> {
        let outcome = match self.entries.get(service) {
            None => Err(Error::NotFound),
            Some(entry) => match self.task.same_port(entry.right, proof) {
                Ok(true) => Ok(()),
                Ok(false) => Err(Error::NotOwner),
                Err(err) => Err(err.into()),
            },
        };
        self.discard(proof);
        outcome?;
        self.evict(service);
        info!(target: "rendezvous", "unregistered {service}");
        Ok(())
    }

    /// Drops every entry whose port died; returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let dead: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !self.is_live(entry.right))
            .map(|(service, _)| service.clone())
            .collect();
        for service in &dead {
            if let Some(entry) = self.entries.get(service) {
                debug!(
                    target: "rendezvous",
                    "pruning {service} (registered {:?} ago)",
                    entry.registered_at.elapsed()
                );
            }
            self.evict(service);
        }
        dead.len()
    }

    /// Drops every entry and releases the rights.
    pub fn clear(&mut self) {
        let services: Vec<String> = self.entries.keys().cloned().collect();
        for service in services {
            self.evict(&service);
        }
    }

    fn is_live(&self, right: Name) -> bool {
        matches!(self.task.kind(right), Ok(RightKind::Send))
    }

    fn evict(&mut self, service: &str) {
        if let Some(entry) = self.entries.remove(service) {
            self.discard(entry.right);
        }
    }

    fn discard(&self, right: Name) {
        if let Err(err) = self.task.destroy(right) {
            debug!(target: "rendezvous", "discarding {right}: {err}");
        }
    }
}
