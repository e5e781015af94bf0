// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Daemon configuration: a `[kernel]` table for the IPC limits and a
//! `[registry]` table for the actor loop.

use core::time::Duration;
use std::path::{Path, PathBuf};

use log::warn;
use neuron_ipc::config::load_toml;
use neuron_ipc::{ConfigError, KernelConfig};
use serde::Deserialize;

/// Names the registry task needs beyond its stored entries: its own Receive
/// right, an incoming reply right, an incoming attached right and a lookup copy.
const WORKING_NAMES: usize = 4;

/// Tunables for the registry actor.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Queue capacity of the well-known port.
    pub queue_limit: usize,
    /// Idle time after which dead entries are swept.
    pub prune_interval_ms: u64,
    /// How long clients wait for the registry to accept a request or reply.
    pub request_timeout_ms: u64,
    pub max_entries: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { queue_limit: 16, prune_interval_ms: 250, request_timeout_ms: 1000, max_entries: 32 }
    }
}

impl RegistryConfig {
    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Checks the registry settings against the kernel limits they run under.
    pub fn validate(&self, kernel: &KernelConfig) -> Result<(), ConfigError> {
        if self.queue_limit == 0 || self.queue_limit > kernel.max_queue_limit {
            return Err(ConfigError::Invalid(format!(
                "registry.queue_limit must be within 1..={}",
                kernel.max_queue_limit
            )));
        }
        if self.prune_interval_ms == 0 || self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("registry intervals must be non-zero".into()));
        }
        if self.max_entries == 0 || self.max_entries + WORKING_NAMES > kernel.dynamic_slots() {
            return Err(ConfigError::Invalid(format!(
                "registry.max_entries {} does not fit {} dynamic names",
                self.max_entries,
                kernel.dynamic_slots()
            )));
        }
        Ok(())
    }
}

/// Full daemon configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub kernel: KernelConfig,
    pub registry: RegistryConfig,
}

impl DaemonConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)
            .map_err(|source| ConfigError::Parse { path: PathBuf::from("<inline>"), source })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, or the defaults when no file is given or it does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            None => Self::default(),
            Some(path) if !path.exists() => {
                warn!(target: "rendezvousd", "{} not found, using defaults", path.display());
                Self::default()
            }
            Some(path) => load_toml(path)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.kernel.validate()?;
        self.registry.validate(&self.kernel)
    }
}
