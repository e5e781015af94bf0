//! CONTEXT: rendezvous end-to-end test harness library
//! INTENT: Kernel + registry daemon fixture shared by the scenario tests
//! DEPS: neuron-ipc (tasks, ports), rendezvousd (registry actor)
//! TESTS: register/lookup echo, dead ports, backpressure, reserved-name asymmetry
// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use std::time::Duration;

use neuron_ipc::{Kernel, KernelConfig, Wait};
use rendezvousd::{RegistryConfig, ServiceHandle};

/// Bounded wait used by every scenario so a regression fails instead of hanging.
pub const WAIT: Wait = Wait::Timeout(Duration::from_secs(2));

/// Booted kernel with the registry daemon serving the well-known port.
pub struct Harness {
    pub kernel: Kernel,
    service: Option<ServiceHandle>,
}

impl Harness {
    pub fn boot() -> Self {
        Self::boot_with(KernelConfig::default())
    }

    pub fn boot_with(config: KernelConfig) -> Self {
        let kernel = Kernel::boot(config).expect("kernel boot");
        let service = rendezvousd::spawn(&kernel, RegistryConfig::default()).expect("registry");
        Self { kernel, service: Some(service) }
    }

    /// Stops the registry daemon; its port dies.
    pub fn stop_registry(&mut self) {
        if let Some(service) = self.service.take() {
            service.shutdown().expect("registry shutdown");
        }
    }
}
