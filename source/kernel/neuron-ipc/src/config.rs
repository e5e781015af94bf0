// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel IPC limits loaded from TOML
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: KernelConfig, ConfigError, load_toml()

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::types::Name;

/// Tunables for queues, capability tables and message bounds.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    /// Queue capacity assigned to freshly created ports.
    pub default_queue_limit: usize,
    /// Upper bound accepted by `Task::set_queue_limit`.
    pub max_queue_limit: usize,
    /// Slots per capability table (reserved names included).
    pub cap_table_slots: usize,
    /// Maximum inline body size in bytes.
    pub max_inline_bytes: usize,
    /// Maximum number of rights attached to one message.
    pub max_rights_per_message: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            default_queue_limit: 5,
            max_queue_limit: 16,
            cap_table_slots: 64,
            max_inline_bytes: 4096,
            max_rights_per_message: 16,
        }
    }
}

impl KernelConfig {
    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)
            .map_err(|source| ConfigError::Parse { path: PathBuf::from("<inline>"), source })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Slots available to dynamic allocation once the reserved range is set aside.
    pub fn dynamic_slots(&self) -> usize {
        self.cap_table_slots.saturating_sub(Name::FIRST_DYNAMIC as usize)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_queue_limit == 0 {
            return Err(ConfigError::Invalid("default_queue_limit must be at least 1".into()));
        }
        if self.default_queue_limit > self.max_queue_limit {
            return Err(ConfigError::Invalid(format!(
                "default_queue_limit {} exceeds max_queue_limit {}",
                self.default_queue_limit, self.max_queue_limit
            )));
        }
        if self.cap_table_slots <= Name::FIRST_DYNAMIC as usize {
            return Err(ConfigError::Invalid(format!(
                "cap_table_slots must exceed the reserved range ({})",
                Name::FIRST_DYNAMIC
            )));
        }
        if self.cap_table_slots > u32::MAX as usize {
            return Err(ConfigError::Invalid("cap_table_slots does not fit a name".into()));
        }
        if self.max_inline_bytes > u32::MAX as usize {
            return Err(ConfigError::Invalid("max_inline_bytes does not fit the header".into()));
        }
        if self.max_rights_per_message > u16::MAX as usize {
            return Err(ConfigError::Invalid(
                "max_rights_per_message does not fit the header".into(),
            ));
        }
        Ok(())
    }
}

/// Reads `path` and deserializes it as TOML.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Location associated with the error.
        path: PathBuf,
        /// Underlying operating system error.
        source: std::io::Error,
    },
    /// TOML parsing failed.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Location of the malformed file.
        path: PathBuf,
        /// Error returned by the TOML deserializer.
        source: toml::de::Error,
    },
    /// Values parsed but violate a constraint.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(KernelConfig::from_toml_str("").unwrap(), KernelConfig::default());
    }

    #[test]
    fn parses_partial_overrides() {
        let config = KernelConfig::from_toml_str("default_queue_limit = 1\nmax_inline_bytes = 64\n")
            .unwrap();
        assert_eq!(config.default_queue_limit, 1);
        assert_eq!(config.max_inline_bytes, 64);
        assert_eq!(config.max_queue_limit, KernelConfig::default().max_queue_limit);
    }

    #[test]
    fn rejects_limit_above_maximum() {
        let err = KernelConfig::from_toml_str("default_queue_limit = 32\nmax_queue_limit = 8\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = KernelConfig::from_toml_str("queue = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kernel.toml");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "cap_table_slots = 32").unwrap();
        drop(file);
        let config = KernelConfig::load(&path).unwrap();
        assert_eq!(config.cap_table_slots, 32);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = KernelConfig::load(Path::new("/non-existent/kernel.toml")).unwrap_err();
        match err {
            ConfigError::Io { path, .. } => assert!(path.ends_with("kernel.toml")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
