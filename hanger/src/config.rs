//! Gateway configuration with JSON-file persistence.
//!
//! The default location is `<config dir>/keychain-hanger/config.json`. A
//! missing file yields the defaults; a present but invalid one is an error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::CredentialGateway;
use crate::store::{KeyringStore, MemoryStore, SecureStore};

const CONFIG_DIR: &str = "keychain-hanger";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_PREFIX: &str = "keychain-hanger";
const DEFAULT_SERVICE: &str = "keychain-hanger";
const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which store the gateway talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// The OS keychain, with every entry filed under `service`.
    Keyring {
        #[serde(default = "default_service")]
        service: String,
    },
    /// An in-process store; contents do not outlive the process. Meant for
    /// embedding and tests, the `hanger` binary refuses it.
    Memory,
}

impl BackendConfig {
    /// Whether saved credentials survive the process.
    pub fn is_persistent(&self) -> bool {
        matches!(self, BackendConfig::Keyring { .. })
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Keyring {
            service: default_service(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HangerConfig {
    /// Namespace prepended to every application identifier.
    pub prefix: String,
    /// Result cap used when a caller does not pick one.
    pub default_limit: usize,
    pub backend: BackendConfig,
}

impl Default for HangerConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            default_limit: DEFAULT_LIMIT,
            backend: BackendConfig::default(),
        }
    }
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

impl HangerConfig {
    /// Path of the per-user config file, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: HangerConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() {
            return Err(ConfigError::Invalid("prefix must not be empty".to_string()));
        }
        if self.default_limit == 0 {
            return Err(ConfigError::Invalid(
                "default_limit must be at least 1".to_string(),
            ));
        }
        if let BackendConfig::Keyring { service } = &self.backend
            && service.is_empty()
        {
            return Err(ConfigError::Invalid(
                "keyring service must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the configured store.
    pub fn open_store(&self) -> Box<dyn SecureStore> {
        match &self.backend {
            BackendConfig::Keyring { service } => Box::new(KeyringStore::new(service.clone())),
            BackendConfig::Memory => Box::new(MemoryStore::new()),
        }
    }

    /// A gateway over the configured store, namespaced with the configured prefix.
    pub fn gateway(&self) -> CredentialGateway<Box<dyn SecureStore>> {
        CredentialGateway::new(self.prefix.clone(), self.open_store())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = HangerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.prefix, "keychain-hanger");
        assert_eq!(config.default_limit, 100);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: HangerConfig = serde_json::from_str(r#"{"prefix":"com.example"}"#).unwrap();
        assert_eq!(config.prefix, "com.example");
        assert_eq!(config.default_limit, 100);
        assert_eq!(config.backend, BackendConfig::default());
    }

    #[test]
    fn backend_is_tagged_by_kind() {
        let config: HangerConfig =
            serde_json::from_str(r#"{"backend":{"kind":"memory"}}"#).unwrap();
        assert_eq!(config.backend, BackendConfig::Memory);

        let config: HangerConfig =
            serde_json::from_str(r#"{"backend":{"kind":"keyring"}}"#).unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Keyring {
                service: "keychain-hanger".to_string()
            }
        );
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let config = HangerConfig {
            prefix: String::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn memory_backend_opens_memory_store() {
        let config = HangerConfig {
            backend: BackendConfig::Memory,
            ..Default::default()
        };
        assert_eq!(config.open_store().backend_name(), "memory");
        assert_eq!(config.gateway().prefix(), "keychain-hanger");
    }

    #[test]
    fn only_keyring_backend_is_persistent() {
        assert!(BackendConfig::default().is_persistent());
        assert!(!BackendConfig::Memory.is_persistent());
    }
}
