//! keychain-hanger - namespaced credential storage over the OS secure store
//!
//! A thin gateway that turns four calls into single store interactions:
//! - **save**: create a username/password record
//! - **query**: fetch matching records
//! - **update**: change fields of matching records
//! - **delete**: remove matching records
//!
//! Application identifiers are namespaced with a caller-supplied prefix
//! before they reach the store. Outcomes are reported as store [`Status`]
//! codes, never as panics.

pub mod config;
pub mod gateway;
pub mod model;
pub mod status;
pub mod store;

// Re-export commonly used types
pub use config::{BackendConfig, ConfigError, HangerConfig};
pub use gateway::CredentialGateway;
pub use model::{
    CredentialChanges, CredentialQuery, CredentialRecord, CredentialType, OperationResult,
};
pub use status::Status;
pub use store::{KeyringStore, MatchLimit, MemoryStore, SecureStore};
