//! Credential storage.
//!
//! API keys for generation providers and remote vector stores live in the
//! OS keychain; operations run via `tokio::task::spawn_blocking`.

mod keychain;

pub use keychain::{KeychainAccess, KeychainError};
