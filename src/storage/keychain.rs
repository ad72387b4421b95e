//! API keys in the OS keychain.
//!
//! Generation providers and remote vector stores each get one entry under a
//! shared service name. Every keyring call blocks, so each one runs on the
//! blocking pool.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeychainError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("No credential stored under {0}")]
    NotFound(String),

    #[error("Keychain task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, KeychainError>;

/// Handle on one keychain service namespace.
#[derive(Debug, Clone)]
pub struct KeychainAccess {
    service: String,
}

impl KeychainAccess {
    pub const DEFAULT_SERVICE: &'static str = "io.medrag.app";

    pub fn new() -> Self {
        Self::with_service(Self::DEFAULT_SERVICE)
    }

    /// Uses a separate namespace, e.g. to keep tests away from real keys.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }

    /// Key under which a generation provider's API key is stored.
    pub fn generation_api_key(provider: &str) -> String {
        format!("generation.api_key.{provider}")
    }

    /// Key under which a vector store's API key is stored.
    pub fn store_api_key(backend: &str) -> String {
        format!("store.api_key.{backend}")
    }

    /// Saves `value` under `key`, replacing any previous value.
    pub async fn store(&self, key: &str, value: &str) -> Result<()> {
        let value = value.to_string();
        self.with_entry(key, move |entry, _| Ok(entry.set_password(&value)?))
            .await?;
        tracing::info!(key, service = %self.service, "Stored credential");
        Ok(())
    }

    /// Reads the value under `key`; a missing entry is `None`.
    pub async fn retrieve(&self, key: &str) -> Result<Option<String>> {
        self.with_entry(key, |entry, _| match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        })
        .await
    }

    /// Removes the value under `key`. Fails with `NotFound` if there is none.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.with_entry(key, |entry, key| match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Err(KeychainError::NotFound(key)),
            Err(e) => Err(e.into()),
        })
        .await
    }

    /// Reads a secret from `env_var` if it is set and non-blank, else from
    /// the keychain entry `key`.
    pub async fn resolve(&self, env_var: Option<&str>, key: &str) -> Result<Option<String>> {
        if let Some(name) = env_var {
            match std::env::var(name) {
                Ok(value) if !value.trim().is_empty() => {
                    tracing::debug!(env_var = name, "Using credential from environment");
                    return Ok(Some(value));
                }
                _ => {}
            }
        }
        self.retrieve(key).await
    }

    async fn with_entry<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(keyring::Entry, String) -> Result<T> + Send + 'static,
    {
        let service = self.service.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key)?;
            op(entry, key)
        })
        .await
        .map_err(|e| KeychainError::TaskFailed(e.to_string()))?
    }
}

impl Default for KeychainAccess {
    fn default() -> Self {
        Self::new()
    }
}
