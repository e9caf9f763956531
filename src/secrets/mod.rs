//! Secret store access.
//!
//! # Responsibilities
//! - Fetch secrets by path, optionally restricted to named keys
//! - Provide database credentials to the database stage
//!
//! # Design Decisions
//! - The mounted-file store re-reads the document on every call, so a
//!   document written late by another container is picked up on retry
//! - Missing or empty documents are `Unavailable` (transient); malformed
//!   ones fail the stage without retry

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{SecretStoreConfig, SecretStoreKind};
use crate::lifecycle::StageError;

pub type Secrets = HashMap<String, String>;

type SecretDocument = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret store unavailable: {0}")]
    Unavailable(String),

    #[error("no secrets stored at path '{0}'")]
    PathNotFound(String),

    #[error("secret '{key}' missing at path '{path}'")]
    MissingKey { path: String, key: String },

    #[error("malformed secrets document: {0}")]
    Malformed(String),
}

impl From<SecretError> for StageError {
    fn from(e: SecretError) -> Self {
        match e {
            SecretError::Malformed(_) => StageError::misconfigured(e),
            other => StageError::unavailable("secret store", other),
        }
    }
}

/// Source of secrets.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Secrets stored at `path`. With an empty `keys`, everything at the path
    /// is returned; otherwise every listed key must be present.
    async fn get_secrets(&self, path: &str, keys: &[&str]) -> Result<Secrets, SecretError>;

    /// Short backend name for logs.
    fn kind(&self) -> &'static str;
}

fn select(document: &SecretDocument, path: &str, keys: &[&str]) -> Result<Secrets, SecretError> {
    let entries = document
        .get(path)
        .ok_or_else(|| SecretError::PathNotFound(path.to_string()))?;

    if keys.is_empty() {
        return Ok(entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    }

    keys.iter()
        .map(|key| {
            entries
                .get(*key)
                .map(|value| (key.to_string(), value.clone()))
                .ok_or_else(|| SecretError::MissingKey {
                    path: path.to_string(),
                    key: key.to_string(),
                })
        })
        .collect()
}

/// Secrets written in plain text in the service configuration.
#[derive(Debug, Clone, Default)]
pub struct InsecureSecrets {
    secrets: SecretDocument,
}

impl InsecureSecrets {
    pub fn new(secrets: SecretDocument) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl SecretProvider for InsecureSecrets {
    async fn get_secrets(&self, path: &str, keys: &[&str]) -> Result<Secrets, SecretError> {
        select(&self.secrets, path, keys)
    }

    fn kind(&self) -> &'static str {
        "insecure"
    }
}

/// Secrets in a JSON document (`{"<path>": {"<key>": "<value>"}}`) mounted
/// into the container.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn document(&self) -> Result<SecretDocument, SecretError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SecretError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        // Created but not yet written.
        if content.trim().is_empty() {
            return Err(SecretError::Unavailable(format!("{} is empty", self.path.display())));
        }
        serde_json::from_str(&content).map_err(|e| SecretError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl SecretProvider for FileSecretStore {
    async fn get_secrets(&self, path: &str, keys: &[&str]) -> Result<Secrets, SecretError> {
        let document = self.document().await?;
        select(&document, path, keys)
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

/// Build the provider selected by config.
pub fn build_provider(config: &SecretStoreConfig) -> Arc<dyn SecretProvider> {
    match config.kind {
        SecretStoreKind::Insecure => Arc::new(InsecureSecrets::new(config.insecure.clone())),
        SecretStoreKind::File => Arc::new(FileSecretStore::new(&config.path)),
    }
}

/// Username and password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Fetch `username` and `password` stored at `path`.
pub async fn credentials(provider: &dyn SecretProvider, path: &str) -> Result<Credentials, SecretError> {
    let mut secrets = provider.get_secrets(path, &["username", "password"]).await?;
    Ok(Credentials {
        username: secrets.remove("username").unwrap_or_default(),
        password: secrets.remove("password").unwrap_or_default(),
    })
}
