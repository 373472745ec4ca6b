//! Secrets-store client seam
//!
//! The session only ever talks to the store through [`SecretsClient`]. Calls
//! are blocking; the session moves them onto tokio's blocking pool with
//! [`offload`] so the async scheduler never waits on network IO.

pub mod http;
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::VaultResult;

pub use http::{HttpSecretsClient, HttpSecretsEngine};
pub use memory::{MemorySecrets, StoreCall};

/// Key/value bundle stored at one secret path.
///
/// Values stay JSON so a bundle read back and rewritten keeps keys written
/// by other programs exactly as they were, nested objects and nulls included.
pub type SecretData = BTreeMap<String, Value>;

/// Blocking access to a KV-v2 secrets store.
pub trait SecretsClient: Send + Sync + 'static {
    /// Read the latest version of the bundle at `path`.
    fn read_secret(&self, path: &str, mount_point: &str) -> VaultResult<SecretData>;

    /// Merge `secret` into an existing bundle. Fails with
    /// `VaultError::PathNotFound` when nothing is stored at `path` yet.
    fn patch_secret(&self, path: &str, secret: &SecretData, mount_point: &str) -> VaultResult<()>;

    /// Write `secret` as the new version of the bundle at `path`.
    fn create_or_update_secret(
        &self,
        path: &str,
        secret: &SecretData,
        mount_point: &str,
    ) -> VaultResult<()>;

    /// Mount paths of all enabled secrets engines, each with a trailing `/`.
    fn list_mounted_secrets_engines(&self) -> VaultResult<Vec<String>>;

    /// Enable a KV version 2 engine at `mount_point`.
    fn enable_kv_engine(&self, mount_point: &str, description: &str) -> VaultResult<()>;

    /// Release the underlying connection. Later calls may fail.
    fn close(&self) {}
}

/// Source of fresh clients, one per unit of work
pub trait SecretsEngine: Send + Sync + 'static {
    type Client: SecretsClient;

    fn connect(&self) -> VaultResult<Self::Client>;
}

/// Run a blocking client call on the blocking thread pool.
pub async fn offload<C, T, F>(client: &Arc<C>, call: F) -> VaultResult<T>
where
    C: SecretsClient + ?Sized,
    T: Send + 'static,
    F: FnOnce(&C) -> VaultResult<T> + Send + 'static,
{
    let client = Arc::clone(client);
    tokio::task::spawn_blocking(move || call(client.as_ref())).await?
}

/// Name a mount point the way the store lists it: slashes stripped, one trailing `/`.
pub fn mount_key(mount_point: &str) -> String {
    format!("{}/", mount_point.replace('/', ""))
}
