//! In-process secrets store.
//!
//! Behaves like a KV-v2 server for the calls the session makes (writes to an
//! unmounted engine or patches of a missing path fail with
//! `PathNotFound`) and records every call so callers can assert on ordering.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{SecretData, SecretsClient, SecretsEngine, mount_key};
use crate::error::{VaultError, VaultResult};

/// One call observed by [`MemorySecrets`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Connect,
    Close,
    ListMounts,
    EnableEngine { mount_point: String },
    Read { mount_point: String, path: String },
    Patch { mount_point: String, path: String, keys: Vec<String> },
    CreateOrUpdate { mount_point: String, path: String, keys: Vec<String> },
}

#[derive(Debug, Default)]
struct State {
    mounts: BTreeSet<String>,
    secrets: BTreeMap<(String, String), SecretData>,
    calls: Vec<StoreCall>,
    failing_write_keys: HashSet<String>,
    failing_read_paths: HashSet<String>,
}

/// Shared handle over an in-memory store; clones see the same data
#[derive(Debug, Clone, Default)]
pub struct MemorySecrets {
    state: Arc<Mutex<State>>,
}

impl MemorySecrets {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enable a KV engine without recording a call
    pub fn mount(&self, mount_point: &str) {
        self.state().mounts.insert(mount_key(mount_point));
    }

    /// Seed a bundle without recording a call, mounting its engine if needed
    pub fn insert(&self, mount_point: &str, path: &str, data: SecretData) {
        let mut state = self.state();
        state.mounts.insert(mount_key(mount_point));
        state.secrets.insert(location(mount_point, path), data);
    }

    /// Current bundle at `path`, bypassing call recording
    pub fn get(&self, mount_point: &str, path: &str) -> Option<SecretData> {
        self.state().secrets.get(&location(mount_point, path)).cloned()
    }

    /// Delete a bundle without recording a call
    pub fn remove(&self, mount_point: &str, path: &str) -> Option<SecretData> {
        self.state().secrets.remove(&location(mount_point, path))
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Make every patch or write whose payload contains `key` fail
    pub fn fail_writes_of_key(&self, key: &str) {
        self.state().failing_write_keys.insert(key.to_string());
    }

    /// Make every read of `path` (under any mount) fail
    pub fn fail_reads_of_path(&self, path: &str) {
        self.state().failing_read_paths.insert(path.to_string());
    }

    fn write(
        &self,
        path: &str,
        secret: &SecretData,
        mount_point: &str,
        merge: bool,
    ) -> VaultResult<()> {
        let mut state = self.state();
        let keys: Vec<String> = secret.keys().cloned().collect();
        let call = if merge {
            StoreCall::Patch {
                mount_point: mount_point.to_string(),
                path: path.to_string(),
                keys: keys.clone(),
            }
        } else {
            StoreCall::CreateOrUpdate {
                mount_point: mount_point.to_string(),
                path: path.to_string(),
                keys: keys.clone(),
            }
        };
        state.calls.push(call);

        if keys.iter().any(|key| state.failing_write_keys.contains(key)) {
            return Err(VaultError::Internal(format!(
                "injected write failure at {}",
                location_label(mount_point, path)
            )));
        }
        if !state.mounts.contains(&mount_key(mount_point)) {
            return Err(VaultError::path_not_found(mount_point, path));
        }

        let slot = location(mount_point, path);
        if merge {
            let existing = state
                .secrets
                .get_mut(&slot)
                .ok_or_else(|| VaultError::path_not_found(mount_point, path))?;
            existing.extend(secret.iter().map(|(k, v)| (k.clone(), v.clone())));
        } else {
            state.secrets.insert(slot, secret.clone());
        }
        Ok(())
    }
}

fn location(mount_point: &str, path: &str) -> (String, String) {
    (
        mount_point.trim_matches('/').to_string(),
        path.trim_matches('/').to_string(),
    )
}

fn location_label(mount_point: &str, path: &str) -> String {
    let (mount, path) = location(mount_point, path);
    format!("{mount}/{path}")
}

impl SecretsClient for MemorySecrets {
    fn read_secret(&self, path: &str, mount_point: &str) -> VaultResult<SecretData> {
        let mut state = self.state();
        state.calls.push(StoreCall::Read {
            mount_point: mount_point.to_string(),
            path: path.to_string(),
        });
        if state.failing_read_paths.contains(path) {
            return Err(VaultError::Internal(format!(
                "injected read failure at {}",
                location_label(mount_point, path)
            )));
        }
        state
            .secrets
            .get(&location(mount_point, path))
            .cloned()
            .ok_or_else(|| VaultError::path_not_found(mount_point, path))
    }

    fn patch_secret(&self, path: &str, secret: &SecretData, mount_point: &str) -> VaultResult<()> {
        self.write(path, secret, mount_point, true)
    }

    fn create_or_update_secret(
        &self,
        path: &str,
        secret: &SecretData,
        mount_point: &str,
    ) -> VaultResult<()> {
        self.write(path, secret, mount_point, false)
    }

    fn list_mounted_secrets_engines(&self) -> VaultResult<Vec<String>> {
        let mut state = self.state();
        state.calls.push(StoreCall::ListMounts);
        Ok(state.mounts.iter().cloned().collect())
    }

    fn enable_kv_engine(&self, mount_point: &str, _description: &str) -> VaultResult<()> {
        let mut state = self.state();
        state.calls.push(StoreCall::EnableEngine {
            mount_point: mount_point.to_string(),
        });
        if !state.mounts.insert(mount_key(mount_point)) {
            return Err(VaultError::InvalidRequest(format!(
                "path is already in use at {}",
                mount_key(mount_point)
            )));
        }
        Ok(())
    }

    fn close(&self) {
        self.state().calls.push(StoreCall::Close);
    }
}

impl SecretsEngine for MemorySecrets {
    type Client = MemorySecrets;

    fn connect(&self) -> VaultResult<MemorySecrets> {
        self.state().calls.push(StoreCall::Connect);
        Ok(self.clone())
    }
}
