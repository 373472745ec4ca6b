//! Session state and the operations that enqueue or read

use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use super::operation::{OperationFn, VaultOperation};
use crate::client::{SecretData, SecretsClient, offload};
use crate::error::VaultResult;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

#[inline]
fn next_session_id() -> u64 {
    SESSION_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Best-effort unit of work over a secrets store.
///
/// Writes are queued and only reach the store on [`flush`](Self::flush) or
/// [`commit`](Self::commit). If a later step fails, [`rollback`](Self::rollback)
/// runs the compensating action of every executed operation, newest first.
/// Nothing here is atomic or durable: a crash or a cancelled task mid-flush
/// leaves already executed writes in place, and a compensation can itself
/// fail (it is logged and skipped). Treat rollback as cleanup, not as a
/// consistency guarantee.
///
/// A session belongs to a single task; share nothing between units of work.
pub struct VaultSession<C: SecretsClient> {
    pub(super) id: u64,
    pub(super) client: Arc<C>,
    pub(super) operations: Vec<VaultOperation>,
    pub(super) committed: bool,
}

impl<C: SecretsClient> VaultSession<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            id: next_session_id(),
            client,
            operations: Vec::with_capacity(4),
            committed: false,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    #[inline]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Queued operations in execution order
    #[inline]
    pub fn operations(&self) -> &[VaultOperation] {
        &self.operations
    }

    #[inline]
    pub fn pending_operations(&self) -> usize {
        self.operations.iter().filter(|op| !op.is_executed()).count()
    }

    /// Queue an arbitrary action and its optional compensation.
    ///
    /// Enqueuing reopens a committed session: the new work is uncommitted,
    /// so a later [`close`](Self::close) compensates it.
    pub fn add_operation(
        &mut self,
        mount_point: impl Into<String>,
        execute: OperationFn,
        rollback: Option<OperationFn>,
    ) {
        self.operations
            .push(VaultOperation::new(mount_point, execute, rollback));
        self.committed = false;
    }

    /// Queue a write of `key = value` into the bundle at `path`.
    ///
    /// On flush the key is patched into an existing bundle; when the store
    /// reports the path missing, the bundle is created instead. Rolling back
    /// rereads the bundle and rewrites it without `key`, leaving sibling keys
    /// and their values untouched.
    pub fn create_or_patch(
        &mut self,
        path: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        mount_point: impl Into<String>,
    ) {
        let path: Arc<str> = Arc::from(path.into());
        let key: Arc<str> = Arc::from(key.into());
        let value: Arc<str> = Arc::from(value.into());
        let mount_point: String = mount_point.into();
        let mount: Arc<str> = Arc::from(mount_point.as_str());

        let execute: OperationFn = {
            let client = Arc::clone(&self.client);
            let (path, key, value, mount) = (path.clone(), key.clone(), value, mount.clone());
            Box::new(move || {
                let client = Arc::clone(&client);
                let (path, key, value, mount) =
                    (path.clone(), key.clone(), value.clone(), mount.clone());
                async move {
                    offload(&client, move |store| {
                        let secret =
                            SecretData::from([(key.to_string(), Value::String(value.to_string()))]);
                        info!(mount_point = %mount, path = %path, "Patching KV data");
                        match store.patch_secret(&path, &secret, &mount) {
                            Err(err) if err.is_path_not_found() => {
                                info!(mount_point = %mount, path = %path, "Creating KV pair");
                                store.create_or_update_secret(&path, &secret, &mount)
                            }
                            other => other,
                        }
                    })
                    .await
                }
                .boxed()
            })
        };

        let rollback: OperationFn = {
            let client = Arc::clone(&self.client);
            Box::new(move || {
                let client = Arc::clone(&client);
                let (path, key, mount) = (path.clone(), key.clone(), mount.clone());
                async move {
                    offload(&client, move |store| {
                        let mut current = match store.read_secret(&path, &mount) {
                            Ok(current) => current,
                            Err(err) if err.is_path_not_found() => return Ok(()),
                            Err(err) => return Err(err),
                        };
                        if current.remove(key.as_ref()).is_some() {
                            debug!(mount_point = %mount, path = %path, "Removing rolled back key");
                            store.create_or_update_secret(&path, &current, &mount)?;
                        }
                        Ok(())
                    })
                    .await
                }
                .boxed()
            })
        };

        self.add_operation(mount_point, execute, Some(rollback));
    }

    /// Read the bundle at `path` right away, bypassing the queue.
    pub async fn read_secret(&self, path: &str, mount_point: &str) -> VaultResult<SecretData> {
        let path = path.to_string();
        let mount_point = mount_point.to_string();
        offload(&self.client, move |store| store.read_secret(&path, &mount_point)).await
    }

    pub(super) fn clear(&mut self) {
        self.operations.clear();
        self.committed = false;
    }
}

impl<C: SecretsClient> std::fmt::Debug for VaultSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("id", &self.id)
            .field("operations", &self.operations)
            .field("committed", &self.committed)
            .finish()
    }
}
