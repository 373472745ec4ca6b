//! Flush, commit and rollback of queued operations

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::core::VaultSession;
use crate::client::{SecretsClient, mount_key, offload};
use crate::error::VaultResult;

impl<C: SecretsClient> VaultSession<C> {
    /// Execute queued operations in insertion order without committing.
    ///
    /// Every distinct mount point is checked (and its KV-v2 engine enabled
    /// if missing) once, before any operation runs. Stops at the first
    /// failing operation; earlier ones stay executed and are not undone here.
    pub async fn flush(&mut self) -> VaultResult<()> {
        let mut mount_points: Vec<String> = Vec::new();
        for op in &self.operations {
            if !mount_points.iter().any(|m| m == op.mount_point()) {
                mount_points.push(op.mount_point().to_string());
            }
        }
        for mount_point in mount_points {
            self.ensure_mount_point(mount_point).await?;
        }

        for (index, op) in self.operations.iter_mut().enumerate() {
            op.run().await?;
            debug!(session = self.id, index, "Vault operation executed");
        }
        Ok(())
    }

    /// Flush and clear. On failure everything executed so far is rolled
    /// back and the flush error is returned; the rollback itself may have
    /// been partial.
    pub async fn commit(&mut self) -> VaultResult<()> {
        info!(
            session = self.id,
            operations = self.operations.len(),
            "Committing Vault operations"
        );
        if let Err(err) = self.flush().await {
            info!(session = self.id, error = %err, "Vault operations failed, rolling back");
            self.rollback().await;
            return Err(err);
        }
        self.clear();
        self.committed = true;
        info!(session = self.id, "Vault operations committed");
        Ok(())
    }

    /// Undo executed operations newest first. Failures are logged and the
    /// remaining compensations still run.
    pub async fn rollback(&mut self) {
        for (index, op) in self.operations.iter_mut().enumerate().rev() {
            if let Err(err) = op.undo().await {
                warn!(
                    session = self.id,
                    index,
                    mount_point = op.mount_point(),
                    error = %err,
                    "Rollback failed"
                );
            }
        }
    }

    /// Roll back unless committed, then drop all queued operations.
    pub async fn close(&mut self) {
        if !self.committed {
            self.rollback().await;
        }
        self.clear();
    }

    /// [`close`](Self::close), then release the underlying client.
    pub async fn disconnect(mut self) {
        self.close().await;
        let client = Arc::clone(&self.client);
        drop(self);
        if let Err(err) = tokio::task::spawn_blocking(move || {
            client.close();
            drop(client);
        })
        .await
        {
            warn!(error = %err, "Closing the Vault client failed");
        }
    }

    async fn ensure_mount_point(&self, mount_point: String) -> VaultResult<()> {
        let key = mount_key(&mount_point);
        let mounts = offload(&self.client, |store| store.list_mounted_secrets_engines()).await?;
        if mounts.iter().any(|m| *m == key) {
            return Ok(());
        }

        info!(session = self.id, mount_point = %mount_point, "Creating KV engine");
        offload(&self.client, move |store| {
            store.enable_kv_engine(&mount_point, &format!("KV engine for {mount_point}"))
        })
        .await
    }
}
