//! Deferred store action paired with its compensating action

use futures::future::BoxFuture;
use std::fmt;

use crate::error::VaultResult;

/// Zero-argument async action against the store
pub type OperationFn = Box<dyn Fn() -> BoxFuture<'static, VaultResult<()>> + Send + Sync>;

/// One queued unit of a [`VaultSession`](super::VaultSession)
pub struct VaultOperation {
    execute: OperationFn,
    rollback: Option<OperationFn>,
    mount_point: String,
    is_executed: bool,
    is_rolled_back: bool,
}

impl VaultOperation {
    pub fn new(
        mount_point: impl Into<String>,
        execute: OperationFn,
        rollback: Option<OperationFn>,
    ) -> Self {
        Self {
            execute,
            rollback,
            mount_point: mount_point.into(),
            is_executed: false,
            is_rolled_back: false,
        }
    }

    /// Execute once. A failed attempt leaves the operation unexecuted.
    pub async fn run(&mut self) -> VaultResult<()> {
        if !self.is_executed {
            (self.execute)().await?;
            self.is_executed = true;
        }
        Ok(())
    }

    /// Compensate an executed operation, at most once.
    pub async fn undo(&mut self) -> VaultResult<()> {
        if !self.is_executed || self.is_rolled_back {
            return Ok(());
        }
        if let Some(rollback) = &self.rollback {
            rollback().await?;
            self.is_rolled_back = true;
        }
        Ok(())
    }

    #[inline]
    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    #[inline]
    pub fn is_executed(&self) -> bool {
        self.is_executed
    }

    #[inline]
    pub fn is_rolled_back(&self) -> bool {
        self.is_rolled_back
    }

    #[inline]
    pub fn has_rollback(&self) -> bool {
        self.rollback.is_some()
    }
}

impl fmt::Debug for VaultOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultOperation")
            .field("mount_point", &self.mount_point)
            .field("has_rollback", &self.has_rollback())
            .field("is_executed", &self.is_executed)
            .field("is_rolled_back", &self.is_rolled_back)
            .finish()
    }
}
