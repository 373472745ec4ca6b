//! Scoped acquisition of sessions

use futures::FutureExt;
use futures::future::BoxFuture;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Arc;
use tracing::debug;

use super::core::VaultSession;
use crate::client::SecretsEngine;
use crate::error::VaultResult;

/// Hands out sessions, each over a freshly connected client
pub struct VaultSessionFactory<E: SecretsEngine> {
    engine: Arc<E>,
}

impl<E: SecretsEngine> Clone for VaultSessionFactory<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<E: SecretsEngine> VaultSessionFactory<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Connect a new client and wrap it in an empty session.
    ///
    /// The caller owns cleanup: finish with
    /// [`VaultSession::disconnect`] or prefer [`scope`](Self::scope).
    pub async fn open(&self) -> VaultResult<VaultSession<E::Client>> {
        let engine = Arc::clone(&self.engine);
        let client = tokio::task::spawn_blocking(move || engine.connect()).await??;
        let session = VaultSession::new(Arc::new(client));
        debug!(session = session.id(), "Vault session opened");
        Ok(session)
    }

    /// Run `body` inside a fresh session.
    ///
    /// Whatever way the body ends (success, error or panic) the session is
    /// rolled back unless it committed, cleared, and its client released.
    /// Errors are returned as they are; panics resume after cleanup.
    ///
    /// ```ignore
    /// factory
    ///     .scope(|session| {
    ///         async move {
    ///             session.create_or_patch(user_id, key_id, value, "api-keys");
    ///             session.commit().await
    ///         }
    ///         .boxed()
    ///     })
    ///     .await?;
    /// ```
    pub async fn scope<T, F>(&self, body: F) -> VaultResult<T>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut VaultSession<E::Client>) -> BoxFuture<'s, VaultResult<T>>,
    {
        let mut session = self.open().await?;
        let outcome = AssertUnwindSafe(body(&mut session)).catch_unwind().await;

        if !matches!(outcome, Ok(Ok(_))) {
            session.rollback().await;
        }
        let id = session.id();
        session.disconnect().await;
        debug!(session = id, "Vault session closed");

        match outcome {
            Ok(result) => result,
            Err(panic) => resume_unwind(panic),
        }
    }
}
