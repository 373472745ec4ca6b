//! Best-effort unit of work over a HashiCorp Vault KV-v2 secrets store.
//!
//! Writes are queued on a [`VaultSession`] and applied on commit; when a step
//! fails, executed writes are compensated in reverse order. Store calls are
//! blocking and run on tokio's blocking pool.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod repository;
pub mod session;

pub use client::{
    HttpSecretsClient, HttpSecretsEngine, MemorySecrets, SecretData, SecretsClient, SecretsEngine,
    StoreCall,
};
pub use config::VaultSettings;
pub use error::{VaultError, VaultResult};
pub use repository::{ApiKeyVaultRepository, IssuedApiKey, UserApiKey};
pub use session::{OperationFn, VaultOperation, VaultSession, VaultSessionFactory};
