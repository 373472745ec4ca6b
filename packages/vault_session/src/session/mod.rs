//! Vault unit of work
//!
//! This module is decomposed into:
//! - `operation`: a deferred action and its compensation
//! - `core`: session state, enqueueing and immediate reads
//! - `execution`: flush, commit, rollback and close
//! - `scope`: session factory and scoped acquisition

pub mod core;
pub mod execution;
pub mod operation;
pub mod scope;

pub use self::core::VaultSession;
pub use operation::{OperationFn, VaultOperation};
pub use scope::VaultSessionFactory;
