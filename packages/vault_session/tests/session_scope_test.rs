//! Scoped acquisition: every exit path rolls back uncommitted work and
//! releases the client.

use futures::FutureExt;
use serde_json::json;
use vault_session::logging;
use vault_session::{
    MemorySecrets, SecretData, StoreCall, VaultError, VaultResult, VaultSession,
    VaultSessionFactory,
};

const MOUNT: &str = "api-keys";

fn factory_over(store: &MemorySecrets) -> VaultSessionFactory<MemorySecrets> {
    logging::init_test();
    VaultSessionFactory::new(store.clone())
}

async fn store_and_commit(session: &mut VaultSession<MemorySecrets>) -> VaultResult<u64> {
    session.create_or_patch("user-1", "k", "v", MOUNT);
    session.commit().await?;
    Ok(session.id())
}

async fn flush_then_fail(session: &mut VaultSession<MemorySecrets>) -> VaultResult<()> {
    session.create_or_patch("user-1", "k", "v", MOUNT);
    session.flush().await?;
    Err(VaultError::InvalidRequest("downstream step failed".to_string()))
}

async fn flush_without_commit(session: &mut VaultSession<MemorySecrets>) -> VaultResult<()> {
    session.create_or_patch("user-1", "k", "v", MOUNT);
    session.flush().await
}

async fn flush_then_panic(session: &mut VaultSession<MemorySecrets>) -> VaultResult<()> {
    session.create_or_patch("user-1", "k", "v", MOUNT);
    session.flush().await?;
    panic!("handler crashed after flush");
}

#[tokio::test(flavor = "multi_thread")]
async fn scope_connects_commits_and_releases() {
    let store = MemorySecrets::new();
    let factory = factory_over(&store);

    factory
        .scope(|session| store_and_commit(session).boxed())
        .await
        .expect("scope succeeds");

    let calls = store.calls();
    assert_eq!(calls.first(), Some(&StoreCall::Connect));
    assert_eq!(calls.last(), Some(&StoreCall::Close));
    assert_eq!(
        store.get(MOUNT, "user-1"),
        Some(SecretData::from([("k".to_string(), json!("v"))]))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn each_scope_gets_a_fresh_session() {
    let store = MemorySecrets::new();
    let factory = factory_over(&store);

    let first = factory
        .scope(|session| store_and_commit(session).boxed())
        .await
        .expect("first scope");
    let second = factory
        .scope(|session| store_and_commit(session).boxed())
        .await
        .expect("second scope");

    assert_ne!(first, second);
    let connects = store
        .calls()
        .iter()
        .filter(|call| matches!(call, StoreCall::Connect))
        .count();
    assert_eq!(connects, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn body_error_rolls_back_and_is_returned() {
    let store = MemorySecrets::new();
    let factory = factory_over(&store);

    let err = factory
        .scope(|session| flush_then_fail(session).boxed())
        .await
        .expect_err("body fails");

    assert!(matches!(err, VaultError::InvalidRequest(ref m) if m == "downstream step failed"));
    assert_eq!(store.get(MOUNT, "user-1"), Some(SecretData::new()));
    assert_eq!(store.calls().last(), Some(&StoreCall::Close));
}

#[tokio::test(flavor = "multi_thread")]
async fn uncommitted_success_is_rolled_back_on_exit() {
    let store = MemorySecrets::new();
    let factory = factory_over(&store);

    factory
        .scope(|session| flush_without_commit(session).boxed())
        .await
        .expect("body succeeds");

    assert_eq!(store.get(MOUNT, "user-1"), Some(SecretData::new()));
}

#[tokio::test(flavor = "multi_thread")]
async fn panic_in_body_still_cleans_up() {
    let store = MemorySecrets::new();
    let factory = factory_over(&store);

    let handle = tokio::spawn(async move {
        factory
            .scope(|session| flush_then_panic(session).boxed())
            .await
    });
    let join_err = handle.await.expect_err("panic propagates");
    assert!(join_err.is_panic());

    assert_eq!(store.get(MOUNT, "user-1"), Some(SecretData::new()));
    assert_eq!(store.calls().last(), Some(&StoreCall::Close));
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_open_and_disconnect() {
    let store = MemorySecrets::new();
    let factory = factory_over(&store);

    let mut session = factory.open().await.expect("open");
    session.create_or_patch("user-1", "k", "v", MOUNT);
    session.flush().await.expect("flush");
    session.disconnect().await;

    assert_eq!(store.get(MOUNT, "user-1"), Some(SecretData::new()));
    assert_eq!(store.calls().last(), Some(&StoreCall::Close));
}
