//! Integration tests for write ordering when storage fails between steps

mod common;

use std::sync::Arc;

use ::common::kv::{KvError, WriteOptions};
use ::common::storage::MemoryStorage;
use serde_json::json;

#[tokio::test]
async fn test_failure_after_payload_leaves_previous_state_readable() {
    let failing = Arc::new(common::FailingStorage::new(MemoryStorage::new()));
    let kv = common::backend_over(failing.clone());

    kv.write("k", common::data(json!({"v": 1})), WriteOptions::default())
        .await
        .unwrap();

    // payload for version 2 lands, its metadata never does
    failing.fail_puts_under("metadata/");
    let result = kv
        .write("k", common::data(json!({"v": 2})), WriteOptions::default())
        .await;
    assert!(matches!(result, Err(KvError::Storage(_))));
    assert!(common::payload_exists(&failing.inner, "k", 2).await);

    failing.heal();
    let meta = kv.metadata_read("k").await.unwrap().unwrap();
    assert_eq!(meta.current_version, 1);
    assert_eq!(
        kv.read("k", None).await.unwrap().unwrap().data,
        Some(common::data(json!({"v": 1})))
    );

    // the orphan is simply overwritten by the retried write
    let retried = kv
        .write("k", common::data(json!({"v": 2})), WriteOptions::cas(1))
        .await
        .unwrap();
    assert_eq!(retried.metadata.version, 2);
    assert_eq!(
        kv.read("k", None).await.unwrap().unwrap().data,
        Some(common::data(json!({"v": 2})))
    );
}

#[tokio::test]
async fn test_failure_before_payload_changes_nothing() {
    let failing = Arc::new(common::FailingStorage::new(MemoryStorage::new()));
    let kv = common::backend_over(failing.clone());
    kv.write("k", common::data(json!({"v": 1})), WriteOptions::default())
        .await
        .unwrap();

    failing.fail_puts_under("versions/");
    assert!(kv
        .write("k", common::data(json!({"v": 2})), WriteOptions::default())
        .await
        .is_err());
    failing.heal();

    assert_eq!(kv.metadata_read("k").await.unwrap().unwrap().current_version, 1);
    assert!(!common::payload_exists(&failing.inner, "k", 2).await);
}

#[tokio::test]
async fn test_destroy_failure_after_metadata_leaves_nothing_readable() {
    let failing = Arc::new(common::FailingStorage::new(MemoryStorage::new()));
    let kv = common::backend_over(failing.clone());
    kv.write("k", common::data(json!({"v": 1})), WriteOptions::default())
        .await
        .unwrap();

    // metadata says destroyed, the payload delete never happens
    failing.fail_deletes_under("versions/");
    assert!(kv.destroy("k", &[1]).await.is_err());
    failing.heal();

    let read = kv.read("k", Some(1)).await.unwrap().unwrap();
    assert!(read.metadata.destroyed);
    assert!(read.data.is_none());
    // the payload is unreachable rather than readable
    assert!(common::payload_exists(&failing.inner, "k", 1).await);
}

#[tokio::test]
async fn test_eviction_cleanup_failure_becomes_warning() {
    let failing = Arc::new(common::FailingStorage::new(MemoryStorage::new()));
    let kv = common::backend_over(failing.clone());
    kv.metadata_write(
        "k",
        &::common::kv::MetadataUpdate {
            max_versions: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    kv.write("k", common::data(json!({"v": 1})), WriteOptions::default())
        .await
        .unwrap();

    failing.fail_deletes_under("versions/");
    let response = kv
        .write("k", common::data(json!({"v": 2})), WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(response.metadata.version, 2);
    assert_eq!(response.warnings.len(), 1);
    failing.heal();

    // metadata no longer references the orphan
    let meta = kv.metadata_read("k").await.unwrap().unwrap();
    assert_eq!(meta.versions.keys().copied().collect::<Vec<_>>(), vec![2]);
    assert!(kv.read("k", Some(1)).await.unwrap().is_none());
    assert!(common::payload_exists(&failing.inner, "k", 1).await);
}
