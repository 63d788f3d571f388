//! Integration tests for soft-delete, undelete, destroy and metadata removal

mod common;

use ::common::kv::{KvError, MetadataUpdate, WriteOptions};
use serde_json::json;

#[tokio::test]
async fn test_destroy_then_read() {
    let (kv, storage) = common::setup();
    kv.write("c", common::data(json!({"d": 1})), WriteOptions::default())
        .await
        .unwrap();
    assert!(common::payload_exists(&storage, "c", 1).await);

    kv.destroy("c", &[1]).await.unwrap();

    let read = kv.read("c", Some(1)).await.unwrap().unwrap();
    assert!(read.data.is_none());
    assert!(read.metadata.destroyed);
    assert!(!common::payload_exists(&storage, "c", 1).await);
}

#[tokio::test]
async fn test_soft_delete_and_undelete() {
    let (kv, _) = common::setup();
    kv.write("d", common::data(json!({"d": 1})), WriteOptions::default())
        .await
        .unwrap();

    kv.soft_delete("d", &[1]).await.unwrap();
    let read = kv.read("d", Some(1)).await.unwrap().unwrap();
    assert!(read.data.is_none());
    assert!(read.metadata.deletion_time.is_some());
    assert!(!read.metadata.destroyed);

    kv.undelete("d", &[1]).await.unwrap();
    let read = kv.read("d", Some(1)).await.unwrap().unwrap();
    assert_eq!(read.data, Some(common::data(json!({"d": 1}))));
    assert!(read.metadata.deletion_time.is_none());
}

#[tokio::test]
async fn test_soft_delete_keeps_first_deletion_time() {
    let (kv, _) = common::setup();
    kv.write("d", common::data(json!({"d": 1})), WriteOptions::default())
        .await
        .unwrap();

    kv.soft_delete("d", &[1]).await.unwrap();
    let first = kv.metadata_read("d").await.unwrap().unwrap().versions[&1].deletion_time;

    kv.soft_delete("d", &[1]).await.unwrap();
    let second = kv.metadata_read("d").await.unwrap().unwrap().versions[&1].deletion_time;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_destroyed_is_terminal() {
    let (kv, _) = common::setup();
    kv.write("t", common::data(json!({"d": 1})), WriteOptions::default())
        .await
        .unwrap();
    kv.soft_delete("t", &[1]).await.unwrap();
    kv.destroy("t", &[1]).await.unwrap();

    // undelete does not resurrect a destroyed version
    kv.undelete("t", &[1]).await.unwrap();
    let read = kv.read("t", Some(1)).await.unwrap().unwrap();
    assert!(read.data.is_none());
    assert!(read.metadata.destroyed);

    // a new write still works and is live
    let written = kv
        .write("t", common::data(json!({"d": 2})), WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(written.metadata.version, 2);
    assert!(kv.read("t", None).await.unwrap().unwrap().data.is_some());
}

#[tokio::test]
async fn test_missing_versions_and_keys_are_skipped() {
    let (kv, _) = common::setup();
    kv.soft_delete("nothing", &[1]).await.unwrap();
    kv.undelete("nothing", &[1]).await.unwrap();
    kv.destroy("nothing", &[1]).await.unwrap();
    kv.delete_latest("nothing").await.unwrap();
    kv.metadata_delete("nothing").await.unwrap();

    kv.write("k", common::data(json!({"d": 1})), WriteOptions::default())
        .await
        .unwrap();
    kv.destroy("k", &[7, 9]).await.unwrap();
    assert!(kv.read("k", None).await.unwrap().unwrap().data.is_some());
}

#[tokio::test]
async fn test_delete_latest_only_hits_current_version() {
    let (kv, _) = common::setup();
    for i in 1..=2 {
        kv.write("k", common::data(json!({ "i": i })), WriteOptions::default())
            .await
            .unwrap();
    }

    kv.delete_latest("k").await.unwrap();
    assert!(kv.read("k", None).await.unwrap().unwrap().data.is_none());
    assert!(kv.read("k", Some(1)).await.unwrap().unwrap().data.is_some());
}

#[tokio::test]
async fn test_metadata_delete_removes_everything() {
    let (kv, storage) = common::setup();
    for i in 1..=3 {
        kv.write("gone", common::data(json!({ "i": i })), WriteOptions::default())
            .await
            .unwrap();
    }
    kv.destroy("gone", &[2]).await.unwrap();

    kv.metadata_delete("gone").await.unwrap();

    assert!(kv.metadata_read("gone").await.unwrap().is_none());
    assert!(kv.read("gone", None).await.unwrap().is_none());
    for v in 1..=3 {
        assert!(!common::payload_exists(&storage, "gone", v).await);
    }
    assert!(kv.metadata_list("").await.unwrap().is_empty());

    // the key starts over from version 1
    let written = kv
        .write("gone", common::data(json!({"i": 4})), WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(written.metadata.version, 1);
}

#[tokio::test]
async fn test_metadata_write_only_touches_given_fields() {
    let (kv, _) = common::setup();
    kv.metadata_write(
        "m",
        &MetadataUpdate {
            max_versions: Some(4),
            cas_required: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let meta = kv
        .metadata_write(
            "m",
            &MetadataUpdate {
                custom_metadata: Some([("env".to_string(), "prod".to_string())].into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(meta.max_versions, 4);
    assert!(meta.cas_required);
    assert_eq!(meta.custom_metadata.get("env").map(String::as_str), Some("prod"));
    assert_eq!(meta.current_version, 0);
    assert!(meta.versions.is_empty());
}

#[tokio::test]
async fn test_subkeys_strip_values() {
    let (kv, _) = common::setup();
    kv.write(
        "s",
        common::data(json!({"user": "admin", "db": {"host": "x", "port": 5432}})),
        WriteOptions::default(),
    )
    .await
    .unwrap();

    let all = kv.subkeys("s", None, 0).await.unwrap().unwrap();
    assert_eq!(
        all.subkeys,
        Some(common::data(json!({"user": null, "db": {"host": null, "port": null}})))
    );
    assert_eq!(all.metadata.version, 1);

    let top = kv.subkeys("s", Some(1), 1).await.unwrap().unwrap();
    assert_eq!(top.subkeys, Some(common::data(json!({"user": null, "db": null}))));

    assert!(kv.subkeys("missing", None, 0).await.unwrap().is_none());

    kv.soft_delete("s", &[1]).await.unwrap();
    let deleted = kv.subkeys("s", None, 0).await.unwrap().unwrap();
    assert!(deleted.subkeys.is_none());
}

#[tokio::test]
async fn test_missing_payload_is_an_invariant_violation() {
    let (kv, storage) = common::setup();
    kv.write("broken", common::data(json!({"d": 1})), WriteOptions::default())
        .await
        .unwrap();

    // remove the payload behind the engine's back
    let salt = ::common::storage::Storage::get(&storage, "salt")
        .await
        .unwrap()
        .unwrap();
    let salt = ::common::salt::Salt::from_slice(&salt.value).unwrap();
    ::common::storage::Storage::delete(&storage, &salt.version_path("broken", 1))
        .await
        .unwrap();

    let result = kv.read("broken", None).await;
    assert!(matches!(
        result,
        Err(KvError::MissingVersionData { version: 1, .. })
    ));
}
