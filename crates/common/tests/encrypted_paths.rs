//! Property tests for the encrypted key namespace

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use ::common::crypto::Policy;
use ::common::storage::{EncryptedKeyStorage, MemoryStorage, Storage, StorageEntry};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.\\- ]{1,12}"
}

fn path() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..5).prop_map(|segments| segments.join("/"))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_paths_round_trip(path in path()) {
        runtime().block_on(async {
            let backing = MemoryStorage::new();
            let storage = EncryptedKeyStorage::metadata(
                Arc::new(backing.clone()),
                Arc::new(Policy::generate("metadata")),
            );

            storage.put(&StorageEntry::new(path.clone(), b"v".to_vec())).await.unwrap();

            let entry = storage.get(&path).await.unwrap().unwrap();
            assert_eq!(entry.key, path);

            // walking the listing back down reconstructs the logical path
            let mut prefix = String::new();
            let segments: Vec<&str> = path.split('/').collect();
            for (i, segment) in segments.iter().enumerate() {
                let children = storage.list(&prefix).await.unwrap();
                let expected = if i + 1 == segments.len() {
                    segment.to_string()
                } else {
                    format!("{}/", segment)
                };
                assert_eq!(children, vec![expected.clone()]);
                prefix.push_str(&expected);
            }

            // no plaintext segment longer than the base64 alphabet noise
            //  shows up verbatim in the stored key
            let stored = backing.keys();
            assert_eq!(stored.len(), 1);
            for segment in segments.iter().filter(|s| s.len() >= 4) {
                assert!(!stored[0].contains(*segment));
            }
        });
    }

    #[test]
    fn prop_list_returns_immediate_children(
        names in prop::collection::btree_set("[a-z]{1,6}", 1..8),
        nested in prop::collection::btree_set("[a-z]{1,6}", 0..4),
    ) {
        runtime().block_on(async {
            let storage = EncryptedKeyStorage::metadata(
                Arc::new(MemoryStorage::new()),
                Arc::new(Policy::generate("metadata")),
            );

            for name in &names {
                storage.put(&StorageEntry::new(format!("p/{}", name), b"v".to_vec())).await.unwrap();
            }
            for name in &nested {
                storage.put(&StorageEntry::new(format!("p/{}/leaf", name), b"v".to_vec())).await.unwrap();
            }

            let mut expected: BTreeSet<String> = names.iter().cloned().collect();
            expected.extend(nested.iter().map(|n| format!("{}/", n)));

            let listed: BTreeSet<String> = storage.list("p/").await.unwrap().into_iter().collect();
            assert_eq!(listed, expected);
        });
    }
}
