use std::collections::BTreeSet;

use tokio::sync::RwLock;

/// Number of lock stripes
pub const LOCK_COUNT: usize = 256;

/// Fixed set of read/write locks striped by a hash of the logical key
///
/// Two keys share a lock only when the first byte of their BLAKE3 hashes
///  match. Anything that needs to hold more than one key lock at a time
///  must acquire them through [`LockSet::locks_for`], which hands them out
///  in index order.
#[derive(Debug)]
pub struct LockSet {
    locks: Vec<RwLock<()>>,
}

impl Default for LockSet {
    fn default() -> Self {
        Self::new()
    }
}

impl LockSet {
    pub fn new() -> Self {
        Self {
            locks: (0..LOCK_COUNT).map(|_| RwLock::new(())).collect(),
        }
    }

    /// Stripe index for `key`
    pub fn index_for(key: &str) -> usize {
        let hash = blake3::hash(key.as_bytes());
        hash.as_bytes()[0] as usize % LOCK_COUNT
    }

    pub fn lock_for(&self, key: &str) -> &RwLock<()> {
        &self.locks[Self::index_for(key)]
    }

    /// Distinct locks covering `keys`, ordered by stripe index
    pub fn locks_for<'a, I>(&self, keys: I) -> Vec<&RwLock<()>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter()
            .map(Self::index_for)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|i| &self.locks[i])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_for_is_stable() {
        let locks = LockSet::new();
        assert!(std::ptr::eq(locks.lock_for("a/b"), locks.lock_for("a/b")));
        assert_eq!(LockSet::index_for("a/b"), LockSet::index_for("a/b"));
    }

    #[test]
    fn test_locks_for_dedups_and_orders() {
        let locks = LockSet::new();
        let keys = ["one", "two", "three", "one", "four"];

        let acquired = locks.locks_for(keys.iter().copied());
        let mut expected: Vec<usize> = keys.iter().map(|k| LockSet::index_for(k)).collect();
        expected.sort();
        expected.dedup();
        assert_eq!(acquired.len(), expected.len());

        for (lock, index) in acquired.iter().zip(expected) {
            assert!(std::ptr::eq(*lock, &locks.locks[index]));
        }
    }

    #[tokio::test]
    async fn test_write_lock_excludes_readers() {
        let locks = LockSet::new();
        let guard = locks.lock_for("k").write().await;
        assert!(locks.lock_for("k").try_read().is_err());
        drop(guard);
        assert!(locks.lock_for("k").try_read().is_ok());
    }
}
