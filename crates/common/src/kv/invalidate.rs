use super::backend::KvBackend;
use super::config::CONFIG_PATH;
use crate::crypto::POLICY_PATH;
use crate::salt::SALT_PATH;

impl KvBackend {
    /// Drop the cached copy of a well-known record after it changed
    ///  somewhere else. Other keys are ignored.
    pub async fn invalidate(&self, key: &str) {
        match key {
            SALT_PATH => self.inner.salt.invalidate().await,
            POLICY_PATH => self.inner.policy.invalidate().await,
            CONFIG_PATH => self.inner.config.invalidate().await,
            _ => return,
        }
        tracing::debug!("invalidated cached {}", key);
    }
}
