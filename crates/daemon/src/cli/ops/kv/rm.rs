use clap::Args;
use vkv_daemon::http_server::api::client::ApiError;
use vkv_daemon::http_server::api::v0::kv::{
    DeleteLatestRequest, MetadataDeleteRequest, VersionAction, VersionsRequest,
};

#[derive(Args, Debug, Clone)]
pub struct Rm {
    /// Key to remove
    pub key: String,

    /// Versions to act on (defaults to the latest)
    #[arg(long, value_delimiter = ',')]
    pub versions: Vec<u64>,

    /// Permanently destroy the versions instead of soft deleting them
    #[arg(long, conflicts_with = "all")]
    pub destroy: bool,

    /// Remove the key entirely: every version and its metadata
    #[arg(long, conflicts_with = "versions")]
    pub all: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum KvRmError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("--destroy needs explicit --versions")]
    DestroyWithoutVersions,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Rm {
    type Error = KvRmError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let key = self.key.clone();

        if self.all {
            ctx.client.call(MetadataDeleteRequest { key }).await?;
            return Ok(format!("Removed {} and all of its versions", self.key));
        }

        if self.versions.is_empty() {
            if self.destroy {
                return Err(KvRmError::DestroyWithoutVersions);
            }
            ctx.client.call(DeleteLatestRequest { key }).await?;
            return Ok(format!("Deleted latest version of {}", self.key));
        }

        let action = if self.destroy {
            VersionAction::Destroy
        } else {
            VersionAction::Delete
        };
        ctx.client
            .call(VersionsRequest {
                action,
                key,
                versions: self.versions.clone(),
            })
            .await?;

        let verb = if self.destroy { "Destroyed" } else { "Deleted" };
        let versions = self
            .versions
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("{} versions {} of {}", verb, versions, self.key))
    }
}
