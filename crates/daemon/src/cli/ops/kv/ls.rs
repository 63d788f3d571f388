use clap::Args;
use vkv_daemon::http_server::api::client::ApiError;
use vkv_daemon::http_server::api::v0::kv::{ListRequest, ListResponse};

#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Directory to list (defaults to the mount root)
    #[arg(default_value = "")]
    pub prefix: String,
}

#[derive(Debug, thiserror::Error)]
pub enum KvLsError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ls {
    type Error = KvLsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        // listing always works on directories
        let mut prefix = self.prefix.clone();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }

        let response: ListResponse = ctx.client.call(ListRequest { prefix }).await?;

        if response.keys.is_empty() {
            Ok("No keys found".to_string())
        } else {
            Ok(response.keys.join("\n"))
        }
    }
}
