use clap::Args;
use vkv_daemon::http_server::api::client::ApiError;
use vkv_daemon::http_server::api::v0::kv::ReadRequest;

#[derive(Args, Debug, Clone)]
pub struct Get {
    /// Key to read
    pub key: String,

    /// Version to read (defaults to latest)
    #[arg(long)]
    pub version: Option<u64>,

    /// Print the version metadata along with the data
    #[arg(long)]
    pub metadata: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum KvGetError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Get {
    type Error = KvGetError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let request = ReadRequest {
            key: self.key.clone(),
            version: self.version,
        };

        let secret = match ctx.client.call(request).await {
            Ok(secret) => secret,
            Err(e) if e.is_not_found() => {
                return Ok(format!("No value found at {}", self.key));
            }
            Err(e) => return Err(e.into()),
        };

        if self.metadata {
            Ok(serde_json::to_string_pretty(&secret)?)
        } else {
            Ok(serde_json::to_string_pretty(&secret.data)?)
        }
    }
}
