use clap::Args;
use serde_json::{Map, Value};
use vkv_daemon::http_server::api::client::ApiError;
use vkv_daemon::http_server::api::v0::kv::WriteRequest;

#[derive(Args, Debug, Clone)]
pub struct Put {
    /// Key to write
    pub key: String,

    /// Data as a JSON object, e.g. '{"password": "hunter2"}'
    pub data: String,

    /// Only write if the current version matches (0 = key must not exist)
    #[arg(long)]
    pub cas: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum KvPutError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("data must be a JSON object: {0}")]
    InvalidData(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Put {
    type Error = KvPutError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let data: Map<String, Value> = serde_json::from_str(&self.data)
            .map_err(|e| KvPutError::InvalidData(e.to_string()))?;

        let request = WriteRequest {
            key: self.key.clone(),
            data,
            cas: self.cas,
        };
        let response = ctx.client.call(request).await?;

        let mut lines = vec![format!(
            "Wrote {} version {}",
            self.key, response.metadata.version
        )];
        if let Some(deletion_time) = response.metadata.deletion_time {
            lines.push(format!("  expires: {}", deletion_time.to_rfc3339()));
        }
        for warning in &response.warnings {
            lines.push(format!("  warning: {}", warning));
        }
        Ok(lines.join("\n"))
    }
}
