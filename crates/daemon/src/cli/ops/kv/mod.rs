use clap::{Args, Subcommand};

pub mod get;
pub mod ls;
pub mod put;
pub mod rm;

use crate::cli::op::Op;

crate::command_enum! {
    (Get, get::Get),
    (Put, put::Put),
    (Ls, ls::Ls),
    (Rm, rm::Rm),
}

// Rename the generated Command to KvCommand for clarity
pub type KvCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Kv {
    #[command(subcommand)]
    pub command: KvCommand,
}

#[async_trait::async_trait]
impl Op for Kv {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
