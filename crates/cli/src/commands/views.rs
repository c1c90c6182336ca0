use clap::Args;
use countersign_core::config::LoadOptions;

use super::context::run_with_context;
use super::{finish, CommandFailure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct ViewerArgs {
    #[arg(long = "as", value_name = "PRINCIPAL")]
    pub actor: String,
}

pub fn pending(options: &LoadOptions, args: ViewerArgs) -> CommandResult {
    let result = run_with_context(options, |context| async move {
        let viewer = context.actor(&args.actor).await?;
        context.queries.pending_for(&viewer).await.map_err(CommandFailure::from)
    });

    finish("pending", result)
}

pub fn decided(options: &LoadOptions, args: ViewerArgs) -> CommandResult {
    let result = run_with_context(options, |context| async move {
        let viewer = context.actor(&args.actor).await?;
        context.queries.decided_by(&viewer).await.map_err(CommandFailure::from)
    });

    finish("decided", result)
}

pub fn mine(options: &LoadOptions, args: ViewerArgs) -> CommandResult {
    let result = run_with_context(options, |context| async move {
        let viewer = context.actor(&args.actor).await?;
        context.queries.created_by(&viewer).await.map_err(CommandFailure::from)
    });

    finish("mine", result)
}
