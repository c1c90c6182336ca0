use countersign_core::config::LoadOptions;
use countersign_core::ApplicationId;

use super::context::run_with_context;
use super::lifecycle::TargetArgs;
use super::{finish, CommandFailure, CommandResult};

/// Full application with history, subject to the viewer's visibility.
pub fn run(options: &LoadOptions, args: TargetArgs) -> CommandResult {
    let result = run_with_context(options, |context| async move {
        let viewer = context.actor(&args.actor).await?;
        let id = ApplicationId(args.application_id);
        context.engine.get_application(&id, &viewer).await.map_err(CommandFailure::from)
    });

    finish("show", result)
}
