use clap::Args;
use countersign_core::config::LoadOptions;
use countersign_core::domain::Decision;
use countersign_core::{ApplicationId, DecisionInput, PrincipalId};

use super::context::run_with_context;
use super::{finish, CommandFailure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct DecideArgs {
    #[arg(long = "as", value_name = "PRINCIPAL")]
    pub actor: String,
    #[arg(value_name = "APPLICATION_ID")]
    pub application_id: String,
    #[arg(long, value_parser = super::parse_decision_arg, help = "approve or reject")]
    pub decision: Decision,
    #[arg(long, help = "Required when rejecting")]
    pub comment: Option<String>,
    #[arg(
        long,
        value_name = "PRINCIPAL",
        help = "Approver for the next stage when this stage routes it"
    )]
    pub next_approver: Option<String>,
}

impl DecideArgs {
    fn into_input(self) -> DecisionInput {
        DecisionInput {
            decision: self.decision,
            comment: self.comment,
            next_approver_id: self.next_approver.map(PrincipalId::new),
        }
    }
}

pub fn run(options: &LoadOptions, args: DecideArgs) -> CommandResult {
    let result = run_with_context(options, |context| async move {
        let actor = context.actor(&args.actor).await?;
        let id = ApplicationId(args.application_id.clone());
        context.engine.decide(&id, &actor, args.into_input()).await.map_err(CommandFailure::from)
    });

    finish("decide", result)
}
