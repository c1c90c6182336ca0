use clap::Args;
use countersign_core::config::LoadOptions;
use countersign_core::{ApplicationId, DraftPatch, NewApplication, PrincipalId, Priority};
use rust_decimal::Decimal;

use super::context::run_with_context;
use super::{finish, CommandFailure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct CreateArgs {
    #[arg(long = "as", value_name = "PRINCIPAL", help = "Requester id")]
    pub actor: String,
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub content: String,
    #[arg(long, value_parser = super::parse_amount_arg, help = "Amount, thousands separators allowed")]
    pub amount: Option<Decimal>,
    #[arg(long, value_parser = super::parse_priority_arg, default_value = "normal")]
    pub priority: Priority,
    #[arg(long, help = "Leave the manager stage out of the effective sequence")]
    pub skip_manager: bool,
    #[arg(long, value_name = "PRINCIPAL", help = "Factory manager who reviews first")]
    pub first_approver: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct UpdateArgs {
    #[arg(long = "as", value_name = "PRINCIPAL", help = "Requester or admin")]
    pub actor: String,
    #[arg(value_name = "APPLICATION_ID")]
    pub application_id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub content: Option<String>,
    #[arg(long, value_parser = super::parse_amount_arg)]
    pub amount: Option<Decimal>,
    #[arg(long, value_parser = super::parse_priority_arg)]
    pub priority: Option<Priority>,
    #[arg(long, value_name = "BOOL", help = "true drops the manager stage, false restores it")]
    pub skip_manager: Option<bool>,
    #[arg(long, value_name = "PRINCIPAL")]
    pub first_approver: Option<String>,
}

impl UpdateArgs {
    fn into_patch(self) -> DraftPatch {
        DraftPatch {
            title: self.title,
            content: self.content,
            amount: self.amount,
            priority: self.priority,
            skip_manager_stage: self.skip_manager,
            first_approver_id: self.first_approver.map(PrincipalId::new),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    #[arg(long = "as", value_name = "PRINCIPAL")]
    pub actor: String,
    #[arg(value_name = "APPLICATION_ID")]
    pub application_id: String,
}

#[derive(Debug, Clone, Args)]
pub struct ReassignArgs {
    #[arg(long = "as", value_name = "PRINCIPAL", help = "Admin performing the reassignment")]
    pub actor: String,
    #[arg(value_name = "APPLICATION_ID")]
    pub application_id: String,
    #[arg(long, help = "Zero-based position in the effective stage sequence")]
    pub stage: usize,
    #[arg(long = "to", value_name = "PRINCIPAL")]
    pub new_approver: String,
}

pub fn create(options: &LoadOptions, args: CreateArgs) -> CommandResult {
    let result = run_with_context(options, |context| async move {
        let requester = context.actor(&args.actor).await?;
        let input = NewApplication {
            title: args.title,
            content: args.content,
            amount: args.amount,
            priority: args.priority,
            skip_manager_stage: args.skip_manager,
            first_approver_id: args.first_approver.map(PrincipalId::new),
        };
        context.engine.create_application(&requester, input).await.map_err(CommandFailure::from)
    });

    finish("create", result)
}

pub fn update(options: &LoadOptions, args: UpdateArgs) -> CommandResult {
    let result = run_with_context(options, |context| async move {
        let actor = context.actor(&args.actor).await?;
        let id = ApplicationId(args.application_id.clone());
        context
            .engine
            .update_draft(&id, &actor, args.into_patch())
            .await
            .map_err(CommandFailure::from)
    });

    finish("update", result)
}

pub fn submit(options: &LoadOptions, args: TargetArgs) -> CommandResult {
    let result = run_with_context(options, |context| async move {
        let actor = context.actor(&args.actor).await?;
        let id = ApplicationId(args.application_id);
        context.engine.submit(&id, &actor).await.map_err(CommandFailure::from)
    });

    finish("submit", result)
}

pub fn cancel(options: &LoadOptions, args: TargetArgs) -> CommandResult {
    let result = run_with_context(options, |context| async move {
        let actor = context.actor(&args.actor).await?;
        let id = ApplicationId(args.application_id);
        context.engine.cancel(&id, &actor).await.map_err(CommandFailure::from)
    });

    finish("cancel", result)
}

pub fn reassign(options: &LoadOptions, args: ReassignArgs) -> CommandResult {
    let result = run_with_context(options, |context| async move {
        let actor = context.actor(&args.actor).await?;
        let id = ApplicationId(args.application_id);
        context
            .engine
            .reassign(&id, &actor, args.stage, &PrincipalId::new(args.new_approver))
            .await
            .map_err(CommandFailure::from)
    });

    finish("reassign", result)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use countersign_core::{PrincipalId, Priority};

    use super::UpdateArgs;

    #[derive(Debug, Parser)]
    struct UpdateHarness {
        #[command(flatten)]
        args: UpdateArgs,
    }

    #[test]
    fn update_only_patches_the_flags_given() {
        let harness = UpdateHarness::try_parse_from([
            "update",
            "--as",
            "E1",
            "APP-1",
            "--priority",
            "urgent",
            "--skip-manager",
            "false",
            "--first-approver",
            "F2",
        ])
        .expect("parse");
        let patch = harness.args.into_patch();

        assert_eq!(patch.priority, Some(Priority::Urgent));
        assert_eq!(patch.skip_manager_stage, Some(false));
        assert_eq!(patch.first_approver_id, Some(PrincipalId::new("F2")));
        assert!(patch.title.is_none());
        assert!(patch.amount.is_none());
    }
}
