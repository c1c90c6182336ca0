pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use countersign_core::config::{ConfigOverrides, LoadOptions};

use commands::decide::DecideArgs;
use commands::lifecycle::{CreateArgs, ReassignArgs, TargetArgs, UpdateArgs};
use commands::stats::StatsArgs;
use commands::views::ViewerArgs;

#[derive(Debug, Parser)]
#[command(
    name = "countersign",
    about = "Countersign approval workflow CLI",
    long_about = "Create, route and decide multi-stage approval applications. Every command prints one JSON object on stdout.",
    after_help = "Examples:\n  countersign seed\n  countersign create --as E1 --title \"Pump\" --content \"Replace pump 4\" --first-approver F1\n  countersign decide --as D1 APP-20260301-1A2B3C4D --decision approve --next-approver M1\n  countersign pending --as M1"
)]
pub struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Config file (defaults to countersign.toml)")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "URL", help = "Override database.url")]
    pub database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config.clone(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Provision the deterministic demo principals")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Create a draft application")]
    Create(CreateArgs),
    #[command(about = "Edit a draft; changing the skip flag or first approver recomputes stages")]
    Update(UpdateArgs),
    #[command(about = "Submit a draft into review")]
    Submit(TargetArgs),
    #[command(about = "Approve or reject the current stage")]
    Decide(DecideArgs),
    #[command(about = "Rebind a pending stage to another eligible approver (admin only)")]
    Reassign(ReassignArgs),
    #[command(about = "Cancel a draft or in-review application")]
    Cancel(TargetArgs),
    #[command(about = "Show one application with its full history")]
    Show(TargetArgs),
    #[command(about = "Applications waiting on the given principal")]
    Pending(ViewerArgs),
    #[command(about = "Applications the given principal has decided")]
    Decided(ViewerArgs),
    #[command(about = "Applications the given principal requested")]
    Mine(ViewerArgs),
    #[command(about = "Counts and amount sums over visible applications")]
    Stats(StatsArgs),
}

pub fn run(cli: Cli) -> ExitCode {
    let options = cli.load_options();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Config => commands::config::run(&options),
        Command::Create(args) => commands::lifecycle::create(&options, args),
        Command::Update(args) => commands::lifecycle::update(&options, args),
        Command::Submit(args) => commands::lifecycle::submit(&options, args),
        Command::Decide(args) => commands::decide::run(&options, args),
        Command::Reassign(args) => commands::lifecycle::reassign(&options, args),
        Command::Cancel(args) => commands::lifecycle::cancel(&options, args),
        Command::Show(args) => commands::show::run(&options, args),
        Command::Pending(args) => commands::views::pending(&options, args),
        Command::Decided(args) => commands::views::decided(&options, args),
        Command::Mine(args) => commands::views::mine(&options, args),
        Command::Stats(args) => commands::stats::run(&options, args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn decide_parses_nominee_and_global_database_override() {
        let cli = Cli::try_parse_from([
            "countersign",
            "decide",
            "--as",
            "D1",
            "APP-1",
            "--decision",
            "approve",
            "--next-approver",
            "M1",
            "--database-url",
            "sqlite://other.db",
        ])
        .expect("parse");

        assert_eq!(cli.load_options().overrides.database_url.as_deref(), Some("sqlite://other.db"));
        match cli.command {
            Command::Decide(args) => {
                assert_eq!(args.actor, "D1");
                assert_eq!(args.next_approver.as_deref(), Some("M1"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn create_rejects_unknown_priority() {
        let parsed = Cli::try_parse_from([
            "countersign",
            "create",
            "--as",
            "E1",
            "--title",
            "Pump",
            "--content",
            "Replace",
            "--priority",
            "critical",
        ]);

        assert!(parsed.is_err());
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let cli = Cli::try_parse_from(["countersign", "--config", "missing.toml", "config"])
            .expect("parse");

        assert!(cli.load_options().require_file);
    }
}
