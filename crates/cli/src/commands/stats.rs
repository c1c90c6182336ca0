use chrono::{DateTime, Utc};
use clap::Args;
use countersign_core::config::LoadOptions;
use countersign_core::{ApplicationStatus, Priority, StatisticsFilter};

use super::context::run_with_context;
use super::{finish, CommandFailure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct StatsArgs {
    #[arg(long = "as", value_name = "PRINCIPAL")]
    pub actor: String,
    #[arg(long, value_parser = super::parse_status_arg)]
    pub status: Option<ApplicationStatus>,
    #[arg(long, value_parser = super::parse_priority_arg)]
    pub priority: Option<Priority>,
    #[arg(long, help = "Case-insensitive match against title or content")]
    pub keyword: Option<String>,
    #[arg(long, value_parser = super::parse_date_arg, help = "Created at or after (RFC 3339, or YYYY-MM-DD for midnight UTC)")]
    pub from: Option<DateTime<Utc>>,
    #[arg(long, value_parser = super::parse_end_date_arg, help = "Created at or before (RFC 3339, or YYYY-MM-DD for the end of that day UTC)")]
    pub to: Option<DateTime<Utc>>,
}

impl StatsArgs {
    fn filter(&self) -> StatisticsFilter {
        StatisticsFilter {
            status: self.status,
            priority: self.priority,
            keyword: self.keyword.clone(),
            created_from: self.from,
            created_to: self.to,
        }
    }
}

pub fn run(options: &LoadOptions, args: StatsArgs) -> CommandResult {
    let result = run_with_context(options, |context| async move {
        let viewer = context.actor(&args.actor).await?;
        context.queries.statistics(&viewer, &args.filter()).await.map_err(CommandFailure::from)
    });

    finish("stats", result)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::StatsArgs;

    #[derive(Debug, Parser)]
    struct StatsHarness {
        #[command(flatten)]
        args: StatsArgs,
    }

    #[test]
    fn bare_dates_cover_the_whole_window() {
        let harness = StatsHarness::try_parse_from([
            "stats",
            "--as",
            "A1",
            "--from",
            "2026-03-01",
            "--to",
            "2026-03-01",
        ])
        .expect("parse");
        let filter = harness.args.filter();

        let from = filter.created_from.expect("from");
        let to = filter.created_to.expect("to");
        assert_eq!(from.to_rfc3339(), "2026-03-01T00:00:00+00:00");
        assert_eq!(to.to_rfc3339(), "2026-03-01T23:59:59.999999999+00:00");
    }
}
