use countersign_core::config::LoadOptions;
use countersign_db::DemoSeedDataset;
use serde::Serialize;

use super::context::run_with_context;
use super::{finish, CommandFailure, CommandResult};

#[derive(Debug, Serialize)]
struct SeedOutput {
    principals: Vec<SeededPrincipal>,
}

#[derive(Debug, Serialize)]
struct SeededPrincipal {
    id: String,
    display_name: String,
    role: String,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let result = run_with_context(options, |context| async move {
        DemoSeedDataset::load(&context.pool)
            .await
            .map_err(|error| CommandFailure::new("seed_execution", error.to_string(), 5))?;

        let verification = DemoSeedDataset::verify(&context.pool)
            .await
            .map_err(|error| CommandFailure::new("seed_verification", error.to_string(), 6))?;
        if !verification.all_present {
            return Err(CommandFailure::new(
                "seed_verification",
                verification_message(&verification.checks),
                6,
            ));
        }

        let principals = DemoSeedDataset::principals()
            .into_iter()
            .map(|principal| SeededPrincipal {
                id: principal.id.0,
                display_name: principal.display_name,
                role: principal.role.as_str().to_string(),
            })
            .collect();
        Ok(SeedOutput { principals })
    });

    finish("seed", result)
}

fn verification_message(checks: &[(&str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();

    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for principals: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks = [("E1", true), ("D1", false), ("C1", false)];

        assert_eq!(verification_message(&checks), "Seed verification failed for principals: D1, C1");
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        let checks = [("E1", true), ("A1", true)];

        assert_eq!(verification_message(&checks), "Some seed data failed to load");
    }
}
