use std::env;
use std::fs;
use std::path::Path;

use countersign_core::config::{resolve_config_path, LoadOptions};
use serde::Serialize;
use toml::Value;

use super::context::load_config;
use super::CommandResult;

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    precedence: &'static str,
    config_file: Option<String>,
    entries: Vec<ConfigEntry>,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return failure.into_result("config"),
    };

    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let sources = SourceLookup { doc: config_file_doc.as_ref(), path: config_file_path.as_deref() };

    let unset = || "<unset>".to_string();
    let mut entries = vec![
        sources.entry("database.url", config.database.url.clone(), &["COUNTERSIGN_DATABASE_URL"]),
        sources.entry(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["COUNTERSIGN_DATABASE_MAX_CONNECTIONS"],
        ),
        sources.entry(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["COUNTERSIGN_DATABASE_TIMEOUT_SECS"],
        ),
        sources.entry(
            "workflow.director_approver_id",
            config.workflow.director_approver_id.clone().unwrap_or_else(unset),
            &["COUNTERSIGN_WORKFLOW_DIRECTOR_APPROVER_ID"],
        ),
        sources.entry(
            "workflow.ceo_approver_id",
            config.workflow.ceo_approver_id.clone().unwrap_or_else(unset),
            &["COUNTERSIGN_WORKFLOW_CEO_APPROVER_ID"],
        ),
        sources.entry(
            "workflow.require_manager_nominee_distinct_from_requester",
            config.workflow.require_manager_nominee_distinct_from_requester.to_string(),
            &["COUNTERSIGN_WORKFLOW_REQUIRE_DISTINCT_NOMINEE"],
        ),
        sources.entry(
            "logging.level",
            config.logging.level.clone(),
            &["COUNTERSIGN_LOGGING_LEVEL", "COUNTERSIGN_LOG_LEVEL"],
        ),
        sources.entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["COUNTERSIGN_LOGGING_FORMAT", "COUNTERSIGN_LOG_FORMAT"],
        ),
    ];

    let overrides = &options.overrides;
    for (key, overridden) in [
        ("database.url", overrides.database_url.is_some()),
        ("logging.level", overrides.log_level.is_some()),
        ("workflow.director_approver_id", overrides.director_approver_id.is_some()),
        ("workflow.ceo_approver_id", overrides.ceo_approver_id.is_some()),
    ] {
        if let Some(entry) = entries.iter_mut().find(|entry| overridden && entry.key == key) {
            entry.source = "override".to_string();
        }
    }

    CommandResult::success_with_data(
        "config",
        ConfigReport {
            precedence: "override > env > file > default",
            config_file: config_file_path.map(|path| path.display().to_string()),
            entries,
        },
    )
}

struct SourceLookup<'a> {
    doc: Option<&'a Value>,
    path: Option<&'a Path>,
}

impl SourceLookup<'_> {
    fn entry(&self, key: &'static str, value: String, env_keys: &[&str]) -> ConfigEntry {
        ConfigEntry { key, value, source: self.source(key, env_keys) }
    }

    fn source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::contains_path;

    #[test]
    fn contains_path_walks_nested_tables() {
        let doc: toml::Value = "[workflow]\nceo_approver_id = \"C1\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "workflow.ceo_approver_id"));
        assert!(!contains_path(&doc, "workflow.director_approver_id"));
        assert!(!contains_path(&doc, "database.url"));
    }
}
