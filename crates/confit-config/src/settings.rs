//! Engine settings and API catalog parsing.
//!
//! ```kdl
//! engine {
//!     concurrency 8
//!     timeout-seconds 60
//!     report "deploy-report.jsonl"
//! }
//! api "dashboard"
//! api "notification" non-unique-name=#true
//! api "alerting-profile" deprecated-by="builtin:alerting.profile"
//! ```

use crate::{ConfigError, ConfigResult};
use confit_core::api::{ApiCatalog, ApiDefinition};
use kdl::{KdlDocument, KdlNode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings of a deployment run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Maximum number of in-flight deploy attempts within a layer.
    pub concurrency: usize,
    /// Ceiling for a single deploy attempt.
    pub attempt_timeout: Duration,
    /// Append-only report file.
    pub report_path: Option<PathBuf>,
    /// Classic APIs known to the run.
    pub apis: ApiCatalog,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            report_path: None,
            apis: ApiCatalog::new(),
        }
    }
}

impl EngineSettings {
    /// Load settings from a KDL file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        parse_engine_settings(&content)
    }

    /// Apply `CONFIT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup. Later sources override the file.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CONFIT_CONCURRENCY") {
            self.concurrency = parse_positive("CONFIT_CONCURRENCY", &value)?;
        }
        if let Some(value) = lookup("CONFIT_TIMEOUT_SECONDS") {
            let secs = parse_positive("CONFIT_TIMEOUT_SECONDS", &value)?;
            self.attempt_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(value) = lookup("CONFIT_REPORT") {
            self.report_path = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        Ok(())
    }
}

/// Parse engine settings from KDL text.
pub fn parse_engine_settings(kdl: &str) -> ConfigResult<EngineSettings> {
    let doc: KdlDocument = kdl.parse()?;
    let mut settings = EngineSettings::default();

    for node in doc.nodes() {
        match node.name().value() {
            "engine" => parse_engine(node, &mut settings)?,
            "api" => {
                let api = parse_api(node)?;
                if settings.apis.get(&api.id).is_some() {
                    return Err(ConfigError::Duplicate(format!("api '{}'", api.id)));
                }
                settings.apis.insert(api);
            }
            other => debug!(node = other, "Ignoring unknown settings node"),
        }
    }

    Ok(settings)
}

fn parse_engine(node: &KdlNode, settings: &mut EngineSettings) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "concurrency" => {
                settings.concurrency = get_positive_arg(child, "engine.concurrency")?;
            }
            "timeout-seconds" => {
                let secs = get_positive_arg(child, "engine.timeout-seconds")?;
                settings.attempt_timeout = Duration::from_secs(secs as u64);
            }
            "report" => {
                let path = get_first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("engine.report path".to_string()))?;
                settings.report_path = Some(PathBuf::from(path));
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_api(node: &KdlNode) -> ConfigResult<ApiDefinition> {
    let id = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("api id".to_string()))?;

    Ok(ApiDefinition {
        id,
        non_unique_name: node
            .get("non-unique-name")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        deprecated_by: node
            .get("deprecated-by")
            .and_then(|v| v.as_string())
            .map(|s| s.to_string()),
    })
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_positive_arg(node: &KdlNode, field: &str) -> ConfigResult<usize> {
    let value = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected an integer".to_string(),
        })?;

    usize::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("must be a positive integer, got {}", value),
        })
}

fn parse_positive(field: &str, value: &str) -> ConfigResult<usize> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("must be a positive integer, got `{}`", value),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_full_settings() {
        let kdl = r#"
            engine {
                concurrency 8
                timeout-seconds 30
                report "out/report.jsonl"
            }
            api "dashboard"
            api "notification" non-unique-name=#true
            api "alerting-profile" deprecated-by="builtin:alerting.profile"
        "#;

        let settings = parse_engine_settings(kdl).unwrap();
        assert_eq!(settings.concurrency, 8);
        assert_eq!(settings.attempt_timeout, Duration::from_secs(30));
        assert_eq!(
            settings.report_path,
            Some(PathBuf::from("out/report.jsonl"))
        );
        assert_eq!(settings.apis.len(), 3);
        assert!(settings.apis.get("notification").unwrap().non_unique_name);
        assert_eq!(
            settings
                .apis
                .get("alerting-profile")
                .unwrap()
                .deprecated_by
                .as_deref(),
            Some("builtin:alerting.profile")
        );
    }

    #[test]
    fn test_defaults() {
        let settings = parse_engine_settings("").unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.concurrency, 5);
        assert_eq!(settings.attempt_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_unknown_engine_entries_ignored() {
        let settings = parse_engine_settings("engine {\n dry-run #true\n concurrency 3\n}").unwrap();
        assert_eq!(
            settings,
            EngineSettings {
                concurrency: 3,
                ..EngineSettings::default()
            }
        );
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = parse_engine_settings("engine {\n concurrency 0\n}");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_duplicate_api_rejected() {
        let result = parse_engine_settings("api \"dashboard\"\napi \"dashboard\"");
        assert!(matches!(result, Err(ConfigError::Duplicate(_))));
    }

    #[test]
    fn test_api_requires_id() {
        let result = parse_engine_settings("api non-unique-name=#true");
        assert!(matches!(result, Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("CONFIT_CONCURRENCY", "2"),
            ("CONFIT_TIMEOUT_SECONDS", "5"),
            ("CONFIT_REPORT", "r.jsonl"),
        ]
        .into_iter()
        .collect();

        let mut settings = EngineSettings::default();
        settings
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.attempt_timeout, Duration::from_secs(5));
        assert_eq!(settings.report_path, Some(PathBuf::from("r.jsonl")));
    }

    #[test]
    fn test_invalid_override() {
        let mut settings = EngineSettings::default();
        let result = settings.apply_overrides(|k| {
            (k == "CONFIT_CONCURRENCY").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
