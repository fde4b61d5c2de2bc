//! CLI command implementations.

pub mod graph;
pub mod report;
pub mod validate;

use anyhow::{Context, Result};
use confit_config::EngineSettings;
use confit_core::ConfigObject;
use std::path::Path;

/// Load configs from a JSON array.
pub fn load_objects(path: &Path) -> Result<Vec<ConfigObject>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read objects file: {}", path.display()))?;
    parse_objects(&content)
        .with_context(|| format!("Failed to parse objects file: {}", path.display()))
}

fn parse_objects(content: &str) -> Result<Vec<ConfigObject>> {
    Ok(serde_json::from_str(content)?)
}

/// Load engine settings from an optional file, then apply environment overrides.
pub fn load_settings(path: Option<&Path>) -> Result<EngineSettings> {
    let mut settings = match path {
        Some(path) => EngineSettings::from_file(path)
            .with_context(|| format!("Failed to load settings: {}", path.display()))?,
        None => EngineSettings::default(),
    };
    settings
        .apply_env_overrides()
        .context("Invalid settings override")?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_objects() {
        let json = r#"[
            {
                "coordinate": {"project": "p", "type": "dashboard", "configId": "a"},
                "type": {"kind": "classic", "api": "dashboard"},
                "template": "{\"name\": \"${name}\"}",
                "parameters": {"name": {"type": "value", "value": "A"}}
            },
            {
                "coordinate": {"project": "p", "type": "slo", "configId": "s"},
                "type": {"kind": "slo"},
                "template": "{}",
                "skip": true
            }
        ]"#;

        let objects = parse_objects(json).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].parameters.len(), 1);
        assert!(objects[1].skip);
    }

    #[test]
    fn test_load_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confit.kdl");
        std::fs::write(&path, "engine {\n concurrency 3\n}\napi \"dashboard\"\n").unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert!(settings.apis.get("dashboard").is_some());
    }
}
