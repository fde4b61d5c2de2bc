//! Payload template rendering.
//!
//! Templates reference resolved properties as `${name}`. String values are
//! JSON-escaped without surrounding quotes, so templates place their own
//! quotes: `{"name": "${name}"}`. Any other value is inserted as JSON text,
//! which allows `"tags": ${tags}` for lists.

use bytes::Bytes;
use confit_core::{Error, Properties, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

// Regex for matching ${name} references in templates
static VAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_\-]*)\}").unwrap());

/// Renders a config's payload from its resolved properties.
pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, properties: &Properties) -> Result<Bytes>;
}

/// Renderer for `${name}` templates.
///
/// Referencing a property that does not exist is an error: a payload is never
/// sent with unrendered placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpolatingRenderer;

impl InterpolatingRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Names of all properties referenced by a template, in order of appearance.
    pub fn referenced_properties(template: &str) -> Vec<String> {
        VAR_REGEX
            .captures_iter(template)
            .map(|caps| caps[1].to_string())
            .collect()
    }
}

impl Renderer for InterpolatingRenderer {
    fn render(&self, template: &str, properties: &Properties) -> Result<Bytes> {
        let mut unknown = Vec::new();
        let rendered = VAR_REGEX.replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            match properties.get(name) {
                Some(value) => render_value(value),
                None => {
                    unknown.push(name.to_string());
                    String::new()
                }
            }
        });

        if !unknown.is_empty() {
            return Err(Error::Render(format!(
                "template references unknown properties: {}",
                unknown.join(", ")
            )));
        }
        Ok(Bytes::from(rendered.into_owned()))
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => {
            // serialize to get JSON escaping, then drop the surrounding quotes
            let quoted = Value::String(s.clone()).to_string();
            quoted[1..quoted.len() - 1].to_string()
        }
        other => other.to_string(),
    }
}
