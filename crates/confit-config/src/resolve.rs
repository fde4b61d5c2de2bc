//! Parameter resolution.
//!
//! Turns the typed parameters of a config into concrete properties:
//! - literal values are taken as-is
//! - environment parameters read from a snapshot of the process environment
//! - lists resolve element-wise
//! - compounds substitute `${part}` placeholders with their resolved parts
//! - references read a property of an already-deployed config
//!
//! Resolution never performs I/O and never mutates the entity map. Given the
//! same config, environment snapshot and entities it always yields the same
//! properties, which is what dry runs rely on.

use confit_core::parameter::Parameter;
use confit_core::{ConfigObject, Coordinate, EntityMap, Error, Properties, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

// Regex for matching ${part} placeholders in compound formats
static PART_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_\-]*)\}").unwrap());

/// Resolves config parameters against the entities of already-deployed configs.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    /// Environment snapshot used for environment parameters.
    env: HashMap<String, String>,
}

impl Resolver {
    /// Create a resolver with an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver from a snapshot of the current process environment.
    pub fn from_process_env() -> Self {
        let mut resolver = Self::new();
        resolver.populate_env();
        resolver
    }

    /// Populate environment variables from the current process environment.
    pub fn populate_env(&mut self) {
        for (key, value) in std::env::vars() {
            self.env.insert(key, value);
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Resolve every parameter of `config`.
    ///
    /// `entities` must contain the resolved entity of each referenced config;
    /// a missing or skipped entity fails with [`Error::UnresolvedReference`].
    pub fn resolve(&self, config: &ConfigObject, entities: &EntityMap) -> Result<Properties> {
        config
            .parameters
            .iter()
            .map(|(name, param)| {
                self.resolve_parameter(&config.coordinate, param, entities)
                    .map(|value| (name.clone(), value))
            })
            .collect()
    }

    fn resolve_parameter(
        &self,
        config: &Coordinate,
        param: &Parameter,
        entities: &EntityMap,
    ) -> Result<Value> {
        match param {
            Parameter::Value { value } => Ok(value.clone()),
            Parameter::Environment { name, default } => self
                .env
                .get(name)
                .cloned()
                .or_else(|| default.clone())
                .map(Value::String)
                .ok_or_else(|| Error::MissingEnvironmentVariable(name.clone())),
            Parameter::List { values } => values
                .iter()
                .map(|v| self.resolve_parameter(config, v, entities))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Parameter::Compound { format, parts } => {
                let mut resolved = HashMap::with_capacity(parts.len());
                for (name, part) in parts {
                    resolved.insert(
                        name.as_str(),
                        self.resolve_parameter(config, part, entities)?,
                    );
                }
                substitute(config, format, &resolved).map(Value::String)
            }
            Parameter::Reference {
                config: target,
                property,
            } => resolve_reference(config, target, property, entities),
        }
    }
}

fn resolve_reference(
    config: &Coordinate,
    target: &Coordinate,
    property: &str,
    entities: &EntityMap,
) -> Result<Value> {
    let unresolved = |reason: &str| Error::UnresolvedReference {
        config: config.clone(),
        target: target.clone(),
        property: property.to_string(),
        reason: reason.to_string(),
    };

    let entity = entities
        .get(target)
        .ok_or_else(|| unresolved("referenced config has not been deployed"))?;
    if entity.skip {
        return Err(unresolved("referenced config was skipped"));
    }
    entity
        .property(property)
        .cloned()
        .ok_or_else(|| unresolved("referenced config has no such property"))
}

fn substitute(config: &Coordinate, format: &str, parts: &HashMap<&str, Value>) -> Result<String> {
    let mut missing = None;
    let out = PART_REGEX.replace_all(format, |caps: &regex::Captures| {
        let name = &caps[1];
        match parts.get(name) {
            Some(value) => to_plain_string(value),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(parameter) => Err(Error::MissingParameter {
            config: config.clone(),
            parameter,
        }),
        None => Ok(out.into_owned()),
    }
}

/// Strings are inserted without quotes; everything else as JSON text.
fn to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
