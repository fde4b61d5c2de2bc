//! Parameter definitions for configuration objects.
//!
//! Parameters are the typed inputs of a configuration. Most resolve to a
//! concrete value on their own; references point at a property of another
//! configuration and are what the dependency graph is built from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Coordinate, Error, Result};

/// Property holding the remote id assigned to a deployed config.
pub const ID_PARAMETER: &str = "id";
/// Property holding the display name of a config.
pub const NAME_PARAMETER: &str = "name";
/// Property holding the scope of a settings object.
pub const SCOPE_PARAMETER: &str = "scope";

/// Names a user may never define; they are filled in by loaders or deployment.
pub const RESERVED_PARAMETERS: [&str; 2] = [ID_PARAMETER, SCOPE_PARAMETER];

/// Named parameters of a config, ordered by name.
pub type Parameters = BTreeMap<String, Parameter>;

/// A typed parameter definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Parameter {
    /// A literal value.
    Value { value: serde_json::Value },
    /// Read from the environment of the deploying process.
    Environment {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    /// An ordered list of parameters, resolved element-wise.
    List { values: Vec<Parameter> },
    /// A string template over its embedded parts, e.g. `"${team}-${env}"`.
    Compound {
        format: String,
        parts: BTreeMap<String, Parameter>,
    },
    /// A property of another configuration's resolved entity.
    Reference { config: Coordinate, property: String },
}

impl Parameter {
    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Parameter::Value {
            value: value.into(),
        }
    }

    pub fn env(name: impl Into<String>) -> Self {
        Parameter::Environment {
            name: name.into(),
            default: None,
        }
    }

    pub fn env_or(name: impl Into<String>, default: impl Into<String>) -> Self {
        Parameter::Environment {
            name: name.into(),
            default: Some(default.into()),
        }
    }

    pub fn list(values: Vec<Parameter>) -> Self {
        Parameter::List { values }
    }

    pub fn compound(
        format: impl Into<String>,
        parts: impl IntoIterator<Item = (&'static str, Parameter)>,
    ) -> Self {
        Parameter::Compound {
            format: format.into(),
            parts: parts
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    pub fn reference(config: Coordinate, property: impl Into<String>) -> Self {
        Parameter::Reference {
            config,
            property: property.into(),
        }
    }

    /// Coordinates referenced by this parameter, including those embedded in
    /// lists and compounds. Values are not resolved.
    pub fn references(&self) -> Vec<&Coordinate> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Coordinate>) {
        match self {
            Parameter::Value { .. } | Parameter::Environment { .. } => {}
            Parameter::List { values } => {
                for v in values {
                    v.collect_references(out);
                }
            }
            Parameter::Compound { parts, .. } => {
                for p in parts.values() {
                    p.collect_references(out);
                }
            }
            Parameter::Reference { config, .. } => out.push(config),
        }
    }
}

/// Reject user-supplied parameters that collide with reserved names.
///
/// Loaders feeding the deployment engine must call this on the parameters
/// read from user input, before adding any loader-owned entries such as
/// `scope`.
pub fn validate_user_parameters(parameters: &Parameters) -> Result<()> {
    for name in RESERVED_PARAMETERS {
        if parameters.contains_key(name) {
            return Err(Error::ReservedParameter(name.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references_recurse_into_lists_and_compounds() {
        let a = Coordinate::new("p", "dashboard", "a");
        let b = Coordinate::new("p", "dashboard", "b");
        let c = Coordinate::new("p", "dashboard", "c");

        let param = Parameter::list(vec![
            Parameter::value("literal"),
            Parameter::reference(a.clone(), "id"),
            Parameter::compound(
                "${x}/${y}",
                [
                    ("x", Parameter::reference(b.clone(), "name")),
                    ("y", Parameter::list(vec![Parameter::reference(c.clone(), "id")])),
                ],
            ),
        ]);

        let refs = param.references();
        assert_eq!(refs, vec![&a, &b, &c]);
    }

    #[test]
    fn test_literal_has_no_references() {
        assert!(Parameter::value(42).references().is_empty());
        assert!(Parameter::env("HOME").references().is_empty());
    }

    #[test]
    fn test_reserved_parameters_rejected() {
        let mut params = Parameters::new();
        params.insert("name".into(), Parameter::value("ok"));
        assert!(validate_user_parameters(&params).is_ok());

        params.insert("id".into(), Parameter::value("nope"));
        assert!(matches!(
            validate_user_parameters(&params),
            Err(Error::ReservedParameter(name)) if name == "id"
        ));

        params.remove("id");
        params.insert("scope".into(), Parameter::value("tenant"));
        assert!(validate_user_parameters(&params).is_err());
    }

    #[test]
    fn test_serde_tagged_form() {
        let param = Parameter::reference(Coordinate::new("p", "slo", "s"), "id");
        let json = serde_json::to_value(&param).unwrap();
        assert_eq!(json["type"], "reference");
        assert_eq!(json["property"], "id");
        assert_eq!(json["config"]["configId"], "s");
    }
}
