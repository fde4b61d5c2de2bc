//! Configuration objects: the unit of deployment.

use serde::{Deserialize, Serialize};

use crate::{Coordinate, Parameters};

/// Schema whose object ids are decoded by consumers and must stay base64-shaped.
pub const MANAGEMENT_ZONE_SCHEMA: &str = "builtin:management-zones";

/// Object kind used for SLOs on the object API.
pub const SLO_KIND: &str = "slo";

/// Remote category of a config. Selects the deploy strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteType {
    /// Classic configuration API, looked up in the run's API catalog.
    Classic { api: String },
    /// Settings object of a schema.
    Settings {
        schema_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema_version: Option<String>,
    },
    /// Service level objective.
    Slo,
}

impl RemoteType {
    /// Identifier of the remote type, as used in coordinates and the report.
    pub fn id(&self) -> &str {
        match self {
            RemoteType::Classic { api } => api,
            RemoteType::Settings { schema_id, .. } => schema_id,
            RemoteType::Slo => SLO_KIND,
        }
    }
}

/// A configuration object to deploy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigObject {
    pub coordinate: Coordinate,
    /// Remote type descriptor.
    #[serde(rename = "type")]
    pub remote_type: RemoteType,
    /// Payload template, rendered with the resolved properties.
    pub template: String,
    #[serde(default)]
    pub parameters: Parameters,
    /// Known remote id to pin updates to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_object_id: Option<String>,
    /// Set by upstream selection: the config is excluded from deployment.
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub group: String,
}

impl ConfigObject {
    pub fn new(coordinate: Coordinate, remote_type: RemoteType, template: impl Into<String>) -> Self {
        Self {
            coordinate,
            remote_type,
            template: template.into(),
            parameters: Parameters::new(),
            origin_object_id: None,
            skip: false,
            environment: String::new(),
            group: String::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, parameter: crate::Parameter) -> Self {
        self.parameters.insert(name.into(), parameter);
        self
    }

    pub fn with_origin_object_id(mut self, id: impl Into<String>) -> Self {
        self.origin_object_id = Some(id.into());
        self
    }

    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }

    /// Every coordinate referenced by any parameter, deduplicated and sorted.
    pub fn references(&self) -> Vec<Coordinate> {
        let mut refs: Vec<Coordinate> = self
            .parameters
            .values()
            .flat_map(|p| p.references())
            .cloned()
            .collect();
        refs.sort();
        refs.dedup();
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Parameter;

    #[test]
    fn test_references_deduplicated() {
        let target = Coordinate::new("p", "dashboard", "a");
        let config = ConfigObject::new(
            Coordinate::new("p", "dashboard", "b"),
            RemoteType::Classic {
                api: "dashboard".into(),
            },
            "{}",
        )
        .with_parameter("x", Parameter::reference(target.clone(), "id"))
        .with_parameter("y", Parameter::reference(target.clone(), "name"));

        assert_eq!(config.references(), vec![target]);
    }

    #[test]
    fn test_remote_type_id() {
        assert_eq!(RemoteType::Slo.id(), "slo");
        assert_eq!(
            RemoteType::Settings {
                schema_id: "builtin:tags".into(),
                schema_version: None
            }
            .id(),
            "builtin:tags"
        );
    }

    #[test]
    fn test_deserialize_minimal() {
        let json = r#"{
            "coordinate": {"project": "p", "type": "slo", "configId": "s"},
            "type": {"kind": "slo"},
            "template": "{}"
        }"#;
        let config: ConfigObject = serde_json::from_str(json).unwrap();
        assert_eq!(config.remote_type, RemoteType::Slo);
        assert!(!config.skip);
        assert!(config.parameters.is_empty());
    }
}
