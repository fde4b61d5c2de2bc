//! Configuration coordinates.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Identity of a configuration object within a deployment run.
///
/// Ordering is lexicographic over `(project, type, config_id)` so that
/// collections keyed by coordinate iterate deterministically.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[display("{project}:{config_type}:{config_id}")]
pub struct Coordinate {
    /// Project the configuration belongs to.
    pub project: String,
    /// Type of the configuration (API id, schema id, `slo`, ...).
    #[serde(rename = "type")]
    pub config_type: String,
    /// Identifier of the configuration within its project and type.
    #[serde(rename = "configId")]
    pub config_id: String,
}

impl Coordinate {
    pub fn new(
        project: impl Into<String>,
        config_type: impl Into<String>,
        config_id: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            config_type: config_type.into(),
            config_id: config_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let c = Coordinate::new("infra", "dashboard", "overview");
        assert_eq!(c.to_string(), "infra:dashboard:overview");
    }

    #[test]
    fn test_json_field_names() {
        let c = Coordinate::new("infra", "slo", "availability");
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"project": "infra", "type": "slo", "configId": "availability"})
        );

        let back: Coordinate = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let a = Coordinate::new("a", "z", "z");
        let b = Coordinate::new("b", "a", "a");
        assert!(a < b);
    }
}
