//! Catalog of classic remote APIs known to a run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A classic configuration API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDefinition {
    /// API id, e.g. `dashboard`.
    pub id: String,
    /// The remote does not enforce unique names, so objects are keyed by id.
    #[serde(default)]
    pub non_unique_name: bool,
    /// Replacement API, if this one is deprecated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated_by: Option<String>,
}

impl ApiDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            non_unique_name: false,
            deprecated_by: None,
        }
    }

    pub fn non_unique(id: impl Into<String>) -> Self {
        Self {
            non_unique_name: true,
            ..Self::new(id)
        }
    }
}

/// APIs available for deployment, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCatalog {
    apis: BTreeMap<String, ApiDefinition>,
}

impl ApiCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an API definition.
    pub fn insert(&mut self, api: ApiDefinition) {
        self.apis.insert(api.id.clone(), api);
    }

    pub fn with(mut self, api: ApiDefinition) -> Self {
        self.insert(api);
        self
    }

    pub fn get(&self, id: &str) -> Option<&ApiDefinition> {
        self.apis.get(id)
    }

    pub fn len(&self) -> usize {
        self.apis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApiDefinition> {
        self.apis.values()
    }
}

impl FromIterator<ApiDefinition> for ApiCatalog {
    fn from_iter<T: IntoIterator<Item = ApiDefinition>>(iter: T) -> Self {
        let mut catalog = Self::new();
        for api in iter {
            catalog.insert(api);
        }
        catalog
    }
}
