//! Resolved entities and the per-run entity map.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Coordinate;

/// Concrete property values of a config, keyed by parameter name.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Deploy-time outcome of a single config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub coordinate: Coordinate,
    /// Remote identifier assigned to the object (existing or newly created).
    pub remote_id: String,
    /// Display name, for types that have one.
    pub entity_name: Option<String>,
    /// Final properties, including the injected `id` (and `name`).
    pub properties: Properties,
    pub skip: bool,
}

impl ResolvedEntity {
    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name)
    }
}

/// Resolved entities of a run, keyed by coordinate.
///
/// Entries are written once, by the worker that deployed the config, after
/// its attempt terminated. Readers only ever look up configs that are already
/// terminal, so no entry is observed half-written.
#[derive(Debug, Default)]
pub struct EntityMap {
    entities: DashMap<Coordinate, ResolvedEntity>,
    // (api, name) -> owner, for remote types that require unique names
    names: DashMap<(String, String), Coordinate>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the entity of a config. Returns `false` and leaves the map
    /// untouched if the config already has an entry.
    pub fn insert(&self, entity: ResolvedEntity) -> bool {
        match self.entities.entry(entity.coordinate.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(entity);
                true
            }
        }
    }

    pub fn get(&self, coordinate: &Coordinate) -> Option<ResolvedEntity> {
        self.entities.get(coordinate).map(|e| e.value().clone())
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.entities.contains_key(coordinate)
    }

    /// Claim `name` for `owner` within `api`. Returns the existing owner if
    /// the name is already taken by a different config.
    pub fn claim_name(&self, api: &str, name: &str, owner: &Coordinate) -> Option<Coordinate> {
        match self.names.entry((api.to_string(), name.to_string())) {
            Entry::Occupied(existing) if existing.get() != owner => Some(existing.get().clone()),
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(owner.clone());
                None
            }
        }
    }

    /// Owner of a claimed name, if any.
    pub fn name_owner(&self, api: &str, name: &str) -> Option<Coordinate> {
        self.names
            .get(&(api.to_string(), name.to_string()))
            .map(|c| c.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Ordered copy of all entities.
    pub fn snapshot(&self) -> BTreeMap<Coordinate, ResolvedEntity> {
        self.entities
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}
