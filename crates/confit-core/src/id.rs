//! Identifiers derived from coordinates.
//!
//! Everything here is a pure function of its inputs: the same coordinate
//! yields the same identifier in every invocation and every process, which is
//! what lets repeated runs update remote objects instead of duplicating them.

use derive_more::Display;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use uuid::Uuid;

use crate::Coordinate;

/// Namespace for name-based UUIDs generated by confit.
const CONFIT_NAMESPACE: Uuid = Uuid::from_u128(0x9c1e4a5b_3f2d_4e8a_b6c7_1d2e3f4a5b6c);

const EXTERNAL_ID_PREFIX: &str = "confit:";

// Monitored entity ids, e.g. HOST-0123456789ABCDEF
static ME_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z_]*-[0-9A-F]{16}$").unwrap());

/// Correlation key attached to remote objects that have no natural local id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct ExternalId(String);

impl ExternalId {
    /// Derive the external id for a coordinate.
    pub fn from_coordinate(coordinate: &Coordinate) -> Self {
        let encoded = encode_parts(&[
            &coordinate.project,
            &coordinate.config_type,
            &coordinate.config_id,
        ]);
        let digest = Sha256::digest(encoded.as_bytes());
        Self(format!("{EXTERNAL_ID_PREFIX}{}", hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<ExternalId> for String {
    fn from(id: ExternalId) -> Self {
        id.0
    }
}

/// Shorthand for [`ExternalId::from_coordinate`].
pub fn external_id(coordinate: &Coordinate) -> ExternalId {
    ExternalId::from_coordinate(coordinate)
}

/// Name-based UUID for a config in a project.
///
/// Used as the remote identifier for object types that do not enforce unique
/// names.
pub fn uuid_from_config_id(project: &str, config_id: &str) -> Uuid {
    uuid_from_parts(&[project, config_id])
}

/// Name-based UUID over an arbitrary sequence of strings.
pub fn uuid_from_parts(parts: &[&str]) -> Uuid {
    Uuid::new_v5(&CONFIT_NAMESPACE, encode_parts(parts).as_bytes())
}

pub fn is_uuid(s: &str) -> bool {
    Uuid::parse_str(s).is_ok()
}

/// Whether `s` has the shape of a monitored entity id.
pub fn is_me_id(s: &str) -> bool {
    ME_ID_REGEX.is_match(s)
}

// Length-prefix every part so ("a:b", "c") and ("a", "b:c") never collide.
fn encode_parts(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| format!("{}:{}", p.len(), p))
        .collect::<Vec<_>>()
        .join("|")
}
