//! Classic API strategies.

use bytes::Bytes;
use confit_core::api::ApiDefinition;
use confit_core::client::{ClassicClient, RemoteEntity};
use confit_core::id::{is_me_id, is_uuid, uuid_from_config_id};
use confit_core::parameter::{ID_PARAMETER, NAME_PARAMETER};
use confit_core::{ConfigObject, Coordinate, Error, Properties, ResolvedEntity, Result};
use serde_json::Value;
use tracing::warn;

/// Display name of a classic config, from its `name` property.
pub fn config_name(config: &ConfigObject, properties: &Properties) -> Result<String> {
    match properties.get(NAME_PARAMETER) {
        Some(Value::String(name)) => Ok(name.clone()),
        Some(other) => Err(Error::InvalidPayload(format!(
            "`name` of config {} must be a string, got {}",
            config.coordinate, other
        ))),
        None => Err(Error::MissingParameter {
            config: config.coordinate.clone(),
            parameter: NAME_PARAMETER.to_string(),
        }),
    }
}

/// Remote id used for a config on an API without unique names.
///
/// A config id that already is a UUID or monitored entity id is used
/// verbatim; anything else maps to a name-based UUID of `(project, config_id)`.
pub fn non_unique_object_id(coordinate: &Coordinate) -> String {
    if is_uuid(&coordinate.config_id) || is_me_id(&coordinate.config_id) {
        coordinate.config_id.clone()
    } else {
        uuid_from_config_id(&coordinate.project, &coordinate.config_id).to_string()
    }
}

pub(crate) async fn deploy_by_name(
    client: &dyn ClassicClient,
    api: &ApiDefinition,
    config: &ConfigObject,
    properties: Properties,
    rendered: Bytes,
) -> Result<ResolvedEntity> {
    let name = config_name(config, &properties)?;
    warn_if_deprecated(api);

    let entity = client.upsert_by_name(api, &name, rendered).await?;
    Ok(resolved(config, properties, entity))
}

pub(crate) async fn deploy_non_unique(
    client: &dyn ClassicClient,
    api: &ApiDefinition,
    config: &ConfigObject,
    properties: Properties,
    rendered: Bytes,
) -> Result<ResolvedEntity> {
    let name = config_name(config, &properties)?;
    warn_if_deprecated(api);

    let id = non_unique_object_id(&config.coordinate);
    let entity = client
        .upsert_by_id_and_name(api, &id, &name, rendered)
        .await?;
    Ok(resolved(config, properties, entity))
}

fn warn_if_deprecated(api: &ApiDefinition) {
    if let Some(replacement) = &api.deprecated_by {
        warn!(api = %api.id, replacement = %replacement, "API is deprecated, consider migrating");
    }
}

fn resolved(config: &ConfigObject, mut properties: Properties, entity: RemoteEntity) -> ResolvedEntity {
    properties.insert(ID_PARAMETER.to_string(), Value::String(entity.id.clone()));
    properties.insert(NAME_PARAMETER.to_string(), Value::String(entity.name.clone()));

    ResolvedEntity {
        coordinate: config.coordinate.clone(),
        remote_id: entity.id,
        entity_name: Some(entity.name),
        properties,
        skip: false,
    }
}
