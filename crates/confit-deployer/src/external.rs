//! External-id correlated strategy.
//!
//! Objects on these APIs have no local identifier, so they are matched in
//! three tiers, first success wins:
//! 1. update by the pinned origin object id, falling through on "not found"
//! 2. list the kind and update the object carrying our external id
//! 3. create a new object with the external id injected
//!
//! The payload is validated before any call is made.

use bytes::Bytes;
use confit_core::client::{ObjectSource, RawResponse};
use confit_core::config::SLO_KIND;
use confit_core::id::{ExternalId, external_id};
use confit_core::parameter::{ID_PARAMETER, SCOPE_PARAMETER};
use confit_core::{ConfigObject, Error, Properties, RemoteType, ResolvedEntity, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Field marking payloads of the previous SLO generation.
const LEGACY_SLO_FIELD: &str = "evaluationType";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedObject {
    #[serde(alias = "objectId")]
    id: String,
    #[serde(default)]
    external_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    #[serde(alias = "objectId")]
    id: String,
}

pub(crate) async fn deploy_correlated(
    source: &dyn ObjectSource,
    config: &ConfigObject,
    mut properties: Properties,
    rendered: Bytes,
) -> Result<ResolvedEntity> {
    let kind = config.remote_type.id().to_string();
    let external_id = external_id(&config.coordinate);
    let payload = build_payload(config, &properties, &external_id, &rendered)?;

    let remote_id = upsert(source, &kind, config, &external_id, payload).await?;

    properties.insert(ID_PARAMETER.to_string(), Value::String(remote_id.clone()));
    Ok(ResolvedEntity {
        coordinate: config.coordinate.clone(),
        remote_id,
        entity_name: None,
        properties,
        skip: false,
    })
}

async fn upsert(
    source: &dyn ObjectSource,
    kind: &str,
    config: &ConfigObject,
    external_id: &ExternalId,
    payload: Bytes,
) -> Result<String> {
    if let Some(origin_id) = &config.origin_object_id {
        match source.update(kind, origin_id, payload.clone()).await {
            Ok(_) => {
                debug!(coordinate = %config.coordinate, id = %origin_id, "Updated by origin object id");
                return Ok(origin_id.clone());
            }
            Err(e) if e.is_not_found() => {
                debug!(
                    coordinate = %config.coordinate,
                    id = %origin_id,
                    "Origin object not found, matching by external id"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    let listed = source.list(kind).await?;
    for raw in listed.all() {
        let object: ListedObject = serde_json::from_slice(raw).map_err(|e| {
            Error::InvalidPayload(format!("malformed `{}` object in list response: {}", kind, e))
        })?;
        if object.external_id.as_deref() == Some(external_id.as_str()) {
            source.update(kind, &object.id, payload).await?;
            debug!(coordinate = %config.coordinate, id = %object.id, "Updated by external id");
            return Ok(object.id);
        }
    }

    let response = source.create(kind, payload).await?;
    let id = created_id(kind, &response)?;
    info!(coordinate = %config.coordinate, id = %id, "Created remote object");
    Ok(id)
}

fn created_id(kind: &str, response: &RawResponse) -> Result<String> {
    serde_json::from_slice::<CreatedObject>(&response.data)
        .map(|created| created.id)
        .map_err(|e| {
            Error::InvalidPayload(format!(
                "create response for `{}` has no object id: {}",
                kind, e
            ))
        })
}

/// Validate the rendered payload and attach the external id.
pub fn build_payload(
    config: &ConfigObject,
    properties: &Properties,
    external_id: &ExternalId,
    rendered: &[u8],
) -> Result<Bytes> {
    let value: Value = serde_json::from_slice(rendered).map_err(|e| {
        Error::InvalidPayload(format!(
            "rendered payload of {} is not valid JSON: {}",
            config.coordinate, e
        ))
    })?;

    let payload = match &config.remote_type {
        RemoteType::Slo => slo_payload(config, value, external_id)?,
        RemoteType::Settings {
            schema_id,
            schema_version,
        } => {
            let scope = properties.get(SCOPE_PARAMETER).ok_or_else(|| Error::MissingParameter {
                config: config.coordinate.clone(),
                parameter: SCOPE_PARAMETER.to_string(),
            })?;

            let mut object = Map::new();
            object.insert("schemaId".into(), Value::String(schema_id.clone()));
            if let Some(version) = schema_version {
                object.insert("schemaVersion".into(), Value::String(version.clone()));
            }
            object.insert("scope".into(), scope.clone());
            object.insert(
                "externalId".into(),
                Value::String(external_id.as_str().to_string()),
            );
            object.insert("value".into(), value);
            Value::Object(object)
        }
        RemoteType::Classic { api } => {
            return Err(Error::UnknownRemoteType(format!(
                "classic api `{}` cannot be correlated by external id",
                api
            )));
        }
    };

    serde_json::to_vec(&payload)
        .map(Bytes::from)
        .map_err(|e| Error::InvalidPayload(e.to_string()))
}

fn slo_payload(config: &ConfigObject, value: Value, external_id: &ExternalId) -> Result<Value> {
    let Value::Object(mut object) = value else {
        return Err(Error::InvalidPayload(format!(
            "{} payload of {} must be a JSON object",
            SLO_KIND, config.coordinate
        )));
    };

    if object.contains_key(LEGACY_SLO_FIELD) {
        return Err(Error::SchemaMismatch(format!(
            "config {} carries `{}`, which belongs to the legacy SLO schema; \
             convert it to the current schema before deploying",
            config.coordinate, LEGACY_SLO_FIELD
        )));
    }

    object.insert(
        "externalId".into(),
        Value::String(external_id.as_str().to_string()),
    );
    Ok(Value::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryRemote;
    use confit_core::Coordinate;
    use confit_core::client::RemoteError;
    use serde_json::json;

    fn slo(id: &str) -> ConfigObject {
        ConfigObject::new(Coordinate::new("p", "slo", id), RemoteType::Slo, "{}")
    }

    fn tags_setting(id: &str) -> ConfigObject {
        ConfigObject::new(
            Coordinate::new("p", "builtin:tags", id),
            RemoteType::Settings {
                schema_id: "builtin:tags".into(),
                schema_version: Some("1.2".into()),
            },
            "{}",
        )
    }

    fn payload(v: Value) -> Bytes {
        Bytes::from(serde_json::to_vec(&v).unwrap())
    }

    #[test]
    fn test_legacy_slo_rejected() {
        let config = slo("s");
        let err = build_payload(
            &config,
            &Properties::new(),
            &external_id(&config.coordinate),
            br#"{"name": "x", "evaluationType": "AGGREGATE"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(msg) if msg.contains("evaluationType")));
    }

    #[test]
    fn test_slo_payload_gets_external_id() {
        let config = slo("s");
        let ext = external_id(&config.coordinate);
        let out = build_payload(&config, &Properties::new(), &ext, br#"{"name": "x"}"#).unwrap();
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["externalId"], json!(ext.as_str()));
        assert_eq!(parsed["name"], json!("x"));
    }

    #[test]
    fn test_settings_payload_is_wrapped() {
        let config = tags_setting("t");
        let ext = external_id(&config.coordinate);
        let mut props = Properties::new();
        props.insert("scope".into(), json!("environment"));

        let out = build_payload(&config, &props, &ext, br#"{"enabled": true}"#).unwrap();
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(
            parsed,
            json!({
                "schemaId": "builtin:tags",
                "schemaVersion": "1.2",
                "scope": "environment",
                "externalId": ext.as_str(),
                "value": {"enabled": true}
            })
        );
    }

    #[test]
    fn test_settings_without_scope() {
        let config = tags_setting("t");
        let err = build_payload(
            &config,
            &Properties::new(),
            &external_id(&config.coordinate),
            b"{}",
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingParameter { parameter, .. } if parameter == "scope"));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let config = slo("s");
        let result = build_payload(
            &config,
            &Properties::new(),
            &external_id(&config.coordinate),
            b"{not json",
        );
        assert!(matches!(result, Err(Error::InvalidPayload(_))));
    }

    #[tokio::test]
    async fn test_creates_then_matches_by_external_id() {
        let remote = InMemoryRemote::new();
        let config = slo("s");

        let first = deploy_correlated(
            &remote,
            &config,
            Properties::new(),
            payload(json!({"name": "a"})),
        )
        .await
        .unwrap();
        assert_eq!(first.properties["id"], json!(first.remote_id));
        assert_eq!(remote.calls().object_creates, 1);

        let second = deploy_correlated(
            &remote,
            &config,
            Properties::new(),
            payload(json!({"name": "b"})),
        )
        .await
        .unwrap();
        assert_eq!(first.remote_id, second.remote_id);
        assert_eq!(remote.calls().object_creates, 1);
        assert_eq!(remote.calls().object_updates, 1);
        assert_eq!(remote.object_count("slo"), 1);
    }

    #[tokio::test]
    async fn test_origin_object_id_updates_directly() {
        let remote = InMemoryRemote::new();
        remote.seed_object("slo", "existing-1", json!({"name": "old"}));

        let config = slo("s").with_origin_object_id("existing-1");
        let entity = deploy_correlated(
            &remote,
            &config,
            Properties::new(),
            payload(json!({"name": "new"})),
        )
        .await
        .unwrap();

        assert_eq!(entity.remote_id, "existing-1");
        assert_eq!(remote.calls().lists, 0);
        assert_eq!(remote.calls().object_creates, 0);
    }

    #[tokio::test]
    async fn test_missing_origin_falls_through_to_create() {
        let remote = InMemoryRemote::new();
        let config = slo("s").with_origin_object_id("gone");

        let entity = deploy_correlated(
            &remote,
            &config,
            Properties::new(),
            payload(json!({"name": "x"})),
        )
        .await
        .unwrap();

        assert_ne!(entity.remote_id, "gone");
        assert_eq!(remote.calls().lists, 1);
        assert_eq!(remote.calls().object_creates, 1);
    }

    #[tokio::test]
    async fn test_origin_update_error_is_fatal() {
        let remote = InMemoryRemote::new();
        remote.seed_object("slo", "existing-1", json!({}));
        remote.inject_failure(
            "slo/existing-1",
            RemoteError::Api {
                status: 500,
                message: "boom".into(),
            },
        );

        let config = slo("s").with_origin_object_id("existing-1");
        let err = deploy_correlated(&remote, &config, Properties::new(), payload(json!({})))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Remote(RemoteError::Api { status: 500, .. })));
        assert_eq!(remote.calls().lists, 0);
    }

    #[tokio::test]
    async fn test_schema_mismatch_makes_no_calls() {
        let remote = InMemoryRemote::new();
        let err = deploy_correlated(
            &remote,
            &slo("s"),
            Properties::new(),
            payload(json!({"evaluationType": "AGGREGATE"})),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::SchemaMismatch(_)));
        assert_eq!(remote.calls().total(), 0);
    }
}
