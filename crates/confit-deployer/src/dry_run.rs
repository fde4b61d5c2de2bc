//! Synthetic remote client for dry runs.
//!
//! Performs no I/O. Every id it hands out is a pure function of the request,
//! so a dry run of the same configs always reports the same ids.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use confit_core::api::ApiDefinition;
use confit_core::client::{
    ClassicClient, ListResponse, ObjectSource, RawResponse, RemoteEntity, RemoteResult,
};
use confit_core::config::MANAGEMENT_ZONE_SCHEMA;
use confit_core::id::uuid_from_parts;
use serde_json::{Value, json};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunClient;

impl DryRunClient {
    pub fn new() -> Self {
        Self
    }

    /// Id of an object created on `kind` with `payload`.
    pub fn object_id(kind: &str, payload: &[u8]) -> String {
        let external_id = serde_json::from_slice::<Value>(payload)
            .ok()
            .and_then(|v| v.get("externalId").and_then(Value::as_str).map(str::to_string));

        let uuid = match external_id {
            Some(external_id) => uuid_from_parts(&[kind, &external_id]),
            None => uuid_from_parts(&[kind, &String::from_utf8_lossy(payload)]),
        };

        // management zone ids are decoded downstream and must stay base64
        if kind == MANAGEMENT_ZONE_SCHEMA {
            URL_SAFE_NO_PAD.encode(uuid.to_string())
        } else {
            uuid.to_string()
        }
    }
}

#[async_trait]
impl ClassicClient for DryRunClient {
    async fn upsert_by_name(
        &self,
        api: &ApiDefinition,
        name: &str,
        _payload: Bytes,
    ) -> RemoteResult<RemoteEntity> {
        let id = uuid_from_parts(&[&api.id, name]).to_string();
        debug!(api = %api.id, name = %name, id = %id, "Dry run: upsert by name");
        Ok(RemoteEntity {
            id,
            name: name.to_string(),
        })
    }

    async fn upsert_by_id_and_name(
        &self,
        api: &ApiDefinition,
        id: &str,
        name: &str,
        _payload: Bytes,
    ) -> RemoteResult<RemoteEntity> {
        debug!(api = %api.id, name = %name, id = %id, "Dry run: upsert by id");
        Ok(RemoteEntity {
            id: id.to_string(),
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl ObjectSource for DryRunClient {
    async fn list(&self, _kind: &str) -> RemoteResult<ListResponse> {
        Ok(ListResponse::new())
    }

    async fn update(&self, _kind: &str, id: &str, _payload: Bytes) -> RemoteResult<RawResponse> {
        Ok(RawResponse::ok(json!({ "id": id }).to_string()))
    }

    async fn create(&self, kind: &str, payload: Bytes) -> RemoteResult<RawResponse> {
        let id = Self::object_id(kind, &payload);
        debug!(kind = %kind, id = %id, "Dry run: create");
        Ok(RawResponse::ok(json!({ "id": id }).to_string()))
    }
}
