//! In-memory remote.
//!
//! A stateful stand-in for the remote environment: objects persist across
//! runs against the same instance, so repeated deployments can be checked for
//! idempotence. Calls are counted per operation, and failures or latency can
//! be injected.

use async_trait::async_trait;
use bytes::Bytes;
use confit_core::api::ApiDefinition;
use confit_core::client::{
    ClassicClient, ListResponse, ObjectSource, RawResponse, RemoteEntity, RemoteError,
    RemoteResult,
};
use dashmap::DashMap;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Number of calls made per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub classic_creates: usize,
    pub classic_updates: usize,
    pub object_creates: usize,
    pub object_updates: usize,
    pub lists: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.classic_creates
            + self.classic_updates
            + self.object_creates
            + self.object_updates
            + self.lists
    }
}

#[derive(Debug, Clone)]
struct ClassicObject {
    id: String,
    name: String,
    payload: Bytes,
}

#[derive(Debug, Default)]
struct Counters {
    classic_creates: AtomicUsize,
    classic_updates: AtomicUsize,
    object_creates: AtomicUsize,
    object_updates: AtomicUsize,
    lists: AtomicUsize,
}

/// In-memory implementation of every remote-access trait.
///
/// Failures are injected by key: `{api}/{name}` for classic calls,
/// `{kind}/{id}` for object updates and `{kind}` for lists and creates.
/// A failure injected with [`inject_failure_once`](Self::inject_failure_once)
/// applies to the next call on its key only.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    // (api, id) -> object
    classic: DashMap<(String, String), ClassicObject>,
    // (kind, id) -> stored object, including its `id`
    objects: DashMap<(String, String), Value>,
    failures: DashMap<String, RemoteError>,
    one_shot: DashMap<String, RemoteError>,
    latency: Option<Duration>,
    next_id: AtomicUsize,
    counters: Counters,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every call on `key` fail with `error`.
    pub fn inject_failure(&self, key: impl Into<String>, error: RemoteError) {
        self.failures.insert(key.into(), error);
    }

    /// Make the next call on `key` fail with `error`.
    pub fn inject_failure_once(&self, key: impl Into<String>, error: RemoteError) {
        self.one_shot.insert(key.into(), error);
    }

    /// Store an object as if it already existed remotely.
    pub fn seed_object(&self, kind: &str, id: &str, mut object: Value) {
        if let Value::Object(map) = &mut object {
            map.insert("id".into(), Value::String(id.to_string()));
        }
        self.objects
            .insert((kind.to_string(), id.to_string()), object);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            classic_creates: self.counters.classic_creates.load(Ordering::SeqCst),
            classic_updates: self.counters.classic_updates.load(Ordering::SeqCst),
            object_creates: self.counters.object_creates.load(Ordering::SeqCst),
            object_updates: self.counters.object_updates.load(Ordering::SeqCst),
            lists: self.counters.lists.load(Ordering::SeqCst),
        }
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Last payload stored for the classic object named `name`.
    pub fn classic_payload(&self, api: &str, name: &str) -> Option<Bytes> {
        self.classic
            .iter()
            .find(|e| e.key().0 == api && e.value().name == name)
            .map(|e| e.value().payload.clone())
    }

    pub fn classic_count(&self, api: &str) -> usize {
        self.classic.iter().filter(|e| e.key().0 == api).count()
    }

    /// Stored object of `kind` with `id`.
    pub fn object(&self, kind: &str, id: &str) -> Option<Value> {
        self.objects
            .get(&(kind.to_string(), id.to_string()))
            .map(|e| e.value().clone())
    }

    pub fn object_count(&self, kind: &str) -> usize {
        self.objects.iter().filter(|e| e.key().0 == kind).count()
    }

    fn generate_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{:06}", prefix, n)
    }

    fn check_failure(&self, key: &str) -> RemoteResult<()> {
        if let Some((_, error)) = self.one_shot.remove(key) {
            return Err(error);
        }
        match self.failures.get(key) {
            Some(error) => Err(error.value().clone()),
            None => Ok(()),
        }
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        InFlight(&self.in_flight)
    }

    fn upsert_classic(&self, api: &str, id: String, name: &str, payload: Bytes) -> RemoteEntity {
        let key = (api.to_string(), id.clone());
        let object = ClassicObject {
            id: id.clone(),
            name: name.to_string(),
            payload,
        };
        if self.classic.insert(key, object).is_some() {
            self.counters.classic_updates.fetch_add(1, Ordering::SeqCst);
        } else {
            self.counters.classic_creates.fetch_add(1, Ordering::SeqCst);
        }
        RemoteEntity {
            id,
            name: name.to_string(),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn stored(id: &str, payload: &[u8]) -> RemoteResult<Value> {
    let mut value: Value = serde_json::from_slice(payload).map_err(|e| RemoteError::Api {
        status: 400,
        message: format!("invalid JSON payload: {}", e),
    })?;
    match &mut value {
        Value::Object(map) => {
            map.insert("id".into(), Value::String(id.to_string()));
            Ok(value)
        }
        _ => Err(RemoteError::Api {
            status: 400,
            message: "payload must be a JSON object".to_string(),
        }),
    }
}

#[async_trait]
impl ClassicClient for InMemoryRemote {
    async fn upsert_by_name(
        &self,
        api: &ApiDefinition,
        name: &str,
        payload: Bytes,
    ) -> RemoteResult<RemoteEntity> {
        let _guard = self.enter().await;
        self.check_failure(&format!("{}/{}", api.id, name))?;

        let id = self
            .classic
            .iter()
            .find(|e| e.key().0 == api.id && e.value().name == name)
            .map(|e| e.value().id.clone())
            .unwrap_or_else(|| self.generate_id(&api.id));
        Ok(self.upsert_classic(&api.id, id, name, payload))
    }

    async fn upsert_by_id_and_name(
        &self,
        api: &ApiDefinition,
        id: &str,
        name: &str,
        payload: Bytes,
    ) -> RemoteResult<RemoteEntity> {
        let _guard = self.enter().await;
        self.check_failure(&format!("{}/{}", api.id, name))?;
        Ok(self.upsert_classic(&api.id, id.to_string(), name, payload))
    }
}

#[async_trait]
impl ObjectSource for InMemoryRemote {
    async fn list(&self, kind: &str) -> RemoteResult<ListResponse> {
        let _guard = self.enter().await;
        self.counters.lists.fetch_add(1, Ordering::SeqCst);
        self.check_failure(kind)?;

        let mut objects: Vec<(String, Value)> = self
            .objects
            .iter()
            .filter(|e| e.key().0 == kind)
            .map(|e| (e.key().1.clone(), e.value().clone()))
            .collect();
        objects.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(objects
            .into_iter()
            .map(|(_, v)| Bytes::from(v.to_string()))
            .collect::<Vec<_>>()
            .into())
    }

    async fn update(&self, kind: &str, id: &str, payload: Bytes) -> RemoteResult<RawResponse> {
        let _guard = self.enter().await;
        self.check_failure(&format!("{}/{}", kind, id))?;

        let key = (kind.to_string(), id.to_string());
        if !self.objects.contains_key(&key) {
            return Err(RemoteError::NotFound(format!("{} object {}", kind, id)));
        }
        let value = stored(id, &payload)?;
        self.objects.insert(key, value);
        self.counters.object_updates.fetch_add(1, Ordering::SeqCst);
        Ok(RawResponse::ok(json!({ "id": id }).to_string()))
    }

    async fn create(&self, kind: &str, payload: Bytes) -> RemoteResult<RawResponse> {
        let _guard = self.enter().await;
        self.check_failure(kind)?;

        let id = self.generate_id(kind);
        let value = stored(&id, &payload)?;
        self.objects.insert((kind.to_string(), id.clone()), value);
        self.counters.object_creates.fetch_add(1, Ordering::SeqCst);
        Ok(RawResponse::ok(json!({ "id": id }).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_update_unknown_object_is_not_found() {
        let remote = InMemoryRemote::new();
        let err = remote
            .update("slo", "nope", Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_returns_created_objects() {
        let remote = InMemoryRemote::new();
        remote
            .create("slo", Bytes::from_static(br#"{"externalId": "e1"}"#))
            .await
            .unwrap();
        remote.seed_object("slo", "s-1", json!({"externalId": "e2"}));
        remote.seed_object("other", "o-1", json!({}));

        let listed = remote.list("slo").await.unwrap();
        assert_eq!(listed.len(), 2);
        for raw in listed.all() {
            let v: Value = serde_json::from_slice(raw).unwrap();
            assert!(v["id"].is_string());
        }
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let remote = InMemoryRemote::new();
        remote.inject_failure(
            "dashboard/Broken",
            RemoteError::Transport("connection reset".into()),
        );

        let api = ApiDefinition::new("dashboard");
        let result = remote
            .upsert_by_name(&api, "Broken", Bytes::new())
            .await;
        assert!(matches!(result, Err(RemoteError::Transport(_))));
        assert!(
            remote
                .upsert_by_name(&api, "Fine", Bytes::new())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_injected_failure_once() {
        let remote = InMemoryRemote::new();
        remote.inject_failure_once(
            "dashboard/Flaky",
            RemoteError::Api {
                status: 500,
                message: "boom".into(),
            },
        );

        let api = ApiDefinition::new("dashboard");
        let first = remote.upsert_by_name(&api, "Flaky", Bytes::new()).await;
        assert!(matches!(first, Err(RemoteError::Api { status: 500, .. })));
        let second = remote.upsert_by_name(&api, "Flaky", Bytes::new()).await;
        assert!(second.is_ok());
        assert_eq!(remote.classic_count("dashboard"), 1);
    }

    #[tokio::test]
    async fn test_tracks_max_in_flight() {
        let remote = Arc::new(InMemoryRemote::new().with_latency(Duration::from_millis(20)));
        let api = ApiDefinition::new("dashboard");

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let remote = remote.clone();
                let api = api.clone();
                tokio::spawn(async move {
                    remote
                        .upsert_by_name(&api, &format!("d{i}"), Bytes::new())
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(remote.max_in_flight() >= 2);
        assert_eq!(remote.classic_count("dashboard"), 3);
    }
}
