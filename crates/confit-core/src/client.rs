//! Remote-access collaborator traits.
//!
//! Each trait exposes only the operations a deploy strategy needs, so a
//! synthetic implementation can stand in for the real HTTP client during
//! dry runs and tests. Implementations are expected to be authenticated and
//! to handle retries on their own.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::ApiDefinition;

/// Errors returned by remote-access collaborators.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("API responded with {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        match self {
            RemoteError::NotFound(_) => true,
            RemoteError::Api { status, .. } => *status == 404,
            RemoteError::Transport(_) => false,
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Identity of an object on a classic API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntity {
    pub id: String,
    pub name: String,
}

/// Classic configuration APIs.
#[async_trait]
pub trait ClassicClient: Send + Sync {
    /// Create the object, or update the existing object with the same name.
    async fn upsert_by_name(
        &self,
        api: &ApiDefinition,
        name: &str,
        payload: Bytes,
    ) -> RemoteResult<RemoteEntity>;

    /// Create or update the object with the given id. Used for APIs that do
    /// not enforce unique names.
    async fn upsert_by_id_and_name(
        &self,
        api: &ApiDefinition,
        id: &str,
        name: &str,
        payload: Bytes,
    ) -> RemoteResult<RemoteEntity>;
}

/// Raw response of an object API call.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub data: Bytes,
}

impl RawResponse {
    pub fn ok(data: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            data: data.into(),
        }
    }
}

/// All objects returned by a (possibly paged) list call.
#[derive(Debug, Clone, Default)]
pub struct ListResponse {
    pages: Vec<Vec<Bytes>>,
}

impl ListResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&mut self, objects: Vec<Bytes>) {
        self.pages.push(objects);
    }

    /// Raw objects of every page, in order.
    pub fn all(&self) -> impl Iterator<Item = &Bytes> {
        self.pages.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Bytes>> for ListResponse {
    fn from(objects: Vec<Bytes>) -> Self {
        Self {
            pages: vec![objects],
        }
    }
}

/// Object APIs without a natural local identifier (SLOs, settings).
///
/// `kind` selects the object collection: `slo` or a settings schema id.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    async fn list(&self, kind: &str) -> RemoteResult<ListResponse>;

    async fn update(&self, kind: &str, id: &str, payload: Bytes) -> RemoteResult<RawResponse>;

    async fn create(&self, kind: &str, payload: Bytes) -> RemoteResult<RawResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(RemoteError::NotFound("x".into()).is_not_found());
        assert!(
            RemoteError::Api {
                status: 404,
                message: "gone".into()
            }
            .is_not_found()
        );
        assert!(
            !RemoteError::Api {
                status: 500,
                message: "boom".into()
            }
            .is_not_found()
        );
        assert!(!RemoteError::Transport("reset".into()).is_not_found());
    }

    #[test]
    fn test_list_response_flattens_pages() {
        let mut list = ListResponse::new();
        list.push_page(vec![Bytes::from_static(b"1"), Bytes::from_static(b"2")]);
        list.push_page(vec![Bytes::from_static(b"3")]);
        let all: Vec<_> = list.all().cloned().collect();
        assert_eq!(all.len(), 3);
        assert_eq!(list.len(), 3);
        assert_eq!(all[2], Bytes::from_static(b"3"));
    }
}
