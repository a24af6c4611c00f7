//! Object store seam used by the resize worker.
//!
//! The worker only talks to storage through [`ObjectStore`], so tests can
//! swap in an in-memory store and the service can run against the local
//! SQLite + disk implementation in `storage_service`.

use crate::{
    models::{container::Container, object::Object},
    services::storage_service::StorageResult,
};
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` under `container/key`, replacing any existing object.
    async fn upload(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<Object>;

    /// Read the full payload of a live object.
    async fn read(&self, container: &str, key: &str) -> StorageResult<Bytes>;

    /// Delete a live object. Fails with `ObjectNotFound` when there is none.
    async fn delete(&self, container: &str, key: &str) -> StorageResult<()>;

    /// Live objects of a container, ordered by key.
    async fn list(&self, container: &str) -> StorageResult<Vec<Object>>;

    async fn create_container(&self, name: &str) -> StorageResult<Container>;

    async fn delete_container(&self, name: &str) -> StorageResult<()>;
}
