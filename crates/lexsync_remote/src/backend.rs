//! Backend trait seams.
//!
//! The merge engine talks to the backend exclusively through these traits;
//! the REST implementation and the in-memory mock both satisfy them.

use crate::error::RemoteResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lexsync_model::{Profile, RecordKey, Table, Tombstone};
use serde_json::Value;
use uuid::Uuid;

/// Row-level CRUD against the backend's collections.
///
/// Implementations guarantee a fresh auth context and an explicit timeout
/// on every call; callers never manage either.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Cheap reachability/provisioning check.
    ///
    /// Fails with a network error when the backend is unreachable and with
    /// a relation-missing error when the schema was never provisioned.
    async fn probe(&self) -> RemoteResult<()>;

    /// Reads every row of one collection for an owner.
    async fn select_all(&self, table: Table, owner: Uuid) -> RemoteResult<Vec<Value>>;

    /// Upserts rows into one collection using the table's conflict key.
    ///
    /// Upserting the same key twice never creates a duplicate row; the
    /// final state equals the last-applied record.
    async fn upsert(&self, table: Table, rows: &[Value]) -> RemoteResult<()>;

    /// Deletes the identified rows from one collection.
    async fn delete(&self, table: Table, keys: &[RecordKey], owner: Uuid) -> RemoteResult<()>;

    /// Reads the tombstone log for an owner, bounded to a trailing window.
    async fn fetch_tombstones(
        &self,
        owner: Uuid,
        since: DateTime<Utc>,
    ) -> RemoteResult<Vec<Tombstone>>;

    /// Appends one tombstone to the deletion log.
    async fn insert_tombstone(&self, tombstone: &Tombstone) -> RemoteResult<()>;

    /// Reads the account profile used to resolve the effective owner id.
    async fn fetch_profile(&self, user_id: Uuid) -> RemoteResult<Option<Profile>>;
}

/// The attachment blob namespace, keyed by storage path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Uploads a blob, replacing any existing payload at the path.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> RemoteResult<()>;

    /// Downloads the blob at the path.
    async fn download(&self, path: &str) -> RemoteResult<Vec<u8>>;

    /// Removes the blob at the path.
    async fn remove(&self, path: &str) -> RemoteResult<()>;
}
