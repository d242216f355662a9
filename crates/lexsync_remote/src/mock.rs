//! In-memory backend for tests.
//!
//! [`MockBackend`] implements both [`RemoteBackend`] and [`BlobStore`] over
//! plain hash maps, with failure injection so engine tests can script
//! partial pushes, denied writes and unprovisioned schemas without a
//! network.

use crate::backend::{BlobStore, RemoteBackend};
use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lexsync_model::{Profile, RecordKey, SyncRecord, Table, Tombstone};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

#[derive(Default)]
struct Faults {
    /// 1-based upsert call number at which to fail, per table.
    fail_upsert_at: HashMap<Table, u64>,
    denied: Vec<Table>,
    missing: Vec<Table>,
}

/// An in-memory [`RemoteBackend`] and [`BlobStore`].
#[derive(Default)]
pub struct MockBackend {
    tables: RwLock<HashMap<Table, Vec<Value>>>,
    tombstones: RwLock<Vec<Tombstone>>,
    profiles: RwLock<HashMap<Uuid, Profile>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    upsert_counts: RwLock<HashMap<Table, u64>>,
    faults: RwLock<Faults>,
    fail_probe: AtomicBool,
    offline: AtomicBool,
    probe_delay: RwLock<Option<std::time::Duration>>,
}

impl MockBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds one record into a table, bypassing failure injection.
    pub fn seed<T: SyncRecord + Serialize>(&self, record: &T) {
        let row = serde_json::to_value(record).expect("record serializes");
        self.merge_row(T::TABLE, row);
    }

    /// Seeds raw rows into a table, bypassing failure injection.
    pub fn seed_rows(&self, table: Table, rows: Vec<Value>) {
        for row in rows {
            self.merge_row(table, row);
        }
    }

    /// Seeds a tombstone into the deletion log.
    pub fn seed_tombstone(&self, tombstone: Tombstone) {
        self.tombstones.write().push(tombstone);
    }

    /// Seeds an account profile.
    pub fn seed_profile(&self, profile: Profile) {
        self.profiles.write().insert(profile.id, profile);
    }

    /// Makes the nth upsert call (1-based) on a table fail with a network
    /// error. The failing call commits nothing.
    pub fn fail_upsert_at(&self, table: Table, nth_call: u64) {
        self.faults.write().fail_upsert_at.insert(table, nth_call);
    }

    /// Makes every write to a table fail as authorization-denied.
    pub fn deny_writes(&self, table: Table) {
        self.faults.write().denied.push(table);
    }

    /// Makes every operation on a table fail as relation-missing.
    pub fn set_missing(&self, table: Table) {
        self.faults.write().missing.push(table);
    }

    /// Makes the probe fail with a network error.
    pub fn fail_probe_network(&self) {
        self.fail_probe.store(true, Ordering::SeqCst);
    }

    /// Drops connectivity entirely: every backend and blob call fails
    /// with a network error.
    pub fn set_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    /// Makes the probe sleep before answering, to hold a run open.
    pub fn delay_probe(&self, delay: std::time::Duration) {
        *self.probe_delay.write() = Some(delay);
    }

    /// Raw rows currently stored for a table.
    pub fn table_rows(&self, table: Table) -> Vec<Value> {
        self.tables.read().get(&table).cloned().unwrap_or_default()
    }

    /// Typed rows currently stored for a table.
    pub fn typed_rows<T: DeserializeOwned>(&self, table: Table) -> Vec<T> {
        self.table_rows(table)
            .into_iter()
            .map(|row| serde_json::from_value(row).expect("stored row decodes"))
            .collect()
    }

    /// All tombstones in the deletion log.
    pub fn all_tombstones(&self) -> Vec<Tombstone> {
        self.tombstones.read().clone()
    }

    /// Number of upsert calls seen for a table.
    pub fn upsert_calls(&self, table: Table) -> u64 {
        self.upsert_counts
            .read()
            .get(&table)
            .copied()
            .unwrap_or(0)
    }

    /// The blob stored at a path, if any.
    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(path).cloned()
    }

    fn check_offline(&self) -> RemoteResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("network unreachable".into()));
        }
        Ok(())
    }

    fn check_missing(&self, table: Table) -> RemoteResult<()> {
        if self.faults.read().missing.contains(&table) {
            return Err(RemoteError::RelationMissing {
                table: table.as_str().to_string(),
            });
        }
        Ok(())
    }

    fn merge_row(&self, table: Table, row: Value) {
        let columns: Vec<&str> = table.conflict_key().split(',').collect();
        let mut tables = self.tables.write();
        let rows = tables.entry(table).or_default();
        let same_key = |existing: &Value| {
            columns
                .iter()
                .all(|col| existing.get(col) == row.get(*col))
        };
        if let Some(existing) = rows.iter_mut().find(|r| same_key(r)) {
            *existing = row;
        } else {
            rows.push(row);
        }
    }

    fn key_matches(row: &Value, key: &RecordKey) -> bool {
        match key {
            RecordKey::Id(id) => row
                .get("id")
                .and_then(Value::as_str)
                .is_some_and(|v| v == id.to_string()),
            RecordKey::Name(name) => row
                .get("name")
                .and_then(Value::as_str)
                .is_some_and(|v| v == name),
            RecordKey::Serial(serial) => {
                row.get("id").and_then(Value::as_i64) == Some(*serial)
            }
        }
    }
}

#[async_trait]
impl RemoteBackend for MockBackend {
    async fn probe(&self) -> RemoteResult<()> {
        let delay = *self.probe_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_offline()?;
        if self.fail_probe.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("connection refused".into()));
        }
        self.check_missing(Table::DeletedRecords)
    }

    async fn select_all(&self, table: Table, _owner: Uuid) -> RemoteResult<Vec<Value>> {
        self.check_offline()?;
        self.check_missing(table)?;
        Ok(self.table_rows(table))
    }

    async fn upsert(&self, table: Table, rows: &[Value]) -> RemoteResult<()> {
        self.check_offline()?;
        self.check_missing(table)?;
        if self.faults.read().denied.contains(&table) {
            return Err(RemoteError::AuthorizationDenied {
                table: table.as_str().to_string(),
            });
        }

        let call = {
            let mut counts = self.upsert_counts.write();
            let count = counts.entry(table).or_insert(0);
            *count += 1;
            *count
        };
        if self.faults.read().fail_upsert_at.get(&table) == Some(&call) {
            return Err(RemoteError::Network("connection reset mid-push".into()));
        }

        for row in rows {
            self.merge_row(table, row.clone());
        }
        Ok(())
    }

    async fn delete(&self, table: Table, keys: &[RecordKey], _owner: Uuid) -> RemoteResult<()> {
        self.check_offline()?;
        self.check_missing(table)?;
        if self.faults.read().denied.contains(&table) {
            return Err(RemoteError::AuthorizationDenied {
                table: table.as_str().to_string(),
            });
        }

        let mut tables = self.tables.write();
        if let Some(rows) = tables.get_mut(&table) {
            rows.retain(|row| !keys.iter().any(|key| Self::key_matches(row, key)));
        }
        Ok(())
    }

    async fn fetch_tombstones(
        &self,
        owner: Uuid,
        since: DateTime<Utc>,
    ) -> RemoteResult<Vec<Tombstone>> {
        self.check_offline()?;
        self.check_missing(Table::DeletedRecords)?;
        Ok(self
            .tombstones
            .read()
            .iter()
            .filter(|t| t.owner_id == owner && t.deleted_at >= since)
            .cloned()
            .collect())
    }

    async fn insert_tombstone(&self, tombstone: &Tombstone) -> RemoteResult<()> {
        self.check_offline()?;
        self.check_missing(Table::DeletedRecords)?;
        if self.faults.read().denied.contains(&Table::DeletedRecords) {
            return Err(RemoteError::AuthorizationDenied {
                table: Table::DeletedRecords.as_str().to_string(),
            });
        }
        self.tombstones.write().push(tombstone.clone());
        Ok(())
    }

    async fn fetch_profile(&self, user_id: Uuid) -> RemoteResult<Option<Profile>> {
        self.check_offline()?;
        self.check_missing(Table::Profiles)?;
        Ok(self.profiles.read().get(&user_id).cloned())
    }
}

#[async_trait]
impl BlobStore for MockBackend {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> RemoteResult<()> {
        self.check_offline()?;
        self.blobs.write().insert(path.to_string(), bytes);
        Ok(())
    }

    async fn download(&self, path: &str) -> RemoteResult<Vec<u8>> {
        self.check_offline()?;
        self.blobs
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| RemoteError::Unknown {
                status: 404,
                message: format!("no blob at {path}"),
            })
    }

    async fn remove(&self, path: &str) -> RemoteResult<()> {
        self.check_offline()?;
        self.blobs.write().remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_is_idempotent_on_conflict_key() {
        let backend = MockBackend::new();
        let id = Uuid::new_v4();

        backend
            .upsert(Table::Clients, &[json!({"id": id, "name": "before"})])
            .await
            .unwrap();
        backend
            .upsert(Table::Clients, &[json!({"id": id, "name": "after"})])
            .await
            .unwrap();

        let rows = backend.table_rows(Table::Clients);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "after");
    }

    #[tokio::test]
    async fn assistants_merge_on_name_and_owner() {
        let backend = MockBackend::new();
        let owner_a = Uuid::new_v4();
        let owner_b = Uuid::new_v4();

        backend
            .upsert(
                Table::Assistants,
                &[
                    json!({"name": "mona", "owner_id": owner_a}),
                    json!({"name": "mona", "owner_id": owner_b}),
                ],
            )
            .await
            .unwrap();
        backend
            .upsert(
                Table::Assistants,
                &[json!({"name": "mona", "owner_id": owner_a, "role": "senior"})],
            )
            .await
            .unwrap();

        assert_eq!(backend.table_rows(Table::Assistants).len(), 2);
    }

    #[tokio::test]
    async fn delete_by_key() {
        let backend = MockBackend::new();
        let keep = Uuid::new_v4();
        let gone = Uuid::new_v4();
        backend.seed_rows(
            Table::Cases,
            vec![json!({"id": keep}), json!({"id": gone})],
        );

        backend
            .delete(Table::Cases, &[RecordKey::Id(gone)], Uuid::nil())
            .await
            .unwrap();

        let rows = backend.table_rows(Table::Cases);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(keep));
    }

    #[tokio::test]
    async fn missing_relation_fails_every_operation() {
        let backend = MockBackend::new();
        backend.set_missing(Table::Clients);

        let err = backend.select_all(Table::Clients, Uuid::nil()).await;
        assert!(matches!(err, Err(RemoteError::RelationMissing { .. })));

        let err = backend.upsert(Table::Clients, &[json!({"id": 1})]).await;
        assert!(matches!(err, Err(RemoteError::RelationMissing { .. })));
    }

    #[tokio::test]
    async fn tombstones_filter_by_owner_and_window() {
        let backend = MockBackend::new();
        let owner = Uuid::new_v4();
        let now = Utc::now();
        backend.seed_tombstone(Tombstone::new(
            Table::Cases,
            &RecordKey::Id(Uuid::new_v4()),
            owner,
            now,
        ));
        backend.seed_tombstone(Tombstone::new(
            Table::Cases,
            &RecordKey::Id(Uuid::new_v4()),
            owner,
            now - chrono::Duration::days(60),
        ));
        backend.seed_tombstone(Tombstone::new(
            Table::Cases,
            &RecordKey::Id(Uuid::new_v4()),
            Uuid::new_v4(),
            now,
        ));

        let fetched = backend
            .fetch_tombstones(owner, now - chrono::Duration::days(30))
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
    }

    #[tokio::test]
    async fn blob_round_trip() {
        let backend = MockBackend::new();
        backend
            .upload("owner/doc.pdf", b"contents".to_vec())
            .await
            .unwrap();
        assert_eq!(
            backend.download("owner/doc.pdf").await.unwrap(),
            b"contents"
        );

        backend.remove("owner/doc.pdf").await.unwrap();
        assert!(backend.download("owner/doc.pdf").await.is_err());
    }
}
