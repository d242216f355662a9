//! Tombstone log handling.
//!
//! Deletions propagate between devices through an append-only log of
//! tombstones rather than through row absence. The log is bounded: each run
//! fetches only a trailing retention window, and a record is shadowed by a
//! tombstone only when its last update predates the deletion by more than a
//! small grace window, so a concurrent edit racing a delete survives.

use crate::error::EngineResult;
use chrono::{DateTime, Duration as TimeDelta, Utc};
use lexsync_model::{RecordKey, Table, Tombstone};
use lexsync_remote::RemoteBackend;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// The start of the tombstone fetch window.
pub fn retention_cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    now - TimeDelta::seconds(retention.as_secs() as i64)
}

/// A set of tombstones keyed by (table, record key), holding the latest
/// deletion instant per record.
#[derive(Debug, Default, Clone)]
pub struct TombstoneSet {
    entries: HashMap<(String, String), DateTime<Utc>>,
}

impl TombstoneSet {
    /// Builds the set from a fetched log window, keeping the latest
    /// deletion per record when the log holds duplicates.
    pub fn from_log(tombstones: &[Tombstone]) -> Self {
        let mut entries: HashMap<(String, String), DateTime<Utc>> = HashMap::new();
        for t in tombstones {
            let key = (t.table_name.clone(), t.record_id.clone());
            let entry = entries.entry(key).or_insert(t.deleted_at);
            if t.deleted_at > *entry {
                *entry = t.deleted_at;
            }
        }
        Self { entries }
    }

    /// Number of distinct tombstoned records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the window held no tombstones.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The deletion instant recorded for a record, if any.
    pub fn deleted_at(&self, table: Table, key: &RecordKey) -> Option<DateTime<Utc>> {
        self.entries
            .get(&(table.as_str().to_string(), key.to_string()))
            .copied()
    }

    /// True when a record with the given last update is shadowed by a
    /// tombstone: `updated_at < deleted_at - grace`. Updates at or inside
    /// the grace window survive the delete.
    pub fn shadows(
        &self,
        table: Table,
        key: &RecordKey,
        updated_at: DateTime<Utc>,
        grace: Duration,
    ) -> bool {
        match self.deleted_at(table, key) {
            Some(deleted_at) => {
                updated_at < deleted_at - TimeDelta::seconds(grace.as_secs() as i64)
            }
            None => false,
        }
    }
}

/// Writes deletions to the backend: tombstone first, then the row.
///
/// The ordering matters. Once the tombstone is durable, other devices drop
/// the record even if the row deletion below fails; a deletion denied by
/// row-level policy is surfaced to the caller, and the already-written
/// tombstone makes a later sync retry the row.
pub struct DeletionLog<'a, B: RemoteBackend + ?Sized> {
    backend: &'a B,
    owner: Uuid,
}

impl<'a, B: RemoteBackend + ?Sized> DeletionLog<'a, B> {
    /// Creates a deletion log writer for one owner.
    pub fn new(backend: &'a B, owner: Uuid) -> Self {
        Self { backend, owner }
    }

    /// Deletes one record: appends its tombstone, then removes the row.
    pub async fn delete_record(&self, table: Table, key: &RecordKey) -> EngineResult<()> {
        let tombstone = Tombstone::new(table, key, self.owner, Utc::now());
        self.backend.insert_tombstone(&tombstone).await?;
        tracing::debug!(table = table.as_str(), record = %key, "tombstone written");
        self.backend.delete(table, &[key.clone()], self.owner).await?;
        Ok(())
    }
}
