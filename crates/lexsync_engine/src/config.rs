//! Engine configuration.

use std::time::Duration;

/// Smallest accepted write batch.
pub const MIN_WRITE_BATCH: usize = 40;
/// Largest accepted write batch.
pub const MAX_WRITE_BATCH: usize = 200;

/// Tunable parameters for a sync run.
///
/// The two retention windows are policy knobs, not implementation details.
/// A device that stays offline longer than `tombstone_retention` misses the
/// tombstones pruned in the meantime and will resurrect the deleted rows on
/// its next sync; shortening the window trades log size against that risk.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Rows per write batch. Values outside 40..=200 are clamped.
    pub write_batch_size: usize,
    /// Timeout for bulk reads and writes.
    pub bulk_timeout: Duration,
    /// Timeout for the reachability probe.
    pub probe_timeout: Duration,
    /// Sessions expiring within this leeway are refreshed before use.
    pub auth_leeway: Duration,
    /// Trailing window of tombstones fetched each run.
    pub tombstone_retention: Duration,
    /// Concurrent-edit grace around a tombstone's deletion instant. An
    /// update within this window of the delete survives it.
    pub tombstone_grace: Duration,
    /// Age past which the server-side sweep removes attachment rows and
    /// blobs. Devices keep their local copies of swept documents.
    pub document_retention: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            write_batch_size: 100,
            bulk_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(8),
            auth_leeway: Duration::from_secs(60),
            tombstone_retention: Duration::from_secs(30 * 24 * 60 * 60),
            tombstone_grace: Duration::from_secs(2),
            document_retention: Duration::from_secs(48 * 60 * 60),
        }
    }
}

impl SyncConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the write batch size, clamped to the accepted range.
    pub fn with_write_batch_size(mut self, size: usize) -> Self {
        self.write_batch_size = size.clamp(MIN_WRITE_BATCH, MAX_WRITE_BATCH);
        self
    }

    /// Sets the bulk call timeout.
    pub fn with_bulk_timeout(mut self, timeout: Duration) -> Self {
        self.bulk_timeout = timeout;
        self
    }

    /// Sets the probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the auth refresh leeway.
    pub fn with_auth_leeway(mut self, leeway: Duration) -> Self {
        self.auth_leeway = leeway;
        self
    }

    /// Sets the tombstone retention window.
    pub fn with_tombstone_retention(mut self, retention: Duration) -> Self {
        self.tombstone_retention = retention;
        self
    }

    /// Sets the tombstone grace window.
    pub fn with_tombstone_grace(mut self, grace: Duration) -> Self {
        self.tombstone_grace = grace;
        self
    }

    /// Sets the attachment retention horizon.
    pub fn with_document_retention(mut self, retention: Duration) -> Self {
        self.document_retention = retention;
        self
    }
}
