//! Batched row pushes.
//!
//! Large collections are written in fixed-size batches so a failure mid-way
//! loses at most one batch of progress. Batches are sequential; the first
//! failure halts the push and reports exactly how many rows were committed.

use crate::backend::RemoteBackend;
use crate::error::RemoteError;
use lexsync_model::Table;
use serde_json::Value;
use thiserror::Error;

/// A push that halted part-way through.
///
/// Rows in batches before `batch_index` are durably committed on the
/// backend; rows from `batch_index` onward were not sent.
#[derive(Debug, Error)]
#[error(
    "push of {table} halted at batch {batch_index}/{batch_count} after {committed_rows} committed rows: {source}"
)]
pub struct BatchFailure {
    /// The collection being pushed.
    pub table: Table,
    /// Zero-based index of the batch that failed.
    pub batch_index: usize,
    /// Total number of batches in this push.
    pub batch_count: usize,
    /// Rows committed before the failure.
    pub committed_rows: usize,
    /// The underlying remote error.
    pub source: RemoteError,
}

/// Pushes rows to one collection in sequential batches of `batch_size`.
///
/// Returns the number of rows committed. On failure, everything before the
/// failing batch stays committed; because upserts are idempotent, the next
/// sync simply rewrites those rows.
pub async fn push_in_batches(
    backend: &dyn RemoteBackend,
    table: Table,
    rows: &[Value],
    batch_size: usize,
) -> Result<usize, BatchFailure> {
    if rows.is_empty() {
        return Ok(0);
    }
    let batch_size = batch_size.max(1);
    let batch_count = rows.len().div_ceil(batch_size);
    let mut committed = 0usize;

    for (index, batch) in rows.chunks(batch_size).enumerate() {
        if let Err(source) = backend.upsert(table, batch).await {
            tracing::warn!(
                table = table.as_str(),
                batch = index,
                committed,
                "batched push halted"
            );
            return Err(BatchFailure {
                table,
                batch_index: index,
                batch_count,
                committed_rows: committed,
                source,
            });
        }
        committed += batch.len();
        tracing::trace!(
            table = table.as_str(),
            batch = index,
            committed,
            "batch committed"
        );
    }

    Ok(committed)
}
