//! Attachment lifecycle.
//!
//! Attachment metadata rows sync like any other collection, but the binary
//! payload moves separately through a small per-device state machine
//! (`local_state` never leaves the device's point of view: the same row can
//! be `Synced` on one device and `CloudOnly` on another). A metadata edit
//! that wins the merge on a row both sides know joins the generic push;
//! fresh uploads instead go through [`upload_documents`], which writes the
//! metadata row only after the blob it describes is durably stored.

use crate::error::{EngineError, EngineResult};
use crate::store::LocalBlobs;
use chrono::{DateTime, Duration as TimeDelta, Utc};
use lexsync_model::{CaseDocument, DocumentState, RecordKey, Table};
use lexsync_remote::{BlobStore, RemoteBackend};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of one upload pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    /// Documents whose blob and metadata both reached the backend.
    pub uploaded: usize,
    /// Documents left in the `Error` state for the next run to retry.
    pub failed: usize,
}

/// Merges attachment metadata, preserving this device's `local_state`.
///
/// Returns `(merged, push)`: the merged collection plus the rows whose
/// metadata won locally against an existing backend row and must be written
/// back. Remote-only documents appear as `CloudOnly`. A local-only document
/// with a local copy is kept even though the backend no longer knows it
/// (the server retention sweep removes old rows; the local copy stays
/// usable) and is never re-pushed. A local-only document without a copy
/// points at nothing on either side and is dropped.
pub fn merge_documents(
    local: &[CaseDocument],
    remote: &[CaseDocument],
) -> (Vec<CaseDocument>, Vec<CaseDocument>) {
    let mut remote_by_id: HashMap<Uuid, &CaseDocument> =
        remote.iter().map(|d| (d.id, d)).collect();

    let mut merged = Vec::new();
    let mut push = Vec::new();
    for local_doc in local {
        match remote_by_id.remove(&local_doc.id) {
            Some(remote_doc) => {
                if remote_doc.updated_at > local_doc.updated_at {
                    let mut doc = remote_doc.clone();
                    doc.local_state = local_doc.local_state;
                    merged.push(doc);
                } else {
                    if local_doc.updated_at > remote_doc.updated_at {
                        push.push(local_doc.clone());
                    }
                    merged.push(local_doc.clone());
                }
            }
            None => {
                if local_doc.local_state.has_local_copy() {
                    merged.push(local_doc.clone());
                }
            }
        }
    }

    for remote_doc in remote {
        if remote_by_id.contains_key(&remote_doc.id) {
            let mut doc = remote_doc.clone();
            doc.local_state = DocumentState::CloudOnly;
            merged.push(doc);
        }
    }

    (merged, push)
}

/// Uploads every document waiting for upload (fresh or retried).
///
/// For each document the blob goes first, then the metadata row with state
/// `Synced`; a failure at either step marks the document `Error` locally
/// without touching the backend row, and the pass continues with the next
/// document. The returned report feeds the sync report.
pub async fn upload_documents<B>(
    backend: &B,
    blobs: &dyn LocalBlobs,
    documents: &mut [CaseDocument],
) -> UploadReport
where
    B: RemoteBackend + BlobStore,
{
    let mut report = UploadReport::default();

    for doc in documents.iter_mut() {
        if !doc.local_state.wants_upload() {
            continue;
        }
        let path = doc
            .storage_path
            .get_or_insert_with(|| format!("{}/{}/{}", doc.owner_id, doc.id, doc.file_name))
            .clone();

        match try_upload(backend, blobs, doc, &path).await {
            Ok(()) => {
                doc.local_state = DocumentState::Synced;
                report.uploaded += 1;
            }
            Err(e) => {
                tracing::warn!(file = %doc.file_name, error = %e, "document upload failed");
                doc.local_state = DocumentState::Error;
                report.failed += 1;
            }
        }
    }

    report
}

async fn try_upload<B>(
    backend: &B,
    blobs: &dyn LocalBlobs,
    doc: &CaseDocument,
    path: &str,
) -> EngineResult<()>
where
    B: RemoteBackend + BlobStore,
{
    let bytes = blobs.read(path)?;
    backend.upload(path, bytes).await?;

    let mut row = doc.clone();
    row.local_state = DocumentState::Synced;
    let value = serde_json::to_value(&row)
        .map_err(|e| EngineError::store(format!("encode document row: {e}")))?;
    backend.upsert(Table::CaseDocuments, &[value]).await?;
    Ok(())
}

/// Downloads a document's blob on demand.
///
/// Walks `CloudOnly -> Downloading -> Synced`; any failure restores
/// `CloudOnly` so the download can be requested again.
pub async fn download_document<B>(
    backend: &B,
    blobs: &dyn LocalBlobs,
    doc: &mut CaseDocument,
) -> EngineResult<()>
where
    B: BlobStore,
{
    let path = doc
        .storage_path
        .clone()
        .ok_or_else(|| EngineError::DocumentUnavailable {
            file_name: doc.file_name.clone(),
        })?;

    doc.local_state = DocumentState::Downloading;
    let result: EngineResult<()> = async {
        let bytes = backend.download(&path).await?;
        blobs.write(&path, &bytes)?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            doc.local_state = DocumentState::Synced;
            Ok(())
        }
        Err(e) => {
            doc.local_state = DocumentState::CloudOnly;
            Err(e)
        }
    }
}

/// Frees the local copy of a synced document.
///
/// Only the local blob is deleted; the backend row and blob are untouched
/// and no tombstone is written. The document can be downloaded again later.
pub fn remove_local_copy(blobs: &dyn LocalBlobs, doc: &mut CaseDocument) -> EngineResult<()> {
    if let Some(path) = &doc.storage_path {
        blobs.remove(path)?;
    }
    doc.local_state = DocumentState::CloudOnly;
    Ok(())
}

/// Server-side retention sweep: removes attachment rows and blobs whose
/// metadata is older than the horizon.
///
/// Deliberately writes no tombstones. Devices holding a local copy keep
/// their orphaned row usable after the sweep; devices without one see the
/// row disappear on their next sync.
pub async fn sweep_expired_documents<B>(
    backend: &B,
    owner: Uuid,
    horizon: Duration,
    now: DateTime<Utc>,
) -> EngineResult<usize>
where
    B: RemoteBackend + BlobStore,
{
    let cutoff = now - TimeDelta::seconds(horizon.as_secs() as i64);
    let rows = backend.select_all(Table::CaseDocuments, owner).await?;

    let mut expired_keys = Vec::new();
    for row in rows {
        let doc: CaseDocument = serde_json::from_value(row)
            .map_err(|e| EngineError::store(format!("decode document row: {e}")))?;
        if doc.updated_at < cutoff {
            if let Some(path) = &doc.storage_path {
                backend.remove(path).await?;
            }
            expired_keys.push(RecordKey::Id(doc.id));
        }
    }

    let swept = expired_keys.len();
    if swept > 0 {
        backend
            .delete(Table::CaseDocuments, &expired_keys, owner)
            .await?;
        tracing::info!(swept, "expired attachments removed");
    }
    Ok(swept)
}
