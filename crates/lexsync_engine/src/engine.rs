//! The sync orchestrator.
//!
//! A run is crash-only: every remote effect is idempotent (upserts by
//! conflict key, append-only tombstones) and the local document is replaced
//! in a single `put` at the very end, so a failure at any earlier point
//! leaves the local store byte-identical and the next run converges.

use crate::config::SyncConfig;
use crate::documents::{sweep_expired_documents, upload_documents};
use crate::error::{EngineError, EngineResult};
use crate::merge::merge_all;
use crate::state::SyncState;
use crate::store::{LocalBlobs, LocalStore};
use crate::tombstone::{retention_cutoff, DeletionLog, TombstoneSet};
use chrono::Utc;
use lexsync_model::{flatten, reconstruct, FlatSet, RecordKey, Table, Tombstone};
use lexsync_remote::{
    fresh_session, push_in_batches, BlobStore, RemoteBackend, RemoteError, SessionProvider,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Rows pulled from the backend.
    pub pulled: usize,
    /// Rows pushed to the backend.
    pub pushed: usize,
    /// Remote rows deleted under tombstones.
    pub deleted: usize,
    /// Attachments uploaded.
    pub documents_uploaded: usize,
    /// Attachment uploads left for the next run to retry.
    pub document_failures: usize,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

/// Result of asking the engine to sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The run completed; here is what it did.
    Completed(SyncReport),
    /// Another run was already in flight; nothing was touched.
    AlreadyRunning,
}

/// The sync engine, generic over its three seams: the backend (rows and
/// blobs), the local document store and the session provider.
pub struct SyncEngine<B, S, P>
where
    B: RemoteBackend + BlobStore,
    S: LocalStore,
    P: SessionProvider,
{
    backend: Arc<B>,
    store: Arc<S>,
    blobs: Arc<dyn LocalBlobs>,
    sessions: Arc<P>,
    config: SyncConfig,
    state: Mutex<SyncState>,
    in_flight: AtomicBool,
    progress: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

impl<B, S, P> SyncEngine<B, S, P>
where
    B: RemoteBackend + BlobStore,
    S: LocalStore,
    P: SessionProvider,
{
    /// Creates an engine over the given seams.
    pub fn new(
        backend: Arc<B>,
        store: Arc<S>,
        blobs: Arc<dyn LocalBlobs>,
        sessions: Arc<P>,
        config: SyncConfig,
    ) -> Self {
        Self {
            backend,
            store,
            blobs,
            sessions,
            config,
            state: Mutex::new(SyncState::Idle),
            in_flight: AtomicBool::new(false),
            progress: None,
        }
    }

    /// Installs a progress callback. UI-only; the engine never waits on it.
    pub fn with_progress(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// The engine's current state.
    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    /// Runs one sync, or reports that one is already in flight.
    ///
    /// Single-flight: concurrent callers get [`SyncOutcome::AlreadyRunning`]
    /// immediately and the in-flight run is unaffected.
    pub async fn sync(&self) -> EngineResult<SyncOutcome> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("sync requested while a run is in flight");
            return Ok(SyncOutcome::AlreadyRunning);
        }

        let started = Instant::now();
        let result = self.run(started).await;
        self.in_flight.store(false, Ordering::SeqCst);

        match result {
            Ok(report) => {
                *self.state.lock() = SyncState::Synced;
                tracing::info!(
                    pulled = report.pulled,
                    pushed = report.pushed,
                    deleted = report.deleted,
                    "sync complete"
                );
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                let state = error_state(&e);
                *self.state.lock() = state;
                tracing::warn!(error = %e, %state, "sync failed");
                Err(e)
            }
        }
    }

    /// Deletes one record across devices: tombstone first, then the row.
    pub async fn delete_record(&self, table: Table, key: &RecordKey) -> EngineResult<()> {
        let owner = self.resolve_owner().await?;
        DeletionLog::new(self.backend.as_ref(), owner)
            .delete_record(table, key)
            .await
    }

    /// Runs the attachment retention sweep: backend rows and blobs whose
    /// metadata is older than the configured horizon are removed.
    pub async fn sweep_documents(&self) -> EngineResult<usize> {
        let owner = self.resolve_owner().await?;
        sweep_expired_documents(
            self.backend.as_ref(),
            owner,
            self.config.document_retention,
            Utc::now(),
        )
        .await
    }

    async fn resolve_owner(&self) -> EngineResult<Uuid> {
        let session = fresh_session(&*self.sessions, self.config.auth_leeway).await?;
        let owner = match self.backend.fetch_profile(session.user_id).await? {
            Some(profile) => profile.effective_owner(),
            None => session.user_id,
        };
        Ok(owner)
    }

    async fn run(&self, started: Instant) -> EngineResult<SyncReport> {
        self.set_state(SyncState::Checking);
        self.report_progress("checking backend");

        // Reachability first: the probe needs no owner or auth context, so
        // an unreachable backend surfaces here and nowhere later.
        match self.backend.probe().await {
            Ok(()) => {}
            Err(RemoteError::RelationMissing { table }) => {
                return Err(EngineError::NotProvisioned { table });
            }
            Err(
                e @ (RemoteError::Network(_)
                | RemoteError::Timeout { .. }
                | RemoteError::Unconfigured(_)),
            ) => {
                return Err(EngineError::Unavailable(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let owner = self.resolve_owner().await?;

        self.set_state(SyncState::Syncing);
        self.report_progress("pulling records");

        let cutoff = retention_cutoff(Utc::now(), self.config.tombstone_retention);
        let (remote, tombstone_log) = self.pull(owner, cutoff).await?;
        let pulled = remote.total_rows();

        let local_doc = self.store.get(owner)?.unwrap_or_default();
        let local = flatten(&local_doc);
        let tombstones = TombstoneSet::from_log(&tombstone_log);

        let mut plan = merge_all(&local, &remote, &tombstones, self.config.tombstone_grace);
        plan.prune();

        let mut pushed = 0;
        for table in Table::DEPENDENCY_ORDER {
            let rows = plan.push.to_rows(table)?;
            if rows.is_empty() {
                continue;
            }
            self.report_progress(&format!("uploading {table}"));
            pushed += push_in_batches(
                self.backend.as_ref(),
                table,
                &rows,
                self.config.write_batch_size,
            )
            .await?;
        }

        self.report_progress("uploading documents");
        let upload_report = upload_documents(
            self.backend.as_ref(),
            self.blobs.as_ref(),
            &mut plan.merged.documents,
        )
        .await;

        let mut deleted = 0;
        for (table, key) in &plan.deletions {
            match self
                .backend
                .delete(*table, std::slice::from_ref(key), owner)
                .await
            {
                Ok(()) => deleted += 1,
                Err(RemoteError::AuthorizationDenied { table }) => {
                    tracing::warn!(table = %table, record = %key, "deletion denied, retried next run");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let merged_doc = reconstruct(&plan.merged);
        self.store.put(owner, &merged_doc)?;
        self.report_progress("sync complete");

        Ok(SyncReport {
            pulled,
            pushed,
            deleted,
            documents_uploaded: upload_report.uploaded,
            document_failures: upload_report.failed,
            duration: started.elapsed(),
        })
    }

    async fn pull(
        &self,
        owner: Uuid,
        cutoff: chrono::DateTime<Utc>,
    ) -> EngineResult<(FlatSet, Vec<Tombstone>)> {
        let backend = self.backend.as_ref();
        let (
            clients,
            cases,
            stages,
            sessions,
            invoices,
            invoice_items,
            documents,
            tasks,
            appointments,
            accounting_entries,
            assistants,
            site_financials,
            tombstones,
        ) = tokio::try_join!(
            backend.select_all(Table::Clients, owner),
            backend.select_all(Table::Cases, owner),
            backend.select_all(Table::Stages, owner),
            backend.select_all(Table::Sessions, owner),
            backend.select_all(Table::Invoices, owner),
            backend.select_all(Table::InvoiceItems, owner),
            backend.select_all(Table::CaseDocuments, owner),
            backend.select_all(Table::AdminTasks, owner),
            backend.select_all(Table::Appointments, owner),
            backend.select_all(Table::AccountingEntries, owner),
            backend.select_all(Table::Assistants, owner),
            backend.select_all(Table::SiteFinancials, owner),
            backend.fetch_tombstones(owner, cutoff),
        )?;

        let mut remote = FlatSet::default();
        remote.insert_rows(Table::Clients, clients)?;
        remote.insert_rows(Table::Cases, cases)?;
        remote.insert_rows(Table::Stages, stages)?;
        remote.insert_rows(Table::Sessions, sessions)?;
        remote.insert_rows(Table::Invoices, invoices)?;
        remote.insert_rows(Table::InvoiceItems, invoice_items)?;
        remote.insert_rows(Table::CaseDocuments, documents)?;
        remote.insert_rows(Table::AdminTasks, tasks)?;
        remote.insert_rows(Table::Appointments, appointments)?;
        remote.insert_rows(Table::AccountingEntries, accounting_entries)?;
        remote.insert_rows(Table::Assistants, assistants)?;
        remote.insert_rows(Table::SiteFinancials, site_financials)?;
        Ok((remote, tombstones))
    }

    fn set_state(&self, state: SyncState) {
        *self.state.lock() = state;
    }

    fn report_progress(&self, message: &str) {
        if let Some(callback) = &self.progress {
            callback(message);
        }
    }
}

fn error_state(error: &EngineError) -> SyncState {
    match error {
        EngineError::Unavailable(_) => SyncState::Unconfigured,
        EngineError::NotProvisioned { .. } => SyncState::Uninitialized,
        _ => SyncState::Error,
    }
}
