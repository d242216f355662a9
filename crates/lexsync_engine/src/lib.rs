//! # LexSync Engine
//!
//! Offline-first merge engine and sync orchestrator for a legal
//! case-management dataset. Each device works against a local hierarchical
//! document and periodically reconciles it with a shared relational
//! backend; reconciliation is last-writer-wins per record with deletions
//! propagated through a bounded tombstone log.
//!
//! Architecture:
//! - [`SyncConfig`]: batch size, timeouts and retention window tunables
//! - [`TombstoneSet`] / [`DeletionLog`]: bounded deletion propagation
//! - [`merge_all`] / [`MergePlan`]: pure LWW merge plus cascading prune
//! - document functions: the attachment state machine, decoupled from
//!   the row merge
//! - [`SyncEngine`]: the orchestrator (single-flight, crash-only, one
//!   atomic local store swap per run)
//! - [`RestoreJob`]: operator-driven resumable backup restore
//!
//! The engine owns no I/O of its own: rows and blobs go through the
//! `lexsync_remote` traits, local persistence through [`LocalStore`] and
//! [`LocalBlobs`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod documents;
mod engine;
mod error;
mod merge;
mod restore;
mod state;
mod store;
mod tombstone;

pub use config::{SyncConfig, MAX_WRITE_BATCH, MIN_WRITE_BATCH};
pub use documents::{
    download_document, merge_documents, remove_local_copy, sweep_expired_documents,
    upload_documents, UploadReport,
};
pub use engine::{SyncEngine, SyncOutcome, SyncReport};
pub use error::{EngineError, EngineResult};
pub use merge::{merge_all, merge_collection, prune_orphans, MergeOutcome, MergePlan};
pub use restore::{RestoreJob, RestoreStep, StepStatus};
pub use state::SyncState;
pub use store::{LocalBlobs, LocalStore, MemoryBlobs, MemoryStore};
pub use tombstone::{retention_cutoff, DeletionLog, TombstoneSet};
