//! # LexSync Model
//!
//! Domain model for the LexSync offline-first synchronization engine.
//!
//! This crate provides:
//! - The flat, foreign-keyed record types held in the relational backend
//! - The hierarchical office document held in the local embedded store
//! - The bidirectional flattener/reconstructor between the two shapes
//! - The [`SyncRecord`] seam the generic merge engine works over
//!
//! ## Canonical schema
//!
//! All wire and document field names are snake_case. Legacy camelCase keys
//! are accepted on input through explicit `serde(alias)` attributes on the
//! record types; output is always canonical. This is the single mapping
//! layer between naming conventions; nothing else in the workspace
//! renames fields.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entities;
mod error;
mod flatten;
mod hierarchy;

pub use entities::{
    AccountingEntry, AdminTask, Appointment, Assistant, Case, CaseDocument, Client,
    DocumentState, Invoice, InvoiceItem, Profile, RecordKey, Role, Session, SiteFinancialEntry,
    Stage, SyncRecord, Table, Tombstone,
};
pub use error::{ModelError, ModelResult};
pub use flatten::{flatten, reconstruct, FlatSet};
pub use hierarchy::{CaseTree, ClientTree, InvoiceTree, OfficeDocument, StageTree};
