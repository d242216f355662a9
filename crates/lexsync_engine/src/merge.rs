//! Last-writer-wins merge over flattened collections.
//!
//! The merge is pure: it consumes the local and remote flat sets plus the
//! tombstone window and produces a [`MergePlan`] with the merged picture,
//! the differential push set and the remote rows that still need deleting.
//! Orchestration (I/O, ordering, batching) lives in the engine.

use crate::documents::merge_documents;
use crate::tombstone::TombstoneSet;
use lexsync_model::{FlatSet, RecordKey, SyncRecord, Table};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Merge result for one collection.
#[derive(Debug, Clone)]
pub struct MergeOutcome<T> {
    /// The merged collection, the new local truth.
    pub merged: Vec<T>,
    /// Rows where the local copy won and must be pushed.
    pub push: Vec<T>,
    /// Remote rows shadowed by a tombstone, still to be deleted remotely.
    pub deletions: Vec<(Table, RecordKey)>,
}

/// Merges one collection record-by-record.
///
/// Ties go to the remote copy, so two devices holding the same timestamp
/// converge on the same row without pushing. Tombstones shadow records on
/// both sides; a shadowed local-only row is simply dropped (this is how a
/// deletion made on another device lands here), while a shadowed remote
/// row is additionally queued for deletion.
pub fn merge_collection<T: SyncRecord>(
    local: &[T],
    remote: &[T],
    tombstones: &TombstoneSet,
    grace: Duration,
) -> MergeOutcome<T> {
    let mut remote_by_key: HashMap<String, &T> =
        remote.iter().map(|r| (r.key().to_string(), r)).collect();

    let mut merged = Vec::new();
    let mut push = Vec::new();
    let mut deletions = Vec::new();

    for local_record in local {
        let key = local_record.key();
        match remote_by_key.remove(&key.to_string()) {
            Some(remote_record) => {
                let local_wins = local_record.updated_at() > remote_record.updated_at();
                let winner = if local_wins { local_record } else { remote_record };
                if tombstones.shadows(T::TABLE, &key, winner.updated_at(), grace) {
                    deletions.push((T::TABLE, key));
                } else {
                    merged.push(winner.clone());
                    if local_wins {
                        push.push(local_record.clone());
                    }
                }
            }
            None => {
                if !tombstones.shadows(T::TABLE, &key, local_record.updated_at(), grace) {
                    merged.push(local_record.clone());
                    push.push(local_record.clone());
                }
            }
        }
    }

    for remote_record in remote {
        let key = remote_record.key();
        if !remote_by_key.contains_key(&key.to_string()) {
            continue;
        }
        if tombstones.shadows(T::TABLE, &key, remote_record.updated_at(), grace) {
            deletions.push((T::TABLE, key));
        } else {
            merged.push(remote_record.clone());
        }
    }

    MergeOutcome {
        merged,
        push,
        deletions,
    }
}

/// The complete merge result across every synced collection.
#[derive(Debug, Default)]
pub struct MergePlan {
    /// The merged picture, persisted locally after the push succeeds.
    pub merged: FlatSet,
    /// The differential push set, a subset of `merged`.
    pub push: FlatSet,
    /// Remote rows shadowed by tombstones, deleted after the push.
    pub deletions: Vec<(Table, RecordKey)>,
}

impl MergePlan {
    /// Applies cascading referential pruning to the plan.
    ///
    /// The merged set is pruned transitively in dependency order; the push
    /// set is then restricted to rows that survived, so a pruned record is
    /// never written back to the backend.
    pub fn prune(&mut self) {
        prune_orphans(&mut self.merged);
        restrict_to(&mut self.push, &self.merged);
    }
}

/// Merges every collection of the two flat sets.
///
/// Attachment metadata is merged by the document rules (per-device state
/// preserved, local-only rows never re-pushed, metadata wins on shared
/// rows pushed like any other); everything else follows
/// [`merge_collection`].
pub fn merge_all(
    local: &FlatSet,
    remote: &FlatSet,
    tombstones: &TombstoneSet,
    grace: Duration,
) -> MergePlan {
    let mut plan = MergePlan::default();

    macro_rules! merge_field {
        ($field:ident) => {{
            let outcome = merge_collection(&local.$field, &remote.$field, tombstones, grace);
            plan.merged.$field = outcome.merged;
            plan.push.$field = outcome.push;
            plan.deletions.extend(outcome.deletions);
        }};
    }

    merge_field!(clients);
    merge_field!(cases);
    merge_field!(stages);
    merge_field!(sessions);
    merge_field!(invoices);
    merge_field!(invoice_items);
    merge_field!(tasks);
    merge_field!(appointments);
    merge_field!(accounting_entries);
    merge_field!(assistants);
    merge_field!(site_financials);

    let (documents, document_push) = merge_documents(&local.documents, &remote.documents);
    plan.merged.documents = documents;
    plan.push.documents = document_push;

    plan
}

/// Removes records whose parent chain no longer resolves.
///
/// Deleting a client cascades through its cases, stages, sessions, case
/// documents, invoices and invoice items. An invoice's optional `case_id`
/// is a soft reference and is deliberately not a prune edge.
pub fn prune_orphans(set: &mut FlatSet) {
    let clients: HashSet<_> = set.clients.iter().map(|c| c.id).collect();
    set.cases.retain(|c| clients.contains(&c.client_id));

    let cases: HashSet<_> = set.cases.iter().map(|c| c.id).collect();
    set.stages.retain(|s| cases.contains(&s.case_id));
    set.documents.retain(|d| cases.contains(&d.case_id));

    let stages: HashSet<_> = set.stages.iter().map(|s| s.id).collect();
    set.sessions.retain(|s| stages.contains(&s.stage_id));

    set.invoices.retain(|i| clients.contains(&i.client_id));
    let invoices: HashSet<_> = set.invoices.iter().map(|i| i.id).collect();
    set.invoice_items.retain(|i| invoices.contains(&i.invoice_id));
}

fn retain_members<T: SyncRecord>(push: &mut Vec<T>, merged: &[T]) {
    let keys: HashSet<String> = merged.iter().map(|r| r.key().to_string()).collect();
    push.retain(|r| keys.contains(&r.key().to_string()));
}

fn restrict_to(push: &mut FlatSet, merged: &FlatSet) {
    retain_members(&mut push.clients, &merged.clients);
    retain_members(&mut push.cases, &merged.cases);
    retain_members(&mut push.stages, &merged.stages);
    retain_members(&mut push.sessions, &merged.sessions);
    retain_members(&mut push.invoices, &merged.invoices);
    retain_members(&mut push.invoice_items, &merged.invoice_items);
    retain_members(&mut push.documents, &merged.documents);
    retain_members(&mut push.tasks, &merged.tasks);
    retain_members(&mut push.appointments, &merged.appointments);
    retain_members(&mut push.accounting_entries, &merged.accounting_entries);
    retain_members(&mut push.assistants, &merged.assistants);
    retain_members(&mut push.site_financials, &merged.site_financials);
}
