//! Bidirectional conversion between the hierarchical document and the flat,
//! foreign-keyed relation set.
//!
//! `flatten` injects parent ids while walking the trees; `reconstruct`
//! groups children back under their parents. Children whose parent id does
//! not resolve are excluded from the reconstructed tree, never treated as
//! an error. Round-trip law: `reconstruct(flatten(h))` is structurally
//! equal to `h` (up to array ordering) whenever `h`'s foreign keys are
//! internally consistent.

use crate::entities::{
    AccountingEntry, AdminTask, Appointment, Assistant, Case, CaseDocument, Client, Invoice,
    InvoiceItem, Session, SiteFinancialEntry, Stage, Table,
};
use crate::error::{ModelError, ModelResult};
use crate::hierarchy::{CaseTree, ClientTree, InvoiceTree, OfficeDocument, StageTree};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// One `Vec` per synced table: the denormalized form of an
/// [`OfficeDocument`], ready for row-level storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatSet {
    /// Clients.
    pub clients: Vec<Client>,
    /// Cases.
    pub cases: Vec<Case>,
    /// Stages.
    pub stages: Vec<Stage>,
    /// Sessions.
    pub sessions: Vec<Session>,
    /// Invoices.
    pub invoices: Vec<Invoice>,
    /// Invoice line items.
    pub invoice_items: Vec<InvoiceItem>,
    /// Case document metadata.
    pub documents: Vec<CaseDocument>,
    /// Administrative tasks.
    pub tasks: Vec<AdminTask>,
    /// Appointments.
    pub appointments: Vec<Appointment>,
    /// Accounting ledger entries.
    pub accounting_entries: Vec<AccountingEntry>,
    /// Assistants.
    pub assistants: Vec<Assistant>,
    /// Site-level financial rows.
    pub site_financials: Vec<SiteFinancialEntry>,
}

fn encode_rows<T: Serialize>(table: Table, records: &[T]) -> ModelResult<Vec<Value>> {
    records
        .iter()
        .map(|r| {
            serde_json::to_value(r).map_err(|source| ModelError::EncodeRow {
                table: table.as_str(),
                source,
            })
        })
        .collect()
}

fn decode_rows<T: DeserializeOwned>(table: Table, rows: Vec<Value>) -> ModelResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|source| ModelError::InvalidRow {
                table: table.as_str(),
                source,
            })
        })
        .collect()
}

impl FlatSet {
    /// True when no table holds any rows.
    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }

    /// Total row count across all tables.
    pub fn total_rows(&self) -> usize {
        Table::DEPENDENCY_ORDER.iter().map(|t| self.rows(*t)).sum()
    }

    /// Row count for one table.
    pub fn rows(&self, table: Table) -> usize {
        match table {
            Table::Clients => self.clients.len(),
            Table::Cases => self.cases.len(),
            Table::Stages => self.stages.len(),
            Table::Sessions => self.sessions.len(),
            Table::Invoices => self.invoices.len(),
            Table::InvoiceItems => self.invoice_items.len(),
            Table::CaseDocuments => self.documents.len(),
            Table::AdminTasks => self.tasks.len(),
            Table::Appointments => self.appointments.len(),
            Table::AccountingEntries => self.accounting_entries.len(),
            Table::Assistants => self.assistants.len(),
            Table::SiteFinancials => self.site_financials.len(),
            Table::Profiles | Table::DeletedRecords => 0,
        }
    }

    /// Encodes one table's records as canonical JSON rows.
    ///
    /// Tables that are not part of the synced document yield no rows.
    pub fn to_rows(&self, table: Table) -> ModelResult<Vec<Value>> {
        match table {
            Table::Clients => encode_rows(table, &self.clients),
            Table::Cases => encode_rows(table, &self.cases),
            Table::Stages => encode_rows(table, &self.stages),
            Table::Sessions => encode_rows(table, &self.sessions),
            Table::Invoices => encode_rows(table, &self.invoices),
            Table::InvoiceItems => encode_rows(table, &self.invoice_items),
            Table::CaseDocuments => encode_rows(table, &self.documents),
            Table::AdminTasks => encode_rows(table, &self.tasks),
            Table::Appointments => encode_rows(table, &self.appointments),
            Table::AccountingEntries => encode_rows(table, &self.accounting_entries),
            Table::Assistants => encode_rows(table, &self.assistants),
            Table::SiteFinancials => encode_rows(table, &self.site_financials),
            Table::Profiles | Table::DeletedRecords => Ok(Vec::new()),
        }
    }

    /// Decodes rows fetched from the backend into one table's records.
    pub fn insert_rows(&mut self, table: Table, rows: Vec<Value>) -> ModelResult<()> {
        match table {
            Table::Clients => self.clients.extend(decode_rows(table, rows)?),
            Table::Cases => self.cases.extend(decode_rows(table, rows)?),
            Table::Stages => self.stages.extend(decode_rows(table, rows)?),
            Table::Sessions => self.sessions.extend(decode_rows(table, rows)?),
            Table::Invoices => self.invoices.extend(decode_rows(table, rows)?),
            Table::InvoiceItems => self.invoice_items.extend(decode_rows(table, rows)?),
            Table::CaseDocuments => self.documents.extend(decode_rows(table, rows)?),
            Table::AdminTasks => self.tasks.extend(decode_rows(table, rows)?),
            Table::Appointments => self.appointments.extend(decode_rows(table, rows)?),
            Table::AccountingEntries => {
                self.accounting_entries.extend(decode_rows(table, rows)?)
            }
            Table::Assistants => self.assistants.extend(decode_rows(table, rows)?),
            Table::SiteFinancials => self.site_financials.extend(decode_rows(table, rows)?),
            Table::Profiles | Table::DeletedRecords => {}
        }
        Ok(())
    }
}

/// Denormalizes the hierarchical document into a flat relation set,
/// injecting parent-id foreign keys along the way.
pub fn flatten(doc: &OfficeDocument) -> FlatSet {
    let mut flat = FlatSet::default();

    for client_tree in &doc.clients {
        let client_id = client_tree.client.id;
        flat.clients.push(client_tree.client.clone());

        for case_tree in &client_tree.cases {
            let mut case = case_tree.case.clone();
            case.client_id = client_id;
            let case_id = case.id;
            flat.cases.push(case);

            for stage_tree in &case_tree.stages {
                let mut stage = stage_tree.stage.clone();
                stage.case_id = case_id;
                let stage_id = stage.id;
                flat.stages.push(stage);

                for session in &stage_tree.sessions {
                    let mut session = session.clone();
                    session.stage_id = stage_id;
                    flat.sessions.push(session);
                }
            }

            for document in &case_tree.documents {
                let mut document = document.clone();
                document.case_id = case_id;
                flat.documents.push(document);
            }
        }
    }

    for invoice_tree in &doc.invoices {
        let invoice_id = invoice_tree.invoice.id;
        flat.invoices.push(invoice_tree.invoice.clone());

        for item in &invoice_tree.items {
            let mut item = item.clone();
            item.invoice_id = invoice_id;
            flat.invoice_items.push(item);
        }
    }

    flat.tasks = doc.tasks.clone();
    flat.appointments = doc.appointments.clone();
    flat.accounting_entries = doc.accounting_entries.clone();
    flat.assistants = doc.assistants.clone();
    flat.site_financials = doc.site_financials.clone();

    flat
}

fn group_by_parent<T, F>(records: &[T], parent: F) -> HashMap<Uuid, Vec<T>>
where
    T: Clone,
    F: Fn(&T) -> Uuid,
{
    let mut groups: HashMap<Uuid, Vec<T>> = HashMap::new();
    for record in records {
        groups.entry(parent(record)).or_default().push(record.clone());
    }
    groups
}

/// Rebuilds the hierarchical document from a flat relation set.
///
/// Children are grouped under their parent in input order; children whose
/// parent is absent from the set are dropped.
pub fn reconstruct(flat: &FlatSet) -> OfficeDocument {
    let mut cases_by_client = group_by_parent(&flat.cases, |c: &Case| c.client_id);
    let mut stages_by_case = group_by_parent(&flat.stages, |s: &Stage| s.case_id);
    let mut sessions_by_stage = group_by_parent(&flat.sessions, |s: &Session| s.stage_id);
    let mut documents_by_case = group_by_parent(&flat.documents, |d: &CaseDocument| d.case_id);
    let mut items_by_invoice = group_by_parent(&flat.invoice_items, |i: &InvoiceItem| i.invoice_id);

    let clients = flat
        .clients
        .iter()
        .map(|client| {
            let cases = cases_by_client
                .remove(&client.id)
                .unwrap_or_default()
                .into_iter()
                .map(|case| {
                    let stages = stages_by_case
                        .remove(&case.id)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|stage| {
                            let sessions =
                                sessions_by_stage.remove(&stage.id).unwrap_or_default();
                            StageTree { stage, sessions }
                        })
                        .collect();
                    let documents = documents_by_case.remove(&case.id).unwrap_or_default();
                    CaseTree {
                        case,
                        stages,
                        documents,
                    }
                })
                .collect();
            ClientTree {
                client: client.clone(),
                cases,
            }
        })
        .collect();

    let invoices = flat
        .invoices
        .iter()
        .map(|invoice| InvoiceTree {
            invoice: invoice.clone(),
            items: items_by_invoice.remove(&invoice.id).unwrap_or_default(),
        })
        .collect();

    OfficeDocument {
        clients,
        invoices,
        tasks: flat.tasks.clone(),
        appointments: flat.appointments.clone(),
        accounting_entries: flat.accounting_entries.clone(),
        assistants: flat.assistants.clone(),
        site_financials: flat.site_financials.clone(),
    }
}
