//! The hierarchical document held in the local embedded store.
//!
//! The local store keeps one JSON-serializable document per owner id; the
//! sync engine flattens it for merging and replaces it wholesale at the end
//! of a successful run.

use crate::entities::{
    AccountingEntry, AdminTask, Appointment, Assistant, Case, CaseDocument, Client, Invoice,
    InvoiceItem, Session, SiteFinancialEntry, Stage,
};
use crate::error::ModelResult;
use serde::{Deserialize, Serialize};

/// A stage with its nested sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTree {
    /// The stage record.
    pub stage: Stage,
    /// Sessions held within this stage.
    #[serde(default)]
    pub sessions: Vec<Session>,
}

/// A case with its nested stages and attachments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseTree {
    /// The case record.
    pub case: Case,
    /// Stages of this case.
    #[serde(default)]
    pub stages: Vec<StageTree>,
    /// Binary attachment metadata for this case.
    #[serde(default)]
    pub documents: Vec<CaseDocument>,
}

/// A client with their nested cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientTree {
    /// The client record.
    pub client: Client,
    /// Cases belonging to this client.
    #[serde(default)]
    pub cases: Vec<CaseTree>,
}

/// An invoice with its nested line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceTree {
    /// The invoice record.
    pub invoice: Invoice,
    /// Line items on this invoice.
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
}

/// The full hierarchical dataset for one owner.
///
/// Every field tolerates being absent in persisted JSON; a freshly created
/// document is empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OfficeDocument {
    /// Clients with their case hierarchies.
    #[serde(default)]
    pub clients: Vec<ClientTree>,
    /// Invoices with their line items.
    #[serde(default)]
    pub invoices: Vec<InvoiceTree>,
    /// Flat administrative tasks.
    #[serde(default)]
    pub tasks: Vec<AdminTask>,
    /// Flat appointments.
    #[serde(default)]
    pub appointments: Vec<Appointment>,
    /// Flat accounting ledger entries.
    #[serde(default, alias = "accountingEntries")]
    pub accounting_entries: Vec<AccountingEntry>,
    /// Assistants in this owner scope.
    #[serde(default)]
    pub assistants: Vec<Assistant>,
    /// Site-level financial rows.
    #[serde(default, alias = "siteFinancials")]
    pub site_financials: Vec<SiteFinancialEntry>,
}

impl OfficeDocument {
    /// Decodes a persisted document, accepting legacy camelCase keys.
    pub fn from_json(json: &str) -> ModelResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encodes the document for persistence, in canonical snake_case.
    pub fn to_json(&self) -> ModelResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// True when the document holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
            && self.invoices.is_empty()
            && self.tasks.is_empty()
            && self.appointments.is_empty()
            && self.accounting_entries.is_empty()
            && self.assistants.is_empty()
            && self.site_financials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_from_empty_json() {
        let doc = OfficeDocument::from_json("{}").unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn document_roundtrips_through_json() {
        let doc = OfficeDocument::default();
        let back = OfficeDocument::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(doc, back);
    }

    #[test]
    fn malformed_document_is_rejected() {
        let err = OfficeDocument::from_json(r#"{"clients": 7}"#).unwrap_err();
        assert!(matches!(err, crate::ModelError::InvalidDocument(_)));
    }
}
