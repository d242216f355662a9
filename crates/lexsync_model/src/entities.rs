//! Flat record types and the identity/table plumbing the merge works over.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Serde default for `updated_at`: a missing timestamp always loses
/// conflicts against any real edit.
fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// A backend collection that participates in synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Clients (root of the client hierarchy).
    Clients,
    /// Cases, owned by a client.
    Cases,
    /// Stages, owned by a case.
    Stages,
    /// Sessions, owned by a stage.
    Sessions,
    /// Invoices, owned by a client.
    Invoices,
    /// Invoice line items, owned by an invoice.
    InvoiceItems,
    /// Case documents (binary attachment metadata), owned by a case.
    CaseDocuments,
    /// Flat administrative tasks.
    AdminTasks,
    /// Flat appointments.
    Appointments,
    /// Flat accounting ledger entries.
    AccountingEntries,
    /// Assistants, keyed by name within an owner scope.
    Assistants,
    /// Site-level financial ledger rows.
    SiteFinancials,
    /// Account profiles (not part of the synced document).
    Profiles,
    /// The append-only deletion tombstone log.
    DeletedRecords,
}

impl Table {
    /// Push order: parents strictly before children, so foreign keys written
    /// by a later batch always resolve against rows from an earlier one.
    pub const DEPENDENCY_ORDER: [Table; 12] = [
        Table::Clients,
        Table::Cases,
        Table::Stages,
        Table::Sessions,
        Table::Invoices,
        Table::InvoiceItems,
        Table::CaseDocuments,
        Table::AdminTasks,
        Table::Appointments,
        Table::AccountingEntries,
        Table::Assistants,
        Table::SiteFinancials,
    ];

    /// The backend relation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Clients => "clients",
            Table::Cases => "cases",
            Table::Stages => "stages",
            Table::Sessions => "sessions",
            Table::Invoices => "invoices",
            Table::InvoiceItems => "invoice_items",
            Table::CaseDocuments => "case_documents",
            Table::AdminTasks => "admin_tasks",
            Table::Appointments => "appointments",
            Table::AccountingEntries => "accounting_entries",
            Table::Assistants => "assistants",
            Table::SiteFinancials => "site_financials",
            Table::Profiles => "profiles",
            Table::DeletedRecords => "deleted_records",
        }
    }

    /// The upsert conflict target for this table.
    pub fn conflict_key(&self) -> &'static str {
        match self {
            Table::Assistants => "name,owner_id",
            _ => "id",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity of a record within its table.
///
/// Most tables use a UUID primary key; assistants are keyed by name within
/// an owner scope, and site financial rows use a numeric serial.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    /// UUID primary key.
    Id(Uuid),
    /// Natural key (assistant name).
    Name(String),
    /// Numeric serial key.
    Serial(i64),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Id(id) => write!(f, "{id}"),
            RecordKey::Name(name) => f.write_str(name),
            RecordKey::Serial(n) => write!(f, "{n}"),
        }
    }
}

/// A record the generic merge engine can reconcile.
///
/// Every implementor carries an owner partition key and a modification
/// timestamp; the merge never inspects anything else.
pub trait SyncRecord: Clone {
    /// The backend table this record syncs to.
    const TABLE: Table;

    /// The record's identity within its table.
    fn key(&self) -> RecordKey;

    /// The last-modification timestamp used for conflict resolution.
    fn updated_at(&self) -> DateTime<Utc>;
}

/// A client of the office. Root of the client → case → stage → session tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    /// Primary key.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Contact phone.
    #[serde(default)]
    pub phone: Option<String>,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Postal address.
    #[serde(default)]
    pub address: Option<String>,
    /// Multi-tenant partition key.
    #[serde(alias = "ownerId")]
    pub owner_id: Uuid,
    /// Last modification, used for last-writer-wins.
    #[serde(default = "unix_epoch", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A legal case, owned by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// Primary key.
    pub id: Uuid,
    /// Owning client.
    #[serde(alias = "clientId")]
    pub client_id: Uuid,
    /// Case subject.
    #[serde(default)]
    pub subject: Option<String>,
    /// Opposing party.
    #[serde(default)]
    pub opponent: Option<String>,
    /// Agreed fee.
    #[serde(default)]
    pub fee: Option<f64>,
    /// Case status.
    #[serde(default)]
    pub status: Option<String>,
    /// Multi-tenant partition key.
    #[serde(alias = "ownerId")]
    pub owner_id: Uuid,
    /// Last modification, used for last-writer-wins.
    #[serde(default = "unix_epoch", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A litigation stage within a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Primary key.
    pub id: Uuid,
    /// Owning case.
    #[serde(alias = "caseId")]
    pub case_id: Uuid,
    /// Court handling this stage.
    #[serde(default)]
    pub court: Option<String>,
    /// Court-assigned case number.
    #[serde(default, alias = "caseNumber")]
    pub case_number: Option<String>,
    /// Decision text, once issued.
    #[serde(default)]
    pub decision: Option<String>,
    /// Decision date, once issued.
    #[serde(default, alias = "decisionDate")]
    pub decision_date: Option<NaiveDate>,
    /// Multi-tenant partition key.
    #[serde(alias = "ownerId")]
    pub owner_id: Uuid,
    /// Last modification, used for last-writer-wins.
    #[serde(default = "unix_epoch", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A court session within a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Primary key.
    pub id: Uuid,
    /// Owning stage.
    #[serde(alias = "stageId")]
    pub stage_id: Uuid,
    /// Session date.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Date the session was postponed to, if any.
    #[serde(default, alias = "postponedTo")]
    pub postponed_to: Option<NaiveDate>,
    /// Reason for the postponement.
    #[serde(default, alias = "postponementReason")]
    pub postponement_reason: Option<String>,
    /// Person attending the session.
    #[serde(default)]
    pub assignee: Option<String>,
    /// Multi-tenant partition key.
    #[serde(alias = "ownerId")]
    pub owner_id: Uuid,
    /// Last modification, used for last-writer-wins.
    #[serde(default = "unix_epoch", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// An invoice issued to a client, optionally tied to a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Primary key.
    pub id: Uuid,
    /// Billed client.
    #[serde(alias = "clientId")]
    pub client_id: Uuid,
    /// Related case. Optional: a dangling reference here is kept, not pruned.
    #[serde(default, alias = "caseId")]
    pub case_id: Option<Uuid>,
    /// Issue date.
    #[serde(default, alias = "issuedOn")]
    pub issued_on: Option<NaiveDate>,
    /// Due date.
    #[serde(default, alias = "dueOn")]
    pub due_on: Option<NaiveDate>,
    /// Tax rate applied, as a fraction.
    #[serde(default, alias = "taxRate")]
    pub tax_rate: Option<f64>,
    /// Flat discount applied.
    #[serde(default)]
    pub discount: Option<f64>,
    /// Invoice status.
    #[serde(default)]
    pub status: Option<String>,
    /// Multi-tenant partition key.
    #[serde(alias = "ownerId")]
    pub owner_id: Uuid,
    /// Last modification, used for last-writer-wins.
    #[serde(default = "unix_epoch", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A line item on an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    /// Primary key.
    pub id: Uuid,
    /// Owning invoice.
    #[serde(alias = "invoiceId")]
    pub invoice_id: Uuid,
    /// Line description.
    pub description: String,
    /// Line amount.
    pub amount: f64,
    /// Multi-tenant partition key.
    #[serde(alias = "ownerId")]
    pub owner_id: Uuid,
    /// Last modification, used for last-writer-wins.
    #[serde(default = "unix_epoch", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A flat administrative task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminTask {
    /// Primary key.
    pub id: Uuid,
    /// Task title.
    pub title: String,
    /// Due date.
    #[serde(default, alias = "dueOn")]
    pub due_on: Option<NaiveDate>,
    /// Completion flag.
    #[serde(default)]
    pub done: bool,
    /// Multi-tenant partition key.
    #[serde(alias = "ownerId")]
    pub owner_id: Uuid,
    /// Last modification, used for last-writer-wins.
    #[serde(default = "unix_epoch", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A flat appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    /// Primary key.
    pub id: Uuid,
    /// Appointment title.
    pub title: String,
    /// Occurrence time.
    #[serde(default, alias = "occursAt")]
    pub occurs_at: Option<DateTime<Utc>>,
    /// Location.
    #[serde(default)]
    pub location: Option<String>,
    /// Multi-tenant partition key.
    #[serde(alias = "ownerId")]
    pub owner_id: Uuid,
    /// Last modification, used for last-writer-wins.
    #[serde(default = "unix_epoch", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A flat accounting ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingEntry {
    /// Primary key.
    pub id: Uuid,
    /// Entry description.
    #[serde(default)]
    pub description: Option<String>,
    /// Entry amount.
    pub amount: f64,
    /// Entry kind (income/expense).
    #[serde(default)]
    pub kind: Option<String>,
    /// Entry date.
    #[serde(default, alias = "entryDate")]
    pub entry_date: Option<NaiveDate>,
    /// Multi-tenant partition key.
    #[serde(alias = "ownerId")]
    pub owner_id: Uuid,
    /// Last modification, used for last-writer-wins.
    #[serde(default = "unix_epoch", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// An assistant account, keyed by name within an owner scope.
///
/// The one collection identified by a natural key rather than a UUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assistant {
    /// Natural key within the owner scope.
    pub name: String,
    /// Contact phone.
    #[serde(default)]
    pub phone: Option<String>,
    /// Multi-tenant partition key.
    #[serde(alias = "ownerId")]
    pub owner_id: Uuid,
    /// Last modification, used for last-writer-wins.
    #[serde(default = "unix_epoch", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Local lifecycle of a binary attachment, decoupled from metadata sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    /// Local binary exists and has not been uploaded yet.
    #[serde(alias = "pendingUpload")]
    PendingUpload,
    /// Local binary and remote blob agree.
    Synced,
    /// A download has been requested but not started.
    #[serde(alias = "pendingDownload")]
    PendingDownload,
    /// Only the remote blob exists; no local copy.
    #[serde(alias = "cloudOnly")]
    CloudOnly,
    /// A download is in flight.
    Downloading,
    /// The last upload attempt failed; retried as pending on the next run.
    Error,
}

impl DocumentState {
    /// True when this device holds the binary payload.
    pub fn has_local_copy(&self) -> bool {
        matches!(
            self,
            DocumentState::PendingUpload | DocumentState::Synced | DocumentState::Error
        )
    }

    /// True when the next sync run should attempt an upload.
    pub fn wants_upload(&self) -> bool {
        matches!(self, DocumentState::PendingUpload | DocumentState::Error)
    }
}

/// Metadata for a binary attachment on a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseDocument {
    /// Primary key.
    pub id: Uuid,
    /// Owning case.
    #[serde(alias = "caseId")]
    pub case_id: Uuid,
    /// Original file name.
    #[serde(alias = "fileName")]
    pub file_name: String,
    /// MIME type.
    #[serde(default, alias = "mimeType")]
    pub mime_type: Option<String>,
    /// Payload size in bytes.
    #[serde(default, alias = "sizeBytes")]
    pub size_bytes: Option<u64>,
    /// Blob location in the attachment namespace.
    #[serde(default, alias = "storagePath")]
    pub storage_path: Option<String>,
    /// Per-device attachment lifecycle state.
    #[serde(default = "DocumentState::default", alias = "localState")]
    pub local_state: DocumentState,
    /// Multi-tenant partition key.
    #[serde(alias = "ownerId")]
    pub owner_id: Uuid,
    /// Last modification, used for last-writer-wins.
    #[serde(default = "unix_epoch", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Default for DocumentState {
    fn default() -> Self {
        DocumentState::CloudOnly
    }
}

/// A site-level financial ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteFinancialEntry {
    /// Numeric serial key.
    pub id: i64,
    /// Entry description.
    #[serde(default)]
    pub description: Option<String>,
    /// Entry amount.
    pub amount: f64,
    /// Entry date.
    #[serde(default, alias = "entryDate")]
    pub entry_date: Option<NaiveDate>,
    /// Multi-tenant partition key.
    #[serde(alias = "ownerId")]
    pub owner_id: Uuid,
    /// Last modification, used for last-writer-wins.
    #[serde(default = "unix_epoch", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Ordinary user (lawyer or assistant).
    User,
    /// Administrator.
    Admin,
}

/// An account profile, used to resolve multi-tenant ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Account id (the authenticated user id).
    pub id: Uuid,
    /// Account role.
    #[serde(default = "Profile::default_role")]
    pub role: Role,
    /// For assistants, the lawyer whose data they work under.
    #[serde(default, alias = "lawyerId")]
    pub lawyer_id: Option<Uuid>,
}

impl Profile {
    fn default_role() -> Role {
        Role::User
    }

    /// The owner id this account's records live under.
    ///
    /// An assistant's data is owned by their lawyer, not by the assistant;
    /// everyone else owns their own partition. Resolved once per sync run
    /// and passed through explicitly.
    pub fn effective_owner(&self) -> Uuid {
        self.lawyer_id.unwrap_or(self.id)
    }
}

/// An append-only deletion marker.
///
/// Tombstones are never mutated, only appended and aged out of the fetch
/// window. They carry no `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    /// Relation the deleted record belonged to.
    #[serde(alias = "tableName")]
    pub table_name: String,
    /// The deleted record's key, rendered as text.
    #[serde(alias = "recordId")]
    pub record_id: String,
    /// Multi-tenant partition key.
    #[serde(alias = "ownerId")]
    pub owner_id: Uuid,
    /// When the deletion was recorded.
    #[serde(alias = "deletedAt")]
    pub deleted_at: DateTime<Utc>,
}

impl Tombstone {
    /// Creates a tombstone for a record in the given table.
    pub fn new(table: Table, key: &RecordKey, owner_id: Uuid, deleted_at: DateTime<Utc>) -> Self {
        Self {
            table_name: table.as_str().to_string(),
            record_id: key.to_string(),
            owner_id,
            deleted_at,
        }
    }

    /// True if this tombstone names the given record.
    pub fn matches(&self, table: Table, key: &RecordKey) -> bool {
        self.table_name == table.as_str() && self.record_id == key.to_string()
    }
}

macro_rules! impl_sync_record_by_id {
    ($($ty:ty => $table:expr),+ $(,)?) => {
        $(impl SyncRecord for $ty {
            const TABLE: Table = $table;

            fn key(&self) -> RecordKey {
                RecordKey::Id(self.id)
            }

            fn updated_at(&self) -> DateTime<Utc> {
                self.updated_at
            }
        })+
    };
}

impl_sync_record_by_id! {
    Client => Table::Clients,
    Case => Table::Cases,
    Stage => Table::Stages,
    Session => Table::Sessions,
    Invoice => Table::Invoices,
    InvoiceItem => Table::InvoiceItems,
    CaseDocument => Table::CaseDocuments,
    AdminTask => Table::AdminTasks,
    Appointment => Table::Appointments,
    AccountingEntry => Table::AccountingEntries,
}

impl SyncRecord for Assistant {
    const TABLE: Table = Table::Assistants;

    fn key(&self) -> RecordKey {
        RecordKey::Name(self.name.clone())
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl SyncRecord for SiteFinancialEntry {
    const TABLE: Table = Table::SiteFinancials;

    fn key(&self) -> RecordKey {
        RecordKey::Serial(self.id)
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
