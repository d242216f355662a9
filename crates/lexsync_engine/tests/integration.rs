//! End-to-end sync runs against the in-memory backend.

use chrono::{Duration as TimeDelta, Utc};
use lexsync_engine::{
    EngineError, LocalStore, MemoryBlobs, MemoryStore, SyncConfig, SyncEngine, SyncOutcome,
    SyncState,
};
use lexsync_model::{
    Appointment, Case, CaseDocument, CaseTree, Client, ClientTree, DocumentState, OfficeDocument,
    RecordKey, Session, Stage, StageTree, Table, Tombstone,
};
use lexsync_remote::{MockBackend, StaticSessions};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const OWNER: Uuid = Uuid::from_u128(0xA11CE);

struct Fixture {
    backend: Arc<MockBackend>,
    store: Arc<MemoryStore>,
    blobs: Arc<MemoryBlobs>,
    sessions: Arc<StaticSessions>,
    engine: SyncEngine<MockBackend, MemoryStore, StaticSessions>,
}

fn fixture(local: OfficeDocument, config: SyncConfig) -> Fixture {
    let backend = Arc::new(MockBackend::new());
    let store = Arc::new(MemoryStore::with_document(OWNER, local));
    let blobs = Arc::new(MemoryBlobs::new());
    let sessions = Arc::new(StaticSessions::logged_in(OWNER));
    let engine = SyncEngine::new(
        backend.clone(),
        store.clone(),
        blobs.clone(),
        sessions.clone(),
        config,
    );
    Fixture {
        backend,
        store,
        blobs,
        sessions,
        engine,
    }
}

fn client(id: u128, name: &str, updated_at: chrono::DateTime<Utc>) -> Client {
    Client {
        id: Uuid::from_u128(id),
        name: name.into(),
        phone: None,
        email: None,
        address: None,
        owner_id: OWNER,
        updated_at,
    }
}

fn case(id: u128, client_id: u128, updated_at: chrono::DateTime<Utc>) -> Case {
    Case {
        id: Uuid::from_u128(id),
        client_id: Uuid::from_u128(client_id),
        subject: Some("dispute".into()),
        opponent: None,
        fee: None,
        status: None,
        owner_id: OWNER,
        updated_at,
    }
}

fn doc_with_clients(clients: Vec<ClientTree>) -> OfficeDocument {
    OfficeDocument {
        clients,
        ..OfficeDocument::default()
    }
}

#[tokio::test]
async fn local_newer_record_wins_and_is_pushed() {
    let now = Utc::now();
    let local = doc_with_clients(vec![ClientTree {
        client: client(1, "renamed offline", now),
        cases: vec![],
    }]);
    let f = fixture(local, SyncConfig::default());
    f.backend
        .seed(&client(1, "stale remote name", now - TimeDelta::minutes(30)));

    let outcome = f.engine.sync().await.unwrap();

    let SyncOutcome::Completed(report) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(report.pushed, 1);
    assert_eq!(f.engine.state(), SyncState::Synced);

    let remote: Vec<Client> = f.backend.typed_rows(Table::Clients);
    assert_eq!(remote[0].name, "renamed offline");
    let merged = f.store.get(OWNER).unwrap().unwrap();
    assert_eq!(merged.clients[0].client.name, "renamed offline");
}

#[tokio::test]
async fn remote_only_record_is_merged_without_a_push() {
    let f = fixture(OfficeDocument::default(), SyncConfig::default());
    f.backend.seed(&Appointment {
        id: Uuid::from_u128(7),
        title: "hearing prep".into(),
        occurs_at: Some(Utc::now()),
        location: None,
        owner_id: OWNER,
        updated_at: Utc::now(),
    });

    f.engine.sync().await.unwrap();

    let merged = f.store.get(OWNER).unwrap().unwrap();
    assert_eq!(merged.appointments.len(), 1);
    assert_eq!(f.backend.upsert_calls(Table::Appointments), 0);
}

#[tokio::test]
async fn tombstoned_parent_cascades_through_the_local_hierarchy() {
    let now = Utc::now();
    let stale = now - TimeDelta::hours(2);
    let local = doc_with_clients(vec![ClientTree {
        client: client(1, "deleted elsewhere", stale),
        cases: vec![CaseTree {
            case: case(10, 1, stale),
            stages: vec![StageTree {
                stage: Stage {
                    id: Uuid::from_u128(100),
                    case_id: Uuid::from_u128(10),
                    court: None,
                    case_number: None,
                    decision: None,
                    decision_date: None,
                    owner_id: OWNER,
                    updated_at: stale,
                },
                sessions: vec![Session {
                    id: Uuid::from_u128(1000),
                    stage_id: Uuid::from_u128(100),
                    date: None,
                    postponed_to: None,
                    postponement_reason: None,
                    assignee: None,
                    owner_id: OWNER,
                    updated_at: stale,
                }],
            }],
            documents: vec![],
        }],
    }]);
    let f = fixture(local, SyncConfig::default());
    f.backend.seed(&client(1, "deleted elsewhere", stale));
    f.backend.seed_tombstone(Tombstone::new(
        Table::Clients,
        &RecordKey::Id(Uuid::from_u128(1)),
        OWNER,
        now,
    ));

    let SyncOutcome::Completed(report) = f.engine.sync().await.unwrap() else {
        panic!("expected a completed run");
    };

    assert_eq!(report.pushed, 0);
    assert_eq!(report.deleted, 1);
    assert!(f.backend.table_rows(Table::Clients).is_empty());
    let merged = f.store.get(OWNER).unwrap().unwrap();
    assert!(merged.is_empty());
}

#[tokio::test]
async fn push_failure_reports_the_batch_and_commits_nothing_locally() {
    let now = Utc::now();
    let trees: Vec<ClientTree> = (1..=250)
        .map(|i| ClientTree {
            client: client(i, &format!("client {i}"), now),
            cases: vec![],
        })
        .collect();
    let f = fixture(
        doc_with_clients(trees),
        SyncConfig::default().with_write_batch_size(40),
    );
    f.backend.fail_upsert_at(Table::Clients, 4);

    let err = f.engine.sync().await.unwrap_err();

    let EngineError::PushHalted(failure) = err else {
        panic!("expected a halted push");
    };
    assert_eq!(failure.table, Table::Clients);
    assert_eq!(failure.batch_index, 3);
    assert_eq!(failure.batch_count, 7);
    assert_eq!(failure.committed_rows, 120);
    assert_eq!(f.backend.table_rows(Table::Clients).len(), 120);

    // Crash-only: the local store was never touched.
    assert_eq!(f.store.put_count(), 0);
    assert_eq!(f.engine.state(), SyncState::Error);
}

#[tokio::test]
async fn concurrent_sync_returns_already_running() {
    let f = fixture(OfficeDocument::default(), SyncConfig::default());
    f.backend.delay_probe(Duration::from_millis(100));
    let engine = Arc::new(f.engine);

    let background = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sync().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = engine.sync().await.unwrap();
    assert_eq!(second, SyncOutcome::AlreadyRunning);

    let first = background.await.unwrap().unwrap();
    assert!(matches!(first, SyncOutcome::Completed(_)));
}

#[tokio::test]
async fn unreachable_backend_leaves_the_engine_unconfigured() {
    let f = fixture(OfficeDocument::default(), SyncConfig::default());
    f.backend.fail_probe_network();

    let err = f.engine.sync().await.unwrap_err();

    assert!(matches!(err, EngineError::Unavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(f.engine.state(), SyncState::Unconfigured);
}

#[tokio::test]
async fn fully_offline_device_still_lands_in_unconfigured() {
    // Every remote call fails, including the profile lookup; the
    // reachability check must be the call that decides the state.
    let f = fixture(OfficeDocument::default(), SyncConfig::default());
    f.backend.set_offline();

    let err = f.engine.sync().await.unwrap_err();

    assert!(matches!(err, EngineError::Unavailable(_)));
    assert_eq!(f.engine.state(), SyncState::Unconfigured);
}

#[tokio::test]
async fn missing_schema_leaves_the_engine_uninitialized() {
    let f = fixture(OfficeDocument::default(), SyncConfig::default());
    f.backend.set_missing(Table::DeletedRecords);

    let err = f.engine.sync().await.unwrap_err();

    assert!(matches!(err, EngineError::NotProvisioned { .. }));
    assert_eq!(f.engine.state(), SyncState::Uninitialized);
}

#[tokio::test]
async fn expired_session_is_refreshed_before_the_run() {
    let f = fixture(OfficeDocument::default(), SyncConfig::default());
    f.sessions.expire_now();

    let outcome = f.engine.sync().await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Completed(_)));
    assert!(f.sessions.refresh_calls() >= 1);
}

#[tokio::test]
async fn pending_document_uploads_blob_then_metadata() {
    let now = Utc::now();
    let document = CaseDocument {
        id: Uuid::from_u128(500),
        case_id: Uuid::from_u128(10),
        file_name: "contract.pdf".into(),
        mime_type: Some("application/pdf".into()),
        size_bytes: Some(9),
        storage_path: Some("owner/contract.pdf".into()),
        local_state: DocumentState::PendingUpload,
        owner_id: OWNER,
        updated_at: now,
    };
    let local = doc_with_clients(vec![ClientTree {
        client: client(1, "client", now),
        cases: vec![CaseTree {
            case: case(10, 1, now),
            stages: vec![],
            documents: vec![document],
        }],
    }]);
    let f = fixture(local, SyncConfig::default());
    f.blobs.seed("owner/contract.pdf", b"contract!".to_vec());

    let SyncOutcome::Completed(report) = f.engine.sync().await.unwrap() else {
        panic!("expected a completed run");
    };

    assert_eq!(report.documents_uploaded, 1);
    assert_eq!(report.document_failures, 0);
    assert_eq!(f.backend.blob("owner/contract.pdf").unwrap(), b"contract!");

    // Metadata reached the backend only through the upload pass.
    assert_eq!(f.backend.upsert_calls(Table::CaseDocuments), 1);
    let remote: Vec<CaseDocument> = f.backend.typed_rows(Table::CaseDocuments);
    assert_eq!(remote[0].local_state, DocumentState::Synced);

    let merged = f.store.get(OWNER).unwrap().unwrap();
    assert_eq!(
        merged.clients[0].cases[0].documents[0].local_state,
        DocumentState::Synced
    );
}

#[tokio::test]
async fn failed_document_upload_is_kept_for_retry_and_does_not_fail_the_run() {
    let now = Utc::now();
    let document = CaseDocument {
        id: Uuid::from_u128(500),
        case_id: Uuid::from_u128(10),
        file_name: "contract.pdf".into(),
        mime_type: None,
        size_bytes: None,
        storage_path: Some("owner/contract.pdf".into()),
        local_state: DocumentState::PendingUpload,
        owner_id: OWNER,
        updated_at: now,
    };
    let local = doc_with_clients(vec![ClientTree {
        client: client(1, "client", now),
        cases: vec![CaseTree {
            case: case(10, 1, now),
            stages: vec![],
            documents: vec![document],
        }],
    }]);
    // No local blob seeded: the upload must fail.
    let f = fixture(local, SyncConfig::default());

    let SyncOutcome::Completed(report) = f.engine.sync().await.unwrap() else {
        panic!("expected a completed run");
    };

    assert_eq!(report.documents_uploaded, 0);
    assert_eq!(report.document_failures, 1);
    assert!(f.backend.table_rows(Table::CaseDocuments).is_empty());

    let merged = f.store.get(OWNER).unwrap().unwrap();
    assert_eq!(
        merged.clients[0].cases[0].documents[0].local_state,
        DocumentState::Error
    );
}

#[tokio::test]
async fn locally_renamed_document_metadata_reaches_the_backend() {
    let now = Utc::now();
    let earlier = now - TimeDelta::hours(1);
    let renamed = CaseDocument {
        id: Uuid::from_u128(500),
        case_id: Uuid::from_u128(10),
        file_name: "renamed.pdf".into(),
        mime_type: Some("application/pdf".into()),
        size_bytes: Some(9),
        storage_path: Some("owner/contract.pdf".into()),
        local_state: DocumentState::Synced,
        owner_id: OWNER,
        updated_at: now,
    };
    let local = doc_with_clients(vec![ClientTree {
        client: client(1, "client", earlier),
        cases: vec![CaseTree {
            case: case(10, 1, earlier),
            stages: vec![],
            documents: vec![renamed.clone()],
        }],
    }]);
    let f = fixture(local, SyncConfig::default());
    f.backend.seed(&client(1, "client", earlier));
    f.backend.seed(&case(10, 1, earlier));
    let mut stale = renamed.clone();
    stale.file_name = "old-name.pdf".into();
    stale.updated_at = earlier;
    stale.local_state = DocumentState::CloudOnly;
    f.backend.seed(&stale);

    let SyncOutcome::Completed(report) = f.engine.sync().await.unwrap() else {
        panic!("expected a completed run");
    };

    // The rename won the merge, so it is written back like any other row.
    assert_eq!(report.pushed, 1);
    let remote: Vec<CaseDocument> = f.backend.typed_rows(Table::CaseDocuments);
    assert_eq!(remote[0].file_name, "renamed.pdf");
    let merged = f.store.get(OWNER).unwrap().unwrap();
    assert_eq!(
        merged.clients[0].cases[0].documents[0].file_name,
        "renamed.pdf"
    );
    assert_eq!(
        merged.clients[0].cases[0].documents[0].local_state,
        DocumentState::Synced
    );
}

#[tokio::test]
async fn document_sweep_honors_the_configured_horizon() {
    let now = Utc::now();
    let f = fixture(
        OfficeDocument::default(),
        SyncConfig::default().with_document_retention(Duration::from_secs(3600)),
    );
    let expired = CaseDocument {
        id: Uuid::from_u128(600),
        case_id: Uuid::from_u128(10),
        file_name: "expired.pdf".into(),
        mime_type: None,
        size_bytes: None,
        storage_path: Some("owner/expired.pdf".into()),
        local_state: DocumentState::Synced,
        owner_id: OWNER,
        updated_at: now - TimeDelta::hours(2),
    };
    let mut fresh = expired.clone();
    fresh.id = Uuid::from_u128(601);
    fresh.file_name = "fresh.pdf".into();
    fresh.storage_path = Some("owner/fresh.pdf".into());
    fresh.updated_at = now;
    f.backend.seed(&expired);
    f.backend.seed(&fresh);

    let swept = f.engine.sweep_documents().await.unwrap();

    assert_eq!(swept, 1);
    let remote: Vec<CaseDocument> = f.backend.typed_rows(Table::CaseDocuments);
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].file_name, "fresh.pdf");
    assert!(f.backend.all_tombstones().is_empty());
}

#[tokio::test]
async fn delete_record_propagates_to_a_second_device() {
    let now = Utc::now();
    let first = fixture(
        doc_with_clients(vec![ClientTree {
            client: client(1, "shared client", now - TimeDelta::hours(1)),
            cases: vec![],
        }]),
        SyncConfig::default(),
    );
    first.engine.sync().await.unwrap();

    first
        .engine
        .delete_record(Table::Clients, &RecordKey::Id(Uuid::from_u128(1)))
        .await
        .unwrap();
    assert!(first.backend.table_rows(Table::Clients).is_empty());

    // A second device that still holds the record locally syncs against
    // the same backend and drops it.
    let second_store = Arc::new(MemoryStore::with_document(
        OWNER,
        doc_with_clients(vec![ClientTree {
            client: client(1, "shared client", now - TimeDelta::hours(1)),
            cases: vec![],
        }]),
    ));
    let second = SyncEngine::new(
        first.backend.clone(),
        second_store.clone(),
        Arc::new(MemoryBlobs::new()),
        Arc::new(StaticSessions::logged_in(OWNER)),
        SyncConfig::default(),
    );
    second.sync().await.unwrap();

    let merged = second_store.get(OWNER).unwrap().unwrap();
    assert!(merged.is_empty());
    assert!(first.backend.table_rows(Table::Clients).is_empty());
}

#[tokio::test]
async fn owner_resolves_through_the_profile() {
    let lawyer = Uuid::from_u128(0xBEEF);
    let f = fixture(OfficeDocument::default(), SyncConfig::default());
    f.backend.seed_profile(lexsync_model::Profile {
        id: OWNER,
        role: lexsync_model::Role::User,
        lawyer_id: Some(lawyer),
    });
    f.backend.seed(&Client {
        owner_id: lawyer,
        ..client(1, "the lawyer's client", Utc::now())
    });

    f.engine.sync().await.unwrap();

    // The assistant's merged document lands under the lawyer's partition.
    assert!(f.store.get(OWNER).unwrap().unwrap().is_empty());
    let merged = f.store.get(lawyer).unwrap().unwrap();
    assert_eq!(merged.clients.len(), 1);
}

#[tokio::test]
async fn second_sync_after_transient_failure_converges() {
    let now = Utc::now();
    let trees: Vec<ClientTree> = (1..=100)
        .map(|i| ClientTree {
            client: client(i, &format!("client {i}"), now),
            cases: vec![],
        })
        .collect();
    let f = fixture(
        doc_with_clients(trees),
        SyncConfig::default().with_write_batch_size(40),
    );
    f.backend.fail_upsert_at(Table::Clients, 2);

    let err = f.engine.sync().await.unwrap_err();
    assert!(err.is_retryable());

    let SyncOutcome::Completed(report) = f.engine.sync().await.unwrap() else {
        panic!("expected a completed run");
    };
    assert_eq!(f.backend.table_rows(Table::Clients).len(), 100);
    assert_eq!(f.engine.state(), SyncState::Synced);
    // The retry rewrites the whole differential; upserts are idempotent.
    assert!(report.pushed >= 60);
}

#[tokio::test]
async fn untouched_dataset_pushes_nothing_on_a_second_run() {
    let now = Utc::now();
    let f = fixture(
        doc_with_clients(vec![ClientTree {
            client: client(1, "client", now),
            cases: vec![CaseTree {
                case: case(10, 1, now),
                stages: vec![],
                documents: vec![],
            }],
        }]),
        SyncConfig::default(),
    );

    f.engine.sync().await.unwrap();
    let calls_after_first = f.backend.upsert_calls(Table::Clients);

    let SyncOutcome::Completed(report) = f.engine.sync().await.unwrap() else {
        panic!("expected a completed run");
    };

    assert_eq!(report.pushed, 0);
    assert_eq!(f.backend.upsert_calls(Table::Clients), calls_after_first);
}
