//! REST implementation of the backend seams.
//!
//! Speaks a PostgREST-style row API plus an object-storage namespace for
//! attachment blobs. Every call re-validates the auth context through the
//! session provider and runs under an explicit timeout, so a long sync
//! survives a token refresh mid-run and never hangs on a dead connection.

use crate::auth::{fresh_session, SessionProvider};
use crate::backend::{BlobStore, RemoteBackend};
use crate::error::{classify_response, RemoteError, RemoteResult};
use crate::http::{ApiRequest, ApiResponse, HttpClient};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use lexsync_model::{Profile, RecordKey, Table, Tombstone};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Configuration for the REST backend.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Backend base URL.
    pub base_url: String,
    /// Timeout for bulk reads and writes.
    pub bulk_timeout: Duration,
    /// Timeout for lightweight checks.
    pub probe_timeout: Duration,
    /// Sessions expiring within this leeway are refreshed before use.
    pub auth_leeway: Duration,
}

impl RestConfig {
    /// Creates a configuration with the recommended defaults.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bulk_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(8),
            auth_leeway: Duration::from_secs(60),
        }
    }

    /// Sets the bulk call timeout.
    pub fn with_bulk_timeout(mut self, timeout: Duration) -> Self {
        self.bulk_timeout = timeout;
        self
    }

    /// Sets the lightweight check timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the auth refresh leeway.
    pub fn with_auth_leeway(mut self, leeway: Duration) -> Self {
        self.auth_leeway = leeway;
        self
    }
}

/// REST backend over an abstract HTTP client and session provider.
pub struct RestBackend<C: HttpClient, S: SessionProvider> {
    config: RestConfig,
    client: C,
    sessions: Arc<S>,
}

impl<C: HttpClient, S: SessionProvider> RestBackend<C, S> {
    /// Creates a new REST backend.
    pub fn new(config: RestConfig, client: C, sessions: Arc<S>) -> Self {
        Self {
            config,
            client,
            sessions,
        }
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn send(
        &self,
        operation: &str,
        table: &str,
        timeout: Duration,
        mut request: ApiRequest,
    ) -> RemoteResult<ApiResponse> {
        let session = fresh_session(&*self.sessions, self.config.auth_leeway).await?;
        request.headers.push((
            "authorization".into(),
            format!("Bearer {}", session.access_token),
        ));
        request.path = format!("{}{}", self.config.base_url, request.path);

        match tokio::time::timeout(timeout, self.client.execute(request)).await {
            Err(_) => {
                tracing::warn!(operation, "remote call timed out");
                Err(RemoteError::Timeout {
                    operation: operation.to_string(),
                    seconds: timeout.as_secs(),
                })
            }
            Ok(Err(message)) => Err(RemoteError::Network(message)),
            Ok(Ok(response)) if response.is_success() => Ok(response),
            Ok(Ok(response)) => Err(classify_response(
                response.status,
                &response.body_text(),
                table,
            )),
        }
    }

    fn rows_path(table: Table) -> String {
        format!("/rest/v1/{}", table.as_str())
    }

    fn key_filter(keys: &[RecordKey]) -> (String, String) {
        match keys.first() {
            Some(RecordKey::Name(_)) => {
                let names: Vec<String> = keys
                    .iter()
                    .map(|k| format!("\"{}\"", k))
                    .collect();
                ("name".into(), format!("in.({})", names.join(",")))
            }
            _ => {
                let ids: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                ("id".into(), format!("in.({})", ids.join(",")))
            }
        }
    }
}

#[async_trait]
impl<C: HttpClient, S: SessionProvider> RemoteBackend for RestBackend<C, S> {
    async fn probe(&self) -> RemoteResult<()> {
        let table = Table::DeletedRecords;
        let request = ApiRequest::get(Self::rows_path(table))
            .with_query("select", "record_id")
            .with_query("limit", "1");
        self.send("probe", table.as_str(), self.config.probe_timeout, request)
            .await?;
        Ok(())
    }

    async fn select_all(&self, table: Table, owner: Uuid) -> RemoteResult<Vec<Value>> {
        let request = ApiRequest::get(Self::rows_path(table))
            .with_query("select", "*")
            .with_query("owner_id", format!("eq.{owner}"));
        let operation = format!("select {}", table.as_str());
        let response = self
            .send(&operation, table.as_str(), self.config.bulk_timeout, request)
            .await?;
        response
            .json()
            .map_err(|e| RemoteError::Decode(format!("{}: {e}", table.as_str())))
    }

    async fn upsert(&self, table: Table, rows: &[Value]) -> RemoteResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let request = ApiRequest::post(Self::rows_path(table))
            .with_query("on_conflict", table.conflict_key())
            .with_header("prefer", "resolution=merge-duplicates,return=minimal")
            .with_json(&rows)
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        let operation = format!("upsert {}", table.as_str());
        self.send(&operation, table.as_str(), self.config.bulk_timeout, request)
            .await?;
        Ok(())
    }

    async fn delete(&self, table: Table, keys: &[RecordKey], owner: Uuid) -> RemoteResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let (column, filter) = Self::key_filter(keys);
        let request = ApiRequest::delete(Self::rows_path(table))
            .with_query(column, filter)
            .with_query("owner_id", format!("eq.{owner}"));
        let operation = format!("delete from {}", table.as_str());
        self.send(&operation, table.as_str(), self.config.bulk_timeout, request)
            .await?;
        Ok(())
    }

    async fn fetch_tombstones(
        &self,
        owner: Uuid,
        since: DateTime<Utc>,
    ) -> RemoteResult<Vec<Tombstone>> {
        let table = Table::DeletedRecords;
        let request = ApiRequest::get(Self::rows_path(table))
            .with_query("select", "*")
            .with_query("owner_id", format!("eq.{owner}"))
            .with_query(
                "deleted_at",
                format!("gte.{}", since.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        let response = self
            .send(
                "fetch tombstones",
                table.as_str(),
                self.config.bulk_timeout,
                request,
            )
            .await?;
        response
            .json()
            .map_err(|e| RemoteError::Decode(format!("deleted_records: {e}")))
    }

    async fn insert_tombstone(&self, tombstone: &Tombstone) -> RemoteResult<()> {
        let table = Table::DeletedRecords;
        let request = ApiRequest::post(Self::rows_path(table))
            .with_header("prefer", "return=minimal")
            .with_json(&[tombstone])
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.send(
            "insert tombstone",
            table.as_str(),
            self.config.bulk_timeout,
            request,
        )
        .await?;
        Ok(())
    }

    async fn fetch_profile(&self, user_id: Uuid) -> RemoteResult<Option<Profile>> {
        let table = Table::Profiles;
        let request = ApiRequest::get(Self::rows_path(table))
            .with_query("select", "*")
            .with_query("id", format!("eq.{user_id}"));
        let response = self
            .send(
                "fetch profile",
                table.as_str(),
                self.config.probe_timeout,
                request,
            )
            .await?;
        let mut profiles: Vec<Profile> = response
            .json()
            .map_err(|e| RemoteError::Decode(format!("profiles: {e}")))?;
        Ok(if profiles.is_empty() {
            None
        } else {
            Some(profiles.swap_remove(0))
        })
    }
}

#[async_trait]
impl<C: HttpClient, S: SessionProvider> BlobStore for RestBackend<C, S> {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> RemoteResult<()> {
        let request = ApiRequest::post(format!("/storage/v1/object/attachments/{path}"))
            .with_header("x-upsert", "true")
            .with_bytes(bytes);
        self.send("upload blob", "attachments", self.config.bulk_timeout, request)
            .await?;
        Ok(())
    }

    async fn download(&self, path: &str) -> RemoteResult<Vec<u8>> {
        let request = ApiRequest::get(format!("/storage/v1/object/attachments/{path}"));
        let response = self
            .send(
                "download blob",
                "attachments",
                self.config.bulk_timeout,
                request,
            )
            .await?;
        Ok(response.body)
    }

    async fn remove(&self, path: &str) -> RemoteResult<()> {
        let request = ApiRequest::delete(format!("/storage/v1/object/attachments/{path}"));
        self.send("remove blob", "attachments", self.config.bulk_timeout, request)
            .await?;
        Ok(())
    }
}
