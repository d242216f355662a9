//! Resumable backup restore.
//!
//! Restoring a backup pushes every collection in dependency order. Unlike
//! a sync run, a restore is operator-driven: each collection is a step
//! with an explicit status and a cursor, so a failure half-way never
//! discards data; the operator retries or skips and the job picks up where
//! it stopped.

use crate::error::{EngineError, EngineResult};
use lexsync_model::{FlatSet, ModelResult, Table};
use lexsync_remote::{push_in_batches, RemoteBackend};
use serde_json::Value;

/// Status of one restore step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Not attempted yet.
    Pending,
    /// Pushed successfully.
    Done,
    /// Skipped by the operator.
    Skipped,
    /// The push halted; the reason is kept for display.
    Failed(String),
}

/// One collection to restore.
#[derive(Debug, Clone)]
pub struct RestoreStep {
    /// The collection being pushed.
    pub table: Table,
    /// Its rows, already wire-encoded.
    pub rows: Vec<Value>,
    /// Current status.
    pub status: StepStatus,
}

/// A restore job: ordered steps plus a cursor.
///
/// The transitions (`advance`, `skip`, `retry_from`) are pure; only
/// [`RestoreJob::run`] performs I/O.
#[derive(Debug)]
pub struct RestoreJob {
    steps: Vec<RestoreStep>,
    cursor: usize,
}

impl RestoreJob {
    /// Builds a job from a flattened backup, parents before children.
    /// Empty collections get no step.
    pub fn from_flat_set(set: &FlatSet) -> ModelResult<Self> {
        let mut steps = Vec::new();
        for table in Table::DEPENDENCY_ORDER {
            let rows = set.to_rows(table)?;
            if !rows.is_empty() {
                steps.push(RestoreStep {
                    table,
                    rows,
                    status: StepStatus::Pending,
                });
            }
        }
        Ok(Self { steps, cursor: 0 })
    }

    /// The job's steps, in push order.
    pub fn steps(&self) -> &[RestoreStep] {
        &self.steps
    }

    /// Index of the step the job is standing on.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// True when the cursor has moved past the last step.
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    /// Marks the current step done and moves on.
    pub fn advance(&mut self) {
        if let Some(step) = self.steps.get_mut(self.cursor) {
            step.status = StepStatus::Done;
            self.cursor += 1;
        }
    }

    /// Skips the current step and moves on.
    pub fn skip(&mut self) {
        if let Some(step) = self.steps.get_mut(self.cursor) {
            step.status = StepStatus::Skipped;
            self.cursor += 1;
        }
    }

    /// Rewinds to `index`, resetting that step and everything after it.
    pub fn retry_from(&mut self, index: usize) {
        let index = index.min(self.steps.len());
        for step in &mut self.steps[index..] {
            step.status = StepStatus::Pending;
        }
        self.cursor = index;
    }

    /// Pushes steps from the cursor onward.
    ///
    /// Stops at the first failure, recording it on the step; already-done
    /// and skipped steps are passed over. Because pushes upsert, resuming
    /// a half-restored collection rewrites its committed rows harmlessly.
    pub async fn run(
        &mut self,
        backend: &dyn RemoteBackend,
        batch_size: usize,
    ) -> EngineResult<()> {
        while self.cursor < self.steps.len() {
            let step = &self.steps[self.cursor];
            if !matches!(step.status, StepStatus::Pending | StepStatus::Failed(_)) {
                self.cursor += 1;
                continue;
            }

            tracing::info!(table = %step.table, rows = step.rows.len(), "restoring");
            match push_in_batches(backend, step.table, &step.rows, batch_size).await {
                Ok(_) => self.advance(),
                Err(failure) => {
                    self.steps[self.cursor].status = StepStatus::Failed(failure.to_string());
                    return Err(EngineError::PushHalted(failure));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lexsync_model::{Case, Client};
    use lexsync_remote::MockBackend;
    use uuid::Uuid;

    fn backup() -> FlatSet {
        let owner = Uuid::from_u128(99);
        let client = Client {
            id: Uuid::from_u128(1),
            name: "client".into(),
            phone: None,
            email: None,
            address: None,
            owner_id: owner,
            updated_at: Utc::now(),
        };
        let case = Case {
            id: Uuid::from_u128(2),
            client_id: client.id,
            subject: Some("subject".into()),
            opponent: None,
            fee: None,
            status: None,
            owner_id: owner,
            updated_at: Utc::now(),
        };
        FlatSet {
            clients: vec![client],
            cases: vec![case],
            ..FlatSet::default()
        }
    }

    #[test]
    fn steps_follow_dependency_order_and_skip_empty_tables() {
        let job = RestoreJob::from_flat_set(&backup()).unwrap();
        let tables: Vec<Table> = job.steps().iter().map(|s| s.table).collect();
        assert_eq!(tables, vec![Table::Clients, Table::Cases]);
    }

    #[tokio::test]
    async fn full_run_completes_every_step() {
        let backend = MockBackend::new();
        let mut job = RestoreJob::from_flat_set(&backup()).unwrap();

        job.run(&backend, 100).await.unwrap();

        assert!(job.is_complete());
        assert!(job.steps().iter().all(|s| s.status == StepStatus::Done));
        assert_eq!(backend.table_rows(Table::Clients).len(), 1);
        assert_eq!(backend.table_rows(Table::Cases).len(), 1);
    }

    #[tokio::test]
    async fn failure_halts_without_discarding_later_steps() {
        let backend = MockBackend::new();
        backend.fail_upsert_at(Table::Cases, 1);
        let mut job = RestoreJob::from_flat_set(&backup()).unwrap();

        let err = job.run(&backend, 100).await.unwrap_err();
        assert!(matches!(err, EngineError::PushHalted(_)));
        assert_eq!(job.cursor(), 1);
        assert_eq!(job.steps()[0].status, StepStatus::Done);
        assert!(matches!(job.steps()[1].status, StepStatus::Failed(_)));

        // The data is still there; a second run resumes at the failed step.
        job.run(&backend, 100).await.unwrap();
        assert!(job.is_complete());
        assert_eq!(backend.table_rows(Table::Cases).len(), 1);
    }

    #[tokio::test]
    async fn skip_passes_over_a_rejected_step() {
        let backend = MockBackend::new();
        backend.deny_writes(Table::Cases);
        let mut job = RestoreJob::from_flat_set(&backup()).unwrap();

        job.run(&backend, 100).await.unwrap_err();
        job.skip();
        job.run(&backend, 100).await.unwrap();

        assert!(job.is_complete());
        assert_eq!(job.steps()[1].status, StepStatus::Skipped);
        assert!(backend.table_rows(Table::Cases).is_empty());
    }

    #[test]
    fn retry_from_rewinds_statuses() {
        let mut job = RestoreJob::from_flat_set(&backup()).unwrap();
        job.advance();
        job.advance();
        assert!(job.is_complete());

        job.retry_from(0);
        assert_eq!(job.cursor(), 0);
        assert!(job
            .steps()
            .iter()
            .all(|s| s.status == StepStatus::Pending));
    }
}
