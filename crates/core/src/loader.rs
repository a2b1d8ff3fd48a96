//! Batched, idempotent persistence of attendance events.
//!
//! Events are written in fixed-size batches so one poisoned batch
//! costs at most `batch_size` records. `load` never returns an error:
//! batch failures are folded into the outcome and reported upward as
//! counters.

use tracing::{info, warn};

use crate::db::repository::AttendanceRepository;
use crate::models::attendance::AttendanceEvent;

/// Outcome of one failed or succeeded batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Zero-based batch index within the load.
    pub index: usize,
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
    pub error: Option<String>,
}

/// Aggregate outcome of a whole load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
    pub batches: Vec<BatchOutcome>,
}

impl LoadOutcome {
    pub fn loaded(&self) -> u64 {
        self.inserted + self.updated
    }
}

pub struct BulkLoader {
    batch_size: usize,
}

impl BulkLoader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Persist events in batches. Reloading the same events is a no-op
    /// apart from `inserted` flipping to `updated`.
    pub async fn load<R: AttendanceRepository + ?Sized>(
        &self,
        repository: &R,
        events: &[AttendanceEvent],
    ) -> LoadOutcome {
        let mut outcome = LoadOutcome::default();

        for (index, batch) in events.chunks(self.batch_size).enumerate() {
            match repository.upsert_attendance_batch(batch).await {
                Ok(counts) => {
                    outcome.inserted += counts.inserted;
                    outcome.updated += counts.updated;
                    outcome.failed += counts.failed;
                    outcome.batches.push(BatchOutcome {
                        index,
                        inserted: counts.inserted,
                        updated: counts.updated,
                        failed: counts.failed,
                        error: None,
                    });
                }
                Err(e) => {
                    // The whole batch rolled back; its records count
                    // as failed and the next batch proceeds.
                    warn!(batch = index, size = batch.len(), error = %e, "batch load failed");
                    outcome.failed += batch.len() as u64;
                    outcome.batches.push(BatchOutcome {
                        index,
                        inserted: 0,
                        updated: 0,
                        failed: batch.len() as u64,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        info!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            failed = outcome.failed,
            batches = outcome.batches.len(),
            "bulk load complete"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::BatchCounts;
    use crate::db::sqlite::SqliteRepository;
    use crate::db::DatabasePool;
    use crate::error::{Result, RollcallError};
    use crate::models::attendance::{EndpointShape, PresenceState, Provenance};
    use crate::models::school::SchoolMapping;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(student: &str, day: u32) -> AttendanceEvent {
        AttendanceEvent {
            student_id: student.into(),
            school_id: "sch-1".into(),
            date: NaiveDate::from_ymd_opt(2024, 8, day).unwrap(),
            state: PresenceState::Present,
            periods: vec![PresenceState::Present; 7],
            provenance: Provenance::Observed,
            source_shape: EndpointShape::DayLevel,
        }
    }

    async fn sqlite_repo() -> SqliteRepository {
        let DatabasePool::Sqlite(pool) = DatabasePool::new_sqlite_memory()
            .await
            .expect("in-memory database");
        let repo = SqliteRepository::new(pool);
        crate::db::repository::SchoolRepository::upsert_school(
            &repo,
            &SchoolMapping::new("sch-1", "Lincoln", "001", 7),
        )
        .await
        .expect("seed school");
        repo
    }

    #[tokio::test]
    async fn load_splits_into_batches() {
        let repo = sqlite_repo().await;
        let events: Vec<_> = (1..=5).map(|d| event(&format!("stu-{d}"), d)).collect();

        let loader = BulkLoader::new(2);
        let outcome = loader.load(&repo, &events).await;
        assert_eq!(outcome.inserted, 5);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.batches.len(), 3);
        assert_eq!(outcome.loaded(), 5);
    }

    #[tokio::test]
    async fn reload_is_idempotent() {
        let repo = sqlite_repo().await;
        let events: Vec<_> = (1..=4).map(|d| event(&format!("stu-{d}"), d)).collect();

        let loader = BulkLoader::new(10);
        let first = loader.load(&repo, &events).await;
        assert_eq!(first.inserted, 4);

        let second = loader.load(&repo, &events).await;
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 4);
        assert_eq!(second.failed, 0);
    }

    /// Fails the second batch it sees, succeeds otherwise.
    struct FlakyRepository {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AttendanceRepository for FlakyRepository {
        async fn upsert_attendance_batch(
            &self,
            events: &[AttendanceEvent],
        ) -> Result<BatchCounts> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 1 {
                return Err(RollcallError::Load("disk full".into()));
            }
            Ok(BatchCounts {
                inserted: events.len() as u64,
                updated: 0,
                failed: 0,
            })
        }

        async fn list_events(
            &self,
            _scope: &crate::models::summary::SummaryScope,
        ) -> Result<Vec<AttendanceEvent>> {
            Ok(vec![])
        }

        async fn delete_events(&self, _scope: &crate::models::summary::SummaryScope) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn failed_batch_does_not_poison_the_rest() {
        let repo = FlakyRepository {
            calls: AtomicUsize::new(0),
        };
        let events: Vec<_> = (1..=6).map(|d| event(&format!("stu-{d}"), d)).collect();

        let loader = BulkLoader::new(2);
        let outcome = loader.load(&repo, &events).await;

        assert_eq!(outcome.inserted, 4);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.batches.len(), 3);
        assert!(outcome.batches[1].error.as_deref().unwrap().contains("disk full"));
        assert!(outcome.batches[0].error.is_none());
        assert!(outcome.batches[2].error.is_none());
    }

    #[tokio::test]
    async fn empty_load_is_empty_outcome() {
        let repo = sqlite_repo().await;
        let outcome = BulkLoader::new(100).load(&repo, &[]).await;
        assert_eq!(outcome.loaded(), 0);
        assert!(outcome.batches.is_empty());
    }
}
