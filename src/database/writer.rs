use crate::database::{DatabaseError, ResultsDatabase};
use crate::model::AggregatedPrecinctResult;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::task::JoinSet;

pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
enum WriteError {
    #[error("{0}")]
    Database(DatabaseError),
    #[error("write timed out")]
    TimedOut,
}

/// Final accounting for one writer run. Failure counts are always surfaced to
/// the caller; retrying the failed subset is the caller's decision and is safe
/// because writes are idempotent overwrites keyed by precinct id.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: usize,
    pub failed: usize,
}

/// Persists aggregated results in fixed-size batches. Writes within a batch
/// are issued concurrently; the next batch starts only once every write in the
/// current batch has settled, bounding in-flight operations to the batch size.
pub struct ResultWriter {
    db: ResultsDatabase,
    batch_size: usize,
    write_timeout: Duration,
}

impl ResultWriter {
    pub fn new(db: ResultsDatabase) -> Self {
        ResultWriter {
            db,
            batch_size: DEFAULT_BATCH_SIZE,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Write every result, one upsert per precinct. A failed or timed-out
    /// write is logged with its precinct id and counted; it never aborts its
    /// siblings or later batches. No automatic retries.
    pub async fn write_all(
        &self,
        results: &BTreeMap<u32, AggregatedPrecinctResult>,
    ) -> WriteSummary {
        let mut summary = WriteSummary::default();
        let all: Vec<&AggregatedPrecinctResult> = results.values().collect();

        for batch in all.chunks(self.batch_size) {
            let mut in_flight = JoinSet::new();

            for result in batch {
                let db = self.db.clone();
                let result = (*result).clone();
                let timeout = self.write_timeout;

                in_flight.spawn(async move {
                    let precinct_id = result.precinct_id;
                    let outcome = match tokio::time::timeout(timeout, db.upsert_result(&result))
                        .await
                    {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(WriteError::Database(e)),
                        Err(_) => Err(WriteError::TimedOut),
                    };
                    (precinct_id, outcome)
                });
            }

            while let Some(joined) = in_flight.join_next().await {
                match joined {
                    Ok((_, Ok(()))) => summary.written += 1,
                    Ok((precinct_id, Err(e))) => {
                        summary.failed += 1;
                        log::error!("precinct {}: write failed: {}", precinct_id, e);
                    }
                    Err(e) => {
                        summary.failed += 1;
                        log::error!("write task failed to complete: {}", e);
                    }
                }
            }
        }

        summary
    }
}
