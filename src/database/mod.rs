pub mod schema;
pub mod writer;

use crate::model::AggregatedPrecinctResult;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("payload encoding error: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("data integrity error: {0}")]
    Integrity(String),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// The record store holding one aggregated result row per precinct.
#[derive(Clone)]
pub struct ResultsDatabase {
    pool: SqlitePool,
}

/// Flattened row shape read back for filtering and display; the full
/// structured result lives in the payload column.
#[derive(Debug, sqlx::FromRow)]
pub struct PrecinctResultRow {
    pub precinct_id: i64,
    pub district_id: i64,
    pub side_a_votes: i64,
    pub side_b_votes: i64,
    pub winner: String,
    pub winner_votes: i64,
    pub participation_percent: Option<f64>,
    pub outreach_target: i64,
}

impl ResultsDatabase {
    /// Open (creating if needed) a results database at the given path.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self { pool })
    }

    /// In-memory database for tests. A single connection keeps every caller on
    /// the same memory store.
    pub async fn create_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Upsert one precinct's result. The structured payload carries the raw
    /// tally and the policy applied; the scalar columns mirror the winner label
    /// and winning vote count for downstream filtering.
    pub async fn upsert_result(&self, result: &AggregatedPrecinctResult) -> Result<()> {
        let payload = serde_json::to_string(result)?;
        let computed_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO precinct_results
                (precinct_id, district_id, side_a_votes, side_b_votes,
                 winner, winner_votes, participation_percent, outreach_target,
                 payload, computed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(precinct_id) DO UPDATE SET
                district_id = excluded.district_id,
                side_a_votes = excluded.side_a_votes,
                side_b_votes = excluded.side_b_votes,
                winner = excluded.winner,
                winner_votes = excluded.winner_votes,
                participation_percent = excluded.participation_percent,
                outreach_target = excluded.outreach_target,
                payload = excluded.payload,
                computed_at = excluded.computed_at
            "#,
        )
        .bind(result.precinct_id as i64)
        .bind(result.district_id as i64)
        .bind(result.side_a_votes as i64)
        .bind(result.side_b_votes as i64)
        .bind(result.winner.label())
        .bind(result.winner_votes as i64)
        .bind(result.participation_percent)
        .bind(result.outreach_target as i64)
        .bind(payload)
        .bind(computed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Read back the flattened row for one precinct.
    pub async fn get_result_row(&self, precinct_id: u32) -> Result<Option<PrecinctResultRow>> {
        let row = sqlx::query_as::<_, PrecinctResultRow>(
            r#"
            SELECT precinct_id, district_id, side_a_votes, side_b_votes,
                   winner, winner_votes, participation_percent, outreach_target
            FROM precinct_results
            WHERE precinct_id = ?
            "#,
        )
        .bind(precinct_id as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Read back the full structured result for one precinct.
    pub async fn get_result_payload(
        &self,
        precinct_id: u32,
    ) -> Result<Option<AggregatedPrecinctResult>> {
        let row = sqlx::query("SELECT payload FROM precinct_results WHERE precinct_id = ?")
            .bind(precinct_id as i64)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let payload: String = row.try_get("payload")?;
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }

    pub async fn count_results(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM precinct_results")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}
