use crate::database::{DatabaseError, Result};
/// Schema definitions for the precinct results store
use sqlx::SqlitePool;

pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS precinct_results (
            precinct_id INTEGER PRIMARY KEY,
            district_id INTEGER NOT NULL,
            side_a_votes INTEGER NOT NULL,
            side_b_votes INTEGER NOT NULL,
            winner TEXT NOT NULL,
            winner_votes INTEGER NOT NULL,
            participation_percent REAL,
            outreach_target INTEGER NOT NULL,
            payload TEXT NOT NULL,
            computed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    create_indexes(pool).await?;

    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    let indexes = vec![
        "CREATE INDEX IF NOT EXISTS idx_precinct_results_district ON precinct_results(district_id)",
        "CREATE INDEX IF NOT EXISTS idx_precinct_results_winner ON precinct_results(winner)",
    ];

    for index_sql in indexes {
        sqlx::query(index_sql).execute(pool).await?;
    }

    Ok(())
}

/// Verify the results schema is in place.
pub async fn verify_schema(pool: &SqlitePool) -> Result<()> {
    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(pool)
            .await?;

    if !tables.iter().any(|name| name == "precinct_results") {
        return Err(DatabaseError::Integrity(
            "missing table: precinct_results".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ResultsDatabase;

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let db = ResultsDatabase::create_in_memory().await.unwrap();
        create_schema(db.pool()).await.unwrap();
        create_schema(db.pool()).await.unwrap();
        verify_schema(db.pool()).await.unwrap();
    }

    #[tokio::test]
    async fn verify_fails_on_empty_database() {
        let db = ResultsDatabase::create_in_memory().await.unwrap();
        let err = verify_schema(db.pool()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Integrity(_)));
    }
}
