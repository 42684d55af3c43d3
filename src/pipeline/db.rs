// src/pipeline/db.rs

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use log::{info, warn};
use uuid::Uuid;

use crate::models::PipelineStats;
use crate::utils::db_connect::PgPool;

/// Inserts the run record up front with zeroed counts and timings, so a
/// crashed run still leaves a trace. `finalize_run` fills it in at the end.
pub async fn create_initial_run(
    pool: &PgPool,
    run_id: &Uuid,
    run_timestamp: NaiveDateTime,
    description: Option<&str>,
) -> Result<()> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for create_initial_run")?;

    const INSERT_SQL: &str = "
        INSERT INTO pipeline_metadata.pipeline_runs (
            id, run_timestamp, description,
            total_raw_entities, total_classified, total_skipped,
            total_matched, total_unmatched,
            cells_aggregated, cells_binned, candidates_discovered,
            match_stats,
            classification_time, aggregation_time, binning_time,
            discovery_time, total_time
        )
        VALUES ($1, $2, $3, 0, 0, 0, 0, 0, 0, 0, 0, '[]'::JSONB, 0.0, 0.0, 0.0, 0.0, 0.0)
    ";

    conn.execute(INSERT_SQL, &[run_id, &run_timestamp, &description])
        .await
        .context("Failed to insert initial pipeline_runs record")?;

    info!("Created initial pipeline_runs record with ID: {}", run_id);
    Ok(())
}

/// Writes the collected stats back onto the run record created at start.
pub async fn finalize_run(pool: &PgPool, stats: &PipelineStats, total_time: f64) -> Result<()> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for finalize_run")?;

    let match_stats = serde_json::to_value(&stats.match_stats)
        .context("Failed to serialize match stats")?;

    const UPDATE_SQL: &str = "
        UPDATE pipeline_metadata.pipeline_runs SET
            total_raw_entities = $2,
            total_classified = $3,
            total_skipped = $4,
            total_matched = $5,
            total_unmatched = $6,
            cells_aggregated = $7,
            cells_binned = $8,
            candidates_discovered = $9,
            match_stats = $10,
            classification_time = $11,
            aggregation_time = $12,
            binning_time = $13,
            discovery_time = $14,
            total_time = $15
        WHERE id = $1
    ";

    let affected = conn
        .execute(
            UPDATE_SQL,
            &[
                &stats.run_id,
                &(stats.total_raw_entities as i64),
                &(stats.total_classified as i64),
                &(stats.total_skipped as i64),
                &(stats.total_matched as i64),
                &(stats.total_unmatched as i64),
                &(stats.cells_aggregated as i64),
                &(stats.cells_binned as i64),
                &(stats.candidates_discovered as i64),
                &match_stats,
                &stats.classification_time,
                &stats.aggregation_time,
                &stats.binning_time,
                &stats.discovery_time,
                &total_time,
            ],
        )
        .await
        .context("Failed to update pipeline_runs record")?;

    if affected == 0 {
        warn!("Run record {} vanished before finalize", stats.run_id);
    }
    Ok(())
}

/// Most recent runs, newest first, for the CLI summary views.
pub async fn recent_runs(pool: &PgPool, limit: i64) -> Result<Vec<RunRecord>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for recent_runs")?;

    const SELECT_SQL: &str = "
        SELECT id, run_timestamp, description,
               total_raw_entities, total_classified, total_matched,
               cells_aggregated, cells_binned, candidates_discovered, total_time
        FROM pipeline_metadata.pipeline_runs
        ORDER BY run_timestamp DESC
        LIMIT $1
    ";

    let rows = conn
        .query(SELECT_SQL, &[&limit])
        .await
        .context("Failed to query recent pipeline runs")?;

    Ok(rows
        .iter()
        .map(|row| RunRecord {
            id: row.get("id"),
            run_timestamp: row.get("run_timestamp"),
            description: row.get("description"),
            total_raw_entities: row.get::<_, i64>("total_raw_entities"),
            total_classified: row.get::<_, i64>("total_classified"),
            total_matched: row.get::<_, i64>("total_matched"),
            cells_aggregated: row.get::<_, i64>("cells_aggregated"),
            cells_binned: row.get::<_, i64>("cells_binned"),
            candidates_discovered: row.get::<_, i64>("candidates_discovered"),
            total_time: row.get("total_time"),
        })
        .collect())
}

/// One persisted pipeline run, as read back for reporting.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: Uuid,
    pub run_timestamp: NaiveDateTime,
    pub description: Option<String>,
    pub total_raw_entities: i64,
    pub total_classified: i64,
    pub total_matched: i64,
    pub cells_aggregated: i64,
    pub cells_binned: i64,
    pub candidates_discovered: i64,
    pub total_time: f64,
}
