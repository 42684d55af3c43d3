// src/binning/db.rs
//
// Write-back of bin assignments. Bins and bivariate codes always overwrite
// the previous assignment wholesale; a partial merge of old and new bins
// would mix boundaries from different runs.

use std::collections::HashMap;

use anyhow::{Context, Result};
use log::warn;
use postgres_types::ToSql;
use serde_json::Value;
use tokio_postgres::GenericClient;

use crate::binning::ScopeBinning;
use crate::models::{BatchSummary, CellId};
use crate::utils::db_connect::PgPool;

/// Rows per multi-row update statement (3 params each)
const UPDATE_CHUNK_SIZE: usize = 500;

struct BinParams {
    cell_id: String,
    bins: Value,
    bivariate: Value,
}

impl BinParams {
    fn push_params<'a>(&'a self, params: &mut Vec<&'a (dyn ToSql + Sync)>) {
        params.push(&self.cell_id);
        params.push(&self.bins);
        params.push(&self.bivariate);
    }
}

/// Overwrites bin and bivariate assignments for every cell of one scope at
/// one resolution. Cells that have no metrics row (deleted since binning
/// started) count as skipped.
pub async fn update_bins(
    pool: &PgPool,
    resolution: u8,
    scoped: &ScopeBinning,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    summary.processed = scoped.bins_by_cell.len();
    if scoped.bins_by_cell.is_empty() {
        return Ok(summary);
    }

    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for update_bins")?;

    // sorted for deterministic statement order
    let mut cells: Vec<&CellId> = scoped.bins_by_cell.keys().collect();
    cells.sort();

    let mut rows = Vec::with_capacity(cells.len());
    for cell in cells {
        let bins = scoped
            .bins_by_cell
            .get(cell)
            .map(serde_json::to_value)
            .transpose()
            .with_context(|| format!("Failed to serialize bins for {}", cell))?
            .unwrap_or(Value::Null);
        let bivariate = scoped
            .bivariate_by_cell
            .get(cell)
            .map(serde_json::to_value)
            .transpose()
            .with_context(|| format!("Failed to serialize bivariate for {}", cell))?
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        rows.push(BinParams {
            cell_id: cell.0.clone(),
            bins,
            bivariate,
        });
    }

    let resolution_param = resolution as i32;
    for chunk in rows.chunks(UPDATE_CHUNK_SIZE) {
        match update_chunk(&*conn, chunk, &resolution_param).await {
            Ok(affected) => {
                summary.succeeded += affected as usize;
                if (affected as usize) < chunk.len() {
                    let missing = chunk.len() - affected as usize;
                    summary.skipped += missing;
                    warn!(
                        "update_bins: {} of {} cells had no metrics row at resolution {}",
                        missing,
                        chunk.len(),
                        resolution
                    );
                }
            }
            Err(e) => {
                warn!(
                    "Chunk bin update of {} cells failed ({}); retrying row-by-row",
                    chunk.len(),
                    e
                );
                for row in chunk {
                    match update_one(&*conn, row, &resolution_param).await {
                        Ok(true) => summary.succeeded += 1,
                        Ok(false) => summary.skipped += 1,
                        Err(e) => {
                            summary.record_failure(format!("cell {}: {}", row.cell_id, e))
                        }
                    }
                }
            }
        }
    }

    Ok(summary)
}

async fn update_chunk(
    conn: &impl GenericClient,
    rows: &[BinParams],
    resolution: &i32,
) -> Result<u64> {
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(rows.len() * 3 + 1);
    let mut value_groups = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let base_idx = i * 3;
        value_groups.push(format!(
            "(${}::TEXT, ${}::JSONB, ${}::JSONB)",
            base_idx + 1,
            base_idx + 2,
            base_idx + 3
        ));
        row.push_params(&mut params);
    }
    params.push(resolution);

    let query = format!(
        "UPDATE public.hex_metrics AS h SET
             bins = v.bins,
             bivariate = v.bivariate,
             updated_at = now()
         FROM (VALUES {}) AS v(cell_id, bins, bivariate)
         WHERE h.cell_id = v.cell_id AND h.resolution = ${}",
        value_groups.join(", "),
        params.len()
    );

    let affected = conn
        .execute(&query, &params[..])
        .await
        .context("Failed to batch update bins")?;
    Ok(affected)
}

async fn update_one(
    conn: &impl GenericClient,
    row: &BinParams,
    resolution: &i32,
) -> Result<bool> {
    const QUERY: &str = "
        UPDATE public.hex_metrics
        SET bins = $2, bivariate = $3, updated_at = now()
        WHERE cell_id = $1 AND resolution = $4";
    let affected = conn
        .execute(QUERY, &[&row.cell_id, &row.bins, &row.bivariate, resolution])
        .await
        .with_context(|| format!("Failed to update bins for cell {}", row.cell_id))?;
    Ok(affected > 0)
}

/// Lists the admin levels that actually have metric rows.
pub async fn fetch_admin_levels(pool: &PgPool) -> Result<Vec<i32>> {
    let conn = pool.get().await.context("Failed to get DB connection")?;
    let rows = conn
        .query(
            "SELECT DISTINCT level FROM public.admin_metrics ORDER BY level",
            &[],
        )
        .await
        .context("Failed to query admin levels")?;
    Ok(rows.iter().map(|row| row.get::<_, i32>("level")).collect())
}

/// Loads one metric's values per admin unit at one admin level, in admin-id
/// order. Missing values stay None and bin to 0.
pub async fn fetch_admin_metric_values(
    pool: &PgPool,
    level: i32,
    metric: &str,
) -> Result<Vec<(String, Option<f64>)>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for fetch_admin_metric_values")?;

    const QUERY: &str = "
        SELECT admin_id, value
        FROM public.admin_metrics
        WHERE level = $1 AND metric = $2
        ORDER BY admin_id";

    let rows = conn
        .query(QUERY, &[&level, &metric])
        .await
        .with_context(|| format!("Failed to fetch admin metric values for '{}'", metric))?;

    Ok(rows
        .iter()
        .map(|row| (row.get::<_, String>(0), row.get::<_, Option<f64>>(1)))
        .collect())
}

/// Writes admin-level bin assignments for one metric at one level.
pub async fn update_admin_bins(
    pool: &PgPool,
    level: i32,
    metric: &str,
    assignments: &HashMap<String, i16>,
) -> Result<u64> {
    if assignments.is_empty() {
        return Ok(0);
    }

    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for update_admin_bins")?;

    let mut units: Vec<(&String, &i16)> = assignments.iter().collect();
    units.sort_by_key(|(id, _)| id.as_str());

    let mut total_affected = 0u64;
    for chunk in units.chunks(UPDATE_CHUNK_SIZE) {
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 2 + 2);
        let mut value_groups = Vec::with_capacity(chunk.len());
        for (i, (admin_id, bin)) in chunk.iter().enumerate() {
            let base_idx = i * 2;
            value_groups.push(format!(
                "(${}::TEXT, ${}::SMALLINT)",
                base_idx + 1,
                base_idx + 2
            ));
            params.push(*admin_id);
            params.push(*bin);
        }
        params.push(&level);
        let level_idx = params.len();
        params.push(&metric);

        let query = format!(
            "UPDATE public.admin_metrics AS a SET bin = v.bin, updated_at = now()
             FROM (VALUES {}) AS v(admin_id, bin)
             WHERE a.admin_id = v.admin_id AND a.level = ${} AND a.metric = ${}",
            value_groups.join(", "),
            level_idx,
            params.len()
        );

        total_affected += conn
            .execute(&query, &params[..])
            .await
            .with_context(|| format!("Failed to update admin bins for '{}'", metric))?;
    }

    Ok(total_affected)
}
