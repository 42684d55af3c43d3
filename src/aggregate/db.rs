// src/aggregate/db.rs
//
// Store operations for per-cell metrics, keyed by (cell_id, resolution).
// Same chunked multi-row upsert shape as the classified-entity store, with
// row-by-row fallback when a chunk fails.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use log::warn;
use postgres_types::ToSql;
use serde_json::Value;
use tokio_postgres::{GenericClient, Row as PgRow};

use crate::models::{BatchSummary, CellId, HexMetrics};
use crate::utils::db_connect::PgPool;

/// Rows per multi-row upsert statement (27 params each)
const UPSERT_CHUNK_SIZE: usize = 200;

const UPSERT_COLUMNS: &str = "
    cell_id, resolution, total_entities, poi_count, transport_count,
    road_count, competitor_count, traffic_count, accessibility_count,
    neutral_count, category_counts, entity_density, poi_density,
    competitor_density, influence_positive, influence_negative, influence_net,
    competition_intensity, accessibility, market_saturation, retail_potential,
    risk_score, avg_quality, population_index, income_index, bins, bivariate";

// Enrichment indices survive re-aggregation (the pass never computes them);
// bins do not: stale bins over fresh metrics would lie, so re-aggregation
// resets them and the binning stage rewrites them.
const UPSERT_CONFLICT: &str = "
    ON CONFLICT (cell_id, resolution) DO UPDATE SET
        total_entities = EXCLUDED.total_entities,
        poi_count = EXCLUDED.poi_count,
        transport_count = EXCLUDED.transport_count,
        road_count = EXCLUDED.road_count,
        competitor_count = EXCLUDED.competitor_count,
        traffic_count = EXCLUDED.traffic_count,
        accessibility_count = EXCLUDED.accessibility_count,
        neutral_count = EXCLUDED.neutral_count,
        category_counts = EXCLUDED.category_counts,
        entity_density = EXCLUDED.entity_density,
        poi_density = EXCLUDED.poi_density,
        competitor_density = EXCLUDED.competitor_density,
        influence_positive = EXCLUDED.influence_positive,
        influence_negative = EXCLUDED.influence_negative,
        influence_net = EXCLUDED.influence_net,
        competition_intensity = EXCLUDED.competition_intensity,
        accessibility = EXCLUDED.accessibility,
        market_saturation = EXCLUDED.market_saturation,
        retail_potential = EXCLUDED.retail_potential,
        risk_score = EXCLUDED.risk_score,
        avg_quality = EXCLUDED.avg_quality,
        population_index = COALESCE(EXCLUDED.population_index, hex_metrics.population_index),
        income_index = COALESCE(EXCLUDED.income_index, hex_metrics.income_index),
        bins = EXCLUDED.bins,
        bivariate = EXCLUDED.bivariate,
        updated_at = now()";

const PARAMS_PER_ROW: usize = 27;

// Owned column values for one row, borrowed by the params slice.
struct MetricsParams {
    cell_id: String,
    resolution: i32,
    total_entities: i64,
    poi_count: i64,
    transport_count: i64,
    road_count: i64,
    competitor_count: i64,
    traffic_count: i64,
    accessibility_count: i64,
    neutral_count: i64,
    category_counts: Value,
    entity_density: f64,
    poi_density: f64,
    competitor_density: f64,
    influence_positive: f64,
    influence_negative: f64,
    influence_net: f64,
    competition_intensity: f64,
    accessibility: f64,
    market_saturation: f64,
    retail_potential: f64,
    risk_score: f64,
    avg_quality: Option<f64>,
    population_index: Option<f64>,
    income_index: Option<f64>,
    bins: Value,
    bivariate: Value,
}

impl MetricsParams {
    fn from_metrics(metrics: &HexMetrics) -> Result<Self> {
        let category_counts = serde_json::to_value(&metrics.category_counts)
            .with_context(|| format!("Failed to serialize category_counts for {}", metrics.cell_id))?;
        let bins = serde_json::to_value(&metrics.bins)
            .with_context(|| format!("Failed to serialize bins for {}", metrics.cell_id))?;
        let bivariate = serde_json::to_value(&metrics.bivariate)
            .with_context(|| format!("Failed to serialize bivariate for {}", metrics.cell_id))?;
        Ok(Self {
            cell_id: metrics.cell_id.0.clone(),
            resolution: metrics.resolution as i32,
            total_entities: metrics.total_entities,
            poi_count: metrics.poi_count,
            transport_count: metrics.transport_count,
            road_count: metrics.road_count,
            competitor_count: metrics.competitor_count,
            traffic_count: metrics.traffic_count,
            accessibility_count: metrics.accessibility_count,
            neutral_count: metrics.neutral_count,
            category_counts,
            entity_density: metrics.entity_density,
            poi_density: metrics.poi_density,
            competitor_density: metrics.competitor_density,
            influence_positive: metrics.influence_positive,
            influence_negative: metrics.influence_negative,
            influence_net: metrics.influence_net,
            competition_intensity: metrics.competition_intensity,
            accessibility: metrics.accessibility,
            market_saturation: metrics.market_saturation,
            retail_potential: metrics.retail_potential,
            risk_score: metrics.risk_score,
            avg_quality: metrics.avg_quality,
            population_index: metrics.population_index,
            income_index: metrics.income_index,
            bins,
            bivariate,
        })
    }

    fn push_params<'a>(&'a self, params: &mut Vec<&'a (dyn ToSql + Sync)>) {
        params.push(&self.cell_id);
        params.push(&self.resolution);
        params.push(&self.total_entities);
        params.push(&self.poi_count);
        params.push(&self.transport_count);
        params.push(&self.road_count);
        params.push(&self.competitor_count);
        params.push(&self.traffic_count);
        params.push(&self.accessibility_count);
        params.push(&self.neutral_count);
        params.push(&self.category_counts);
        params.push(&self.entity_density);
        params.push(&self.poi_density);
        params.push(&self.competitor_density);
        params.push(&self.influence_positive);
        params.push(&self.influence_negative);
        params.push(&self.influence_net);
        params.push(&self.competition_intensity);
        params.push(&self.accessibility);
        params.push(&self.market_saturation);
        params.push(&self.retail_potential);
        params.push(&self.risk_score);
        params.push(&self.avg_quality);
        params.push(&self.population_index);
        params.push(&self.income_index);
        params.push(&self.bins);
        params.push(&self.bivariate);
    }
}

/// Batch upsert of per-cell metrics keyed by (cell_id, resolution).
pub async fn upsert_hex_metrics(
    pool: &PgPool,
    metrics: &[HexMetrics],
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    summary.processed = metrics.len();
    if metrics.is_empty() {
        return Ok(summary);
    }

    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for upsert_hex_metrics")?;

    for chunk in metrics.chunks(UPSERT_CHUNK_SIZE) {
        let mut rows = Vec::with_capacity(chunk.len());
        for m in chunk {
            match MetricsParams::from_metrics(m) {
                Ok(row) => rows.push(row),
                Err(e) => summary.record_failure(format!("cell {}: {}", m.cell_id, e)),
            }
        }

        match upsert_chunk(&*conn, &rows).await {
            Ok(n) => summary.succeeded += n as usize,
            Err(e) => {
                warn!(
                    "Chunk upsert of {} hex metrics failed ({}); retrying row-by-row",
                    rows.len(),
                    e
                );
                for row in &rows {
                    match upsert_one(&*conn, row).await {
                        Ok(()) => summary.succeeded += 1,
                        Err(e) => summary.record_failure(format!(
                            "cell {} res {}: {}",
                            row.cell_id, row.resolution, e
                        )),
                    }
                }
            }
        }
    }

    Ok(summary)
}

async fn upsert_chunk(conn: &impl GenericClient, rows: &[MetricsParams]) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut query = format!(
        "INSERT INTO public.hex_metrics ({}) VALUES ",
        UPSERT_COLUMNS
    );

    let mut params: Vec<&(dyn ToSql + Sync)> =
        Vec::with_capacity(rows.len() * PARAMS_PER_ROW);
    let mut param_groups = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        let base_idx = i * PARAMS_PER_ROW;
        let placeholders: Vec<String> = (1..=PARAMS_PER_ROW)
            .map(|j| format!("${}", base_idx + j))
            .collect();
        param_groups.push(format!("({})", placeholders.join(", ")));
        row.push_params(&mut params);
    }

    query.push_str(&param_groups.join(", "));
    query.push_str(UPSERT_CONFLICT);

    let affected = conn
        .execute(&query, &params[..])
        .await
        .context("Failed to batch upsert hex_metrics")?;
    Ok(affected)
}

async fn upsert_one(conn: &impl GenericClient, row: &MetricsParams) -> Result<()> {
    let placeholders: Vec<String> =
        (1..=PARAMS_PER_ROW).map(|j| format!("${}", j)).collect();
    let query = format!(
        "INSERT INTO public.hex_metrics ({}) VALUES ({}){}",
        UPSERT_COLUMNS,
        placeholders.join(", "),
        UPSERT_CONFLICT
    );
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(PARAMS_PER_ROW);
    row.push_params(&mut params);
    conn.execute(&query, &params[..])
        .await
        .with_context(|| {
            format!(
                "Failed to upsert hex metrics for cell {} at resolution {}",
                row.cell_id, row.resolution
            )
        })?;
    Ok(())
}

const SELECT_COLUMNS: &str = "
    cell_id, resolution, total_entities, poi_count, transport_count,
    road_count, competitor_count, traffic_count, accessibility_count,
    neutral_count, category_counts, entity_density, poi_density,
    competitor_density, influence_positive, influence_negative, influence_net,
    competition_intensity, accessibility, market_saturation, retail_potential,
    risk_score, avg_quality, population_index, income_index, bins, bivariate";

/// Loads metrics for one resolution, optionally restricted to a cell set,
/// in cell-id order.
pub async fn query_hex_metrics(
    pool: &PgPool,
    resolution: u8,
    cells: Option<&[CellId]>,
) -> Result<Vec<HexMetrics>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for query_hex_metrics")?;

    let query = format!(
        "SELECT {}
         FROM public.hex_metrics
         WHERE resolution = $1
           AND ($2::TEXT[] IS NULL OR cell_id = ANY($2))
         ORDER BY cell_id",
        SELECT_COLUMNS
    );

    let resolution_param = resolution as i32;
    let cell_ids: Option<Vec<String>> =
        cells.map(|cs| cs.iter().map(|c| c.0.clone()).collect());

    let rows = conn
        .query(&query, &[&resolution_param, &cell_ids])
        .await
        .context("Failed to query hex_metrics")?;

    let mut metrics = Vec::with_capacity(rows.len());
    for row in &rows {
        match metrics_from_row(row) {
            Ok(m) => metrics.push(m),
            Err(e) => warn!("Skipping malformed hex_metrics row: {}", e),
        }
    }
    Ok(metrics)
}

pub(crate) fn metrics_from_row(row: &PgRow) -> Result<HexMetrics> {
    let cell_id: String = row.get(0);
    let resolution_raw: i32 = row.get(1);
    let resolution = u8::try_from(resolution_raw)
        .with_context(|| format!("cell {}: resolution {} out of range", cell_id, resolution_raw))?;

    let category_counts: BTreeMap<String, i64> = decode_json_map(row.get(10), &cell_id, "category_counts")?;
    let bins: BTreeMap<String, i16> = decode_json_map(row.get(25), &cell_id, "bins")?;
    let bivariate: BTreeMap<String, String> = decode_json_map(row.get(26), &cell_id, "bivariate")?;

    Ok(HexMetrics {
        cell_id: CellId(cell_id),
        resolution,
        total_entities: row.get(2),
        poi_count: row.get(3),
        transport_count: row.get(4),
        road_count: row.get(5),
        competitor_count: row.get(6),
        traffic_count: row.get(7),
        accessibility_count: row.get(8),
        neutral_count: row.get(9),
        category_counts,
        entity_density: row.get(11),
        poi_density: row.get(12),
        competitor_density: row.get(13),
        influence_positive: row.get(14),
        influence_negative: row.get(15),
        influence_net: row.get(16),
        competition_intensity: row.get(17),
        accessibility: row.get(18),
        market_saturation: row.get(19),
        retail_potential: row.get(20),
        risk_score: row.get(21),
        avg_quality: row.get(22),
        population_index: row.get(23),
        income_index: row.get(24),
        bins,
        bivariate,
    })
}

fn decode_json_map<T>(value: Option<Value>, cell_id: &str, field: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match value {
        Some(v) => serde_json::from_value(v)
            .with_context(|| format!("cell {}: malformed {}", cell_id, field)),
        None => Ok(T::default()),
    }
}
