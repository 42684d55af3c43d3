// src/classify/db.rs
//
// Store operations for raw and classified entities. Raw entities are read
// with keyset pagination; classified entities are written with a chunked
// multi-row upsert keyed by entity id, falling back to row-by-row writes
// when a chunk fails so one bad record cannot sink its neighbors.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use geo_types::Geometry;
use log::warn;
use postgres_types::ToSql;
use serde_json::Value;
use tokio_postgres::{GenericClient, Row as PgRow};

use crate::models::{BatchSummary, CellId, ClassifiedEntity, EntityId, EntityType, FunctionalGroup, MatchType, RawEntity};
use crate::tags::RawTagPayload;
use crate::utils::db_connect::PgPool;

/// Rows per multi-row upsert statement (16 params each, well under the
/// postgres 32k parameter ceiling)
const UPSERT_CHUNK_SIZE: usize = 500;

const UPSERT_COLUMNS: &str = "
    id, region, entity_type, primary_category, secondary_category,
    standardized_name, brand_normalized, brand_confidence, brand_match_type,
    functional_group, influence_weight, hex_cells,
    accessibility_score, highway_type, max_speed, quality_score";

const UPSERT_CONFLICT: &str = "
    ON CONFLICT (id) DO UPDATE SET
        region = EXCLUDED.region,
        entity_type = EXCLUDED.entity_type,
        primary_category = EXCLUDED.primary_category,
        secondary_category = EXCLUDED.secondary_category,
        standardized_name = EXCLUDED.standardized_name,
        brand_normalized = EXCLUDED.brand_normalized,
        brand_confidence = EXCLUDED.brand_confidence,
        brand_match_type = EXCLUDED.brand_match_type,
        functional_group = EXCLUDED.functional_group,
        influence_weight = EXCLUDED.influence_weight,
        hex_cells = EXCLUDED.hex_cells,
        accessibility_score = EXCLUDED.accessibility_score,
        highway_type = EXCLUDED.highway_type,
        max_speed = EXCLUDED.max_speed,
        quality_score = EXCLUDED.quality_score,
        updated_at = now()";

/// One page of raw entities plus the keyset cursor for the next page.
#[derive(Debug)]
pub struct RawEntityPage {
    pub entities: Vec<RawEntity>,
    pub last_id: Option<EntityId>,
    /// Rows whose geometry could not be decoded (logged and skipped)
    pub decode_failures: usize,
}

/// Fetches one keyset page of raw entities, optionally scoped to a region.
/// Tags that fail to parse become `Unparseable` (a valid payload); rows
/// whose geometry cannot be decoded are skipped and counted.
pub async fn fetch_raw_entities(
    pool: &PgPool,
    region: Option<&str>,
    after_id: Option<&str>,
    limit: i64,
) -> Result<RawEntityPage> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for fetch_raw_entities")?;

    const FETCH_SQL: &str = "
        SELECT id, tags, geometry, name, region
        FROM public.raw_entities
        WHERE ($1::TEXT IS NULL OR region = $1)
          AND ($2::TEXT IS NULL OR id > $2)
        ORDER BY id
        LIMIT $3";

    let rows = conn
        .query(FETCH_SQL, &[&region, &after_id, &limit])
        .await
        .context("Failed to fetch raw_entities page")?;

    let mut entities = Vec::with_capacity(rows.len());
    let mut decode_failures = 0usize;
    let mut last_id: Option<EntityId> = None;

    for row in &rows {
        let id: String = row.get(0);
        last_id = Some(EntityId(id.clone()));

        let tags = match row.get::<_, Option<Value>>(1) {
            Some(value) => RawTagPayload::from_value(value),
            None => RawTagPayload::Unparseable,
        };

        let geometry = match row.get::<_, Option<Value>>(2) {
            Some(value) => match decode_geometry(value) {
                Ok(g) => g,
                Err(e) => {
                    warn!("Skipping entity {}: undecodable geometry: {}", id, e);
                    decode_failures += 1;
                    continue;
                }
            },
            None => {
                warn!("Skipping entity {}: missing geometry", id);
                decode_failures += 1;
                continue;
            }
        };

        entities.push(RawEntity {
            id: EntityId(id),
            tags,
            geometry,
            name: row.get(3),
            region: row.get(4),
        });
    }

    Ok(RawEntityPage {
        entities,
        last_id,
        decode_failures,
    })
}

fn decode_geometry(value: Value) -> Result<Geometry<f64>> {
    let geojson_geom: geojson::Geometry =
        serde_json::from_value(value).context("not a GeoJSON geometry object")?;
    Geometry::<f64>::try_from(geojson_geom).map_err(|e| anyhow!("unsupported geometry: {}", e))
}

// Owned column values for one row, borrowed by the params slice.
struct EntityParams {
    id: String,
    region: String,
    entity_type: &'static str,
    primary_category: String,
    secondary_category: String,
    standardized_name: Option<String>,
    brand_normalized: Option<String>,
    brand_confidence: f64,
    brand_match_type: &'static str,
    functional_group: &'static str,
    influence_weight: f64,
    hex_cells: Value,
    accessibility_score: Option<f64>,
    highway_type: Option<String>,
    max_speed: Option<f64>,
    quality_score: f64,
}

impl EntityParams {
    fn from_entity(entity: &ClassifiedEntity) -> Result<Self> {
        let hex_cells = serde_json::to_value(&entity.hex_cells)
            .with_context(|| format!("Failed to serialize hex_cells for {}", entity.id.0))?;
        Ok(Self {
            id: entity.id.0.clone(),
            region: entity.region.clone(),
            entity_type: entity.entity_type.as_str(),
            primary_category: entity.primary_category.clone(),
            secondary_category: entity.secondary_category.clone(),
            standardized_name: entity.standardized_name.clone(),
            brand_normalized: entity.brand_normalized.clone(),
            brand_confidence: entity.brand_confidence,
            brand_match_type: entity.brand_match_type.as_str(),
            functional_group: entity.functional_group.as_str(),
            influence_weight: entity.influence_weight,
            hex_cells,
            accessibility_score: entity.accessibility_score,
            highway_type: entity.highway_type.clone(),
            max_speed: entity.max_speed,
            quality_score: entity.quality_score,
        })
    }

    fn push_params<'a>(&'a self, params: &mut Vec<&'a (dyn ToSql + Sync)>) {
        params.push(&self.id);
        params.push(&self.region);
        params.push(&self.entity_type);
        params.push(&self.primary_category);
        params.push(&self.secondary_category);
        params.push(&self.standardized_name);
        params.push(&self.brand_normalized);
        params.push(&self.brand_confidence);
        params.push(&self.brand_match_type);
        params.push(&self.functional_group);
        params.push(&self.influence_weight);
        params.push(&self.hex_cells);
        params.push(&self.accessibility_score);
        params.push(&self.highway_type);
        params.push(&self.max_speed);
        params.push(&self.quality_score);
    }
}

/// Batch upsert of classified entities keyed by entity id. Chunk failures
/// degrade to row-by-row writes so the summary can name exactly which
/// records failed and why.
pub async fn upsert_classified_entities(
    pool: &PgPool,
    entities: &[ClassifiedEntity],
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    summary.processed = entities.len();
    if entities.is_empty() {
        return Ok(summary);
    }

    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for upsert_classified_entities")?;

    for chunk in entities.chunks(UPSERT_CHUNK_SIZE) {
        let mut rows = Vec::with_capacity(chunk.len());
        for entity in chunk {
            match EntityParams::from_entity(entity) {
                Ok(row) => rows.push(row),
                Err(e) => summary.record_failure(format!("entity {}: {}", entity.id.0, e)),
            }
        }

        match upsert_chunk(&*conn, &rows).await {
            Ok(n) => summary.succeeded += n as usize,
            Err(e) => {
                warn!(
                    "Chunk upsert of {} classified entities failed ({}); retrying row-by-row",
                    rows.len(),
                    e
                );
                for row in &rows {
                    match upsert_one(&*conn, row).await {
                        Ok(()) => summary.succeeded += 1,
                        Err(e) => {
                            summary.record_failure(format!("entity {}: {}", row.id, e))
                        }
                    }
                }
            }
        }
    }

    Ok(summary)
}

async fn upsert_chunk(conn: &impl GenericClient, rows: &[EntityParams]) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut query = format!(
        "INSERT INTO public.classified_entities ({}) VALUES ",
        UPSERT_COLUMNS
    );

    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(rows.len() * 16);
    let mut param_groups = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        let base_idx = i * 16;
        let placeholders: Vec<String> =
            (1..=16).map(|j| format!("${}", base_idx + j)).collect();
        param_groups.push(format!("({})", placeholders.join(", ")));
        row.push_params(&mut params);
    }

    query.push_str(&param_groups.join(", "));
    query.push_str(UPSERT_CONFLICT);

    let affected = conn
        .execute(&query, &params[..])
        .await
        .context("Failed to batch upsert classified_entities")?;
    Ok(affected)
}

async fn upsert_one(conn: &impl GenericClient, row: &EntityParams) -> Result<()> {
    let query = format!(
        "INSERT INTO public.classified_entities ({}) VALUES \
         ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16){}",
        UPSERT_COLUMNS, UPSERT_CONFLICT
    );
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(16);
    row.push_params(&mut params);
    conn.execute(&query, &params[..])
        .await
        .with_context(|| format!("Failed to upsert classified entity {}", row.id))?;
    Ok(())
}

/// Filter for classified-entity queries; all fields are AND-combined.
#[derive(Debug, Default, Clone)]
pub struct EntityFilter {
    pub region: Option<String>,
    pub primary_category: Option<String>,
    /// Restrict to entities falling in one cell at one resolution
    pub cell: Option<(u8, CellId)>,
}

/// Queries classified entities by region, category and/or cell membership.
pub async fn query_classified_entities(
    pool: &PgPool,
    filter: &EntityFilter,
) -> Result<Vec<ClassifiedEntity>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for query_classified_entities")?;

    let mut query = String::from(
        "SELECT id, region, entity_type, primary_category, secondary_category,
                standardized_name, brand_normalized, brand_confidence,
                brand_match_type, functional_group, influence_weight, hex_cells,
                accessibility_score, highway_type, max_speed, quality_score
         FROM public.classified_entities
         WHERE 1 = 1",
    );

    let resolution_key = filter.cell.as_ref().map(|(res, _)| res.to_string());
    let cell_str = filter.cell.as_ref().map(|(_, cell)| cell.0.clone());

    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    if let Some(region) = &filter.region {
        params.push(region);
        query.push_str(&format!(" AND region = ${}", params.len()));
    }
    if let Some(category) = &filter.primary_category {
        params.push(category);
        query.push_str(&format!(" AND primary_category = ${}", params.len()));
    }
    if let (Some(key), Some(cell)) = (&resolution_key, &cell_str) {
        params.push(key);
        let key_idx = params.len();
        params.push(cell);
        query.push_str(&format!(" AND hex_cells ->> ${} = ${}", key_idx, params.len()));
    }
    query.push_str(" ORDER BY id");

    let rows = conn
        .query(&query, &params[..])
        .await
        .context("Failed to query classified_entities")?;

    let mut entities = Vec::with_capacity(rows.len());
    for row in &rows {
        match classified_from_row(row) {
            Ok(entity) => entities.push(entity),
            Err(e) => warn!("Skipping malformed classified entity row: {}", e),
        }
    }
    Ok(entities)
}

fn classified_from_row(row: &PgRow) -> Result<ClassifiedEntity> {
    let id: String = row.get(0);
    let entity_type_str: String = row.get(2);
    let entity_type = EntityType::parse(&entity_type_str)
        .ok_or_else(|| anyhow!("entity {}: unknown entity_type '{}'", id, entity_type_str))?;

    let match_type_str: String = row.get(8);
    let group_str: String = row.get(9);
    let functional_group = FunctionalGroup::parse(&group_str)
        .ok_or_else(|| anyhow!("entity {}: unknown functional_group '{}'", id, group_str))?;

    let hex_cells_value: Option<Value> = row.get(11);
    let hex_cells: BTreeMap<u8, CellId> = match hex_cells_value {
        Some(value) => serde_json::from_value(value)
            .with_context(|| format!("entity {}: malformed hex_cells", id))?,
        None => BTreeMap::new(),
    };

    Ok(ClassifiedEntity {
        id: EntityId(id),
        region: row.get(1),
        entity_type,
        primary_category: row.get(3),
        secondary_category: row.get(4),
        standardized_name: row.get(5),
        brand_normalized: row.get(6),
        brand_confidence: row.get(7),
        brand_match_type: MatchType::parse(&match_type_str),
        functional_group,
        influence_weight: row.get(10),
        hex_cells,
        accessibility_score: row.get(12),
        highway_type: row.get(13),
        max_speed: row.get(14),
        quality_score: row.get(15),
    })
}
