// src/aggregate/mod.rs
//
// Groups classified entities into grid cells and derives per-cell metrics.
// Aggregation is a pure function of its inputs: same entities, same
// resolution, same config, same output, in cell-id order. All persistence
// lives in `db`.

pub mod db;
pub mod indices;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use log::info;

use crate::config::AggregationConfig;
use crate::hexgrid::HexGrid;
use crate::models::{CellId, ClassifiedEntity, EntityType, FunctionalGroup, HexMetrics};

/// Result of aggregating one resolution.
#[derive(Debug, Clone)]
pub struct AggregationOutcome {
    pub resolution: u8,
    pub metrics: Vec<HexMetrics>,
    /// Entities with no cell at this resolution (unresolvable geometry)
    pub skipped_without_cell: usize,
}

/// Aggregates entities into cells at one resolution. Cells appear in the
/// output iff at least one entity landed in them; counts inside a cell are
/// always concrete (zero, not null).
pub fn aggregate_resolution(
    entities: &[ClassifiedEntity],
    resolution: u8,
    grid: &dyn HexGrid,
    config: &AggregationConfig,
) -> Result<AggregationOutcome> {
    let area_km2 = grid
        .cell_area_km2(resolution)
        .with_context(|| format!("aggregation at resolution {}", resolution))?;

    // BTreeMap keyed by cell id keeps the output deterministic
    let mut groups: BTreeMap<CellId, Vec<&ClassifiedEntity>> = BTreeMap::new();
    let mut skipped_without_cell = 0;
    for entity in entities {
        match entity.hex_cells.get(&resolution) {
            Some(cell) => groups.entry(cell.clone()).or_default().push(entity),
            None => skipped_without_cell += 1,
        }
    }

    let metrics = groups
        .into_iter()
        .map(|(cell, group)| cell_metrics(cell, resolution, &group, area_km2, config))
        .collect();

    Ok(AggregationOutcome {
        resolution,
        metrics,
        skipped_without_cell,
    })
}

/// Aggregates every configured resolution in order.
pub fn aggregate_all(
    entities: &[ClassifiedEntity],
    grid: &dyn HexGrid,
    config: &AggregationConfig,
) -> Result<Vec<AggregationOutcome>> {
    let mut outcomes = Vec::with_capacity(config.resolutions.len());
    for &resolution in &config.resolutions {
        let outcome = aggregate_resolution(entities, resolution, grid, config)?;
        info!(
            "📊 Resolution {}: {} cells from {} entities ({} without a cell)",
            resolution,
            outcome.metrics.len(),
            entities.len() - outcome.skipped_without_cell,
            outcome.skipped_without_cell
        );
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

fn cell_metrics(
    cell_id: CellId,
    resolution: u8,
    group: &[&ClassifiedEntity],
    area_km2: f64,
    config: &AggregationConfig,
) -> HexMetrics {
    let total_entities = group.len() as i64;

    let mut poi_count = 0i64;
    let mut transport_count = 0i64;
    let mut road_count = 0i64;
    let mut competitor_count = 0i64;
    let mut traffic_count = 0i64;
    let mut accessibility_count = 0i64;
    let mut neutral_count = 0i64;
    let mut category_counts: BTreeMap<String, i64> = BTreeMap::new();

    let mut influence_positive = 0.0f64;
    let mut influence_negative = 0.0f64;
    let mut transport_scores: Vec<f64> = Vec::new();
    let mut road_scores: Vec<f64> = Vec::new();
    let mut quality_sum = 0.0f64;

    for entity in group {
        match entity.entity_type {
            EntityType::Poi => poi_count += 1,
            EntityType::TransportNode => transport_count += 1,
            EntityType::RoadSegment => road_count += 1,
        }
        match entity.functional_group {
            FunctionalGroup::Competitor => competitor_count += 1,
            FunctionalGroup::TrafficGenerator => traffic_count += 1,
            FunctionalGroup::Accessibility => accessibility_count += 1,
            FunctionalGroup::Neutral => neutral_count += 1,
        }
        *category_counts
            .entry(entity.primary_category.clone())
            .or_insert(0) += 1;

        if entity.influence_weight > 0.0 {
            influence_positive += entity.influence_weight;
        } else {
            influence_negative += -entity.influence_weight;
        }

        if let Some(score) = entity.accessibility_score {
            match entity.entity_type {
                EntityType::TransportNode => transport_scores.push(score),
                EntityType::RoadSegment => road_scores.push(score),
                EntityType::Poi => {}
            }
        }

        quality_sum += entity.quality_score;
    }

    let entity_density = total_entities as f64 / area_km2;
    let poi_density = poi_count as f64 / area_km2;
    let competitor_density = competitor_count as f64 / area_km2;

    let competition_intensity =
        indices::competition_intensity(competitor_count, total_entities, config);
    let accessibility = indices::accessibility(&transport_scores, &road_scores, config);
    let competitor_share = if total_entities > 0 {
        competitor_count as f64 / total_entities as f64
    } else {
        0.0
    };
    let market_saturation = indices::market_saturation(entity_density, competitor_share, config);

    // Enrichment indices arrive from a separate load, never from this pass
    let population_index: Option<f64> = None;
    let income_index: Option<f64> = None;

    let mut potential_factors: Vec<f64> = Vec::new();
    if accessibility > 0.0 {
        potential_factors.push(accessibility);
    }
    if traffic_count > 0 && config.reference_density > 0.0 {
        let traffic_density = traffic_count as f64 / area_km2;
        potential_factors.push((traffic_density / config.reference_density).min(1.0));
    }
    if let Some(population) = population_index {
        potential_factors.push(population);
    }
    if let Some(income) = income_index {
        potential_factors.push(income);
    }
    let retail_potential =
        indices::retail_potential(&potential_factors, competition_intensity, config);

    let risk_score = indices::risk_score(
        competition_intensity,
        entity_density,
        income_index,
        accessibility,
        config,
    );

    let avg_quality = if total_entities > 0 {
        Some(quality_sum / total_entities as f64)
    } else {
        None
    };

    HexMetrics {
        cell_id,
        resolution,
        total_entities,
        poi_count,
        transport_count,
        road_count,
        competitor_count,
        traffic_count,
        accessibility_count,
        neutral_count,
        category_counts,
        entity_density,
        poi_density,
        competitor_density,
        influence_positive,
        influence_negative,
        influence_net: influence_positive - influence_negative,
        competition_intensity,
        accessibility,
        market_saturation,
        retail_potential,
        risk_score,
        avg_quality,
        population_index,
        income_index,
        bins: BTreeMap::new(),
        bivariate: BTreeMap::new(),
    }
}
