// src/pipeline/mod.rs

//! Pipeline orchestration: runs classification, aggregation, binning and
//! candidate discovery as an ordered plan over one shared connection pool.
//!
//! Stages declare what data they consume and produce; `validate_plan`
//! rejects any ordering where a stage would run before its inputs exist
//! (binning before aggregation being the classic mistake).

pub mod db;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use futures::future::join_all;
use indicatif::ProgressBar;
use log::{debug, info, warn};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::aggregate;
use crate::binning;
use crate::classify::{self, db::EntityFilter};
use crate::config::{
    AggregationConfig, BinningConfig, DiscoveryConfig, MatcherConfig, PipelineConfig,
};
use crate::discovery;
use crate::hexgrid::{self, H3Grid, HexGrid, SUPPORTED_RESOLUTIONS};
use crate::matching::manager::{create_shared_matcher, SharedMatcher};
use crate::models::{
    BatchSummary, ClassifiedEntity, EntityType, MatchType, MatchTypeStats, PipelineStats,
    RawEntity,
};
use crate::registry::db::load_registry;
use crate::scoring::{parse_max_speed, ScoreInputs, ScoringTables};
use crate::tags;
use crate::utils::db_connect::PgPool;

/// Data products that flow between pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    RawEntities,
    ClassifiedEntities,
    HexMetrics,
    BinAssignments,
    BrandCandidates,
}

/// One stage of the analytics pipeline, with declared inputs and outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Classification,
    Aggregation,
    Binning,
    Discovery,
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Aggregation => "aggregation",
            Self::Binning => "binning",
            Self::Discovery => "discovery",
        }
    }

    pub fn inputs(&self) -> &'static [DataKind] {
        match self {
            Self::Classification => &[DataKind::RawEntities],
            Self::Aggregation => &[DataKind::ClassifiedEntities],
            Self::Binning => &[DataKind::HexMetrics],
            Self::Discovery => &[DataKind::ClassifiedEntities],
        }
    }

    pub fn outputs(&self) -> &'static [DataKind] {
        match self {
            Self::Classification => &[DataKind::ClassifiedEntities],
            Self::Aggregation => &[DataKind::HexMetrics],
            Self::Binning => &[DataKind::BinAssignments],
            Self::Discovery => &[DataKind::BrandCandidates],
        }
    }
}

/// The standard full run: classify, aggregate, bin, discover.
pub fn default_plan() -> Vec<PipelineStage> {
    vec![
        PipelineStage::Classification,
        PipelineStage::Aggregation,
        PipelineStage::Binning,
        PipelineStage::Discovery,
    ]
}

/// Checks that every stage's inputs are produced by an earlier stage.
/// Raw entities are the seed input and are always available.
pub fn validate_plan(plan: &[PipelineStage]) -> Result<()> {
    let mut available = vec![DataKind::RawEntities];
    for stage in plan {
        for input in stage.inputs() {
            if !available.contains(input) {
                bail!(
                    "Stage '{}' requires {:?}, which no earlier stage produces",
                    stage.name(),
                    input
                );
            }
        }
        available.extend_from_slice(stage.outputs());
    }
    Ok(())
}

/// Everything a pipeline run needs besides the pool: per-stage configs and
/// the influence/quality scoring tables.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub pipeline: PipelineConfig,
    pub matcher: MatcherConfig,
    pub aggregation: AggregationConfig,
    pub binning: BinningConfig,
    pub discovery: DiscoveryConfig,
    pub tables: ScoringTables,
}

impl PipelineContext {
    pub fn from_env() -> Self {
        Self {
            pipeline: PipelineConfig::from_env(),
            matcher: MatcherConfig::from_env(),
            aggregation: AggregationConfig::from_env(),
            binning: BinningConfig::from_env(),
            discovery: DiscoveryConfig::from_env(),
            tables: ScoringTables::default(),
        }
    }

    pub fn log_config(&self) {
        self.pipeline.log_config();
        self.matcher.log_config();
        self.aggregation.log_config();
        self.binning.log_config();
        self.discovery.log_config();
    }
}

/// Runs the given plan end to end, recording a pipeline_runs row at start
/// and finalizing it with the collected stats. Cancellation is checked
/// between stages and between batches; a cancelled run keeps whatever the
/// completed stages already persisted.
pub async fn run_pipeline(
    pool: &PgPool,
    ctx: &PipelineContext,
    plan: &[PipelineStage],
    cancel: &Arc<AtomicBool>,
    progress: Option<&ProgressBar>,
) -> Result<PipelineStats> {
    validate_plan(plan)?;

    let run_id = Uuid::new_v4();
    let run_timestamp = Utc::now().naive_utc();
    db::create_initial_run(pool, &run_id, run_timestamp, Some("full pipeline run")).await?;
    info!("🚀 Pipeline run {} started ({} stages)", run_id, plan.len());

    let mut stats = PipelineStats {
        run_id,
        ..Default::default()
    };
    let total_start = Instant::now();

    for stage in plan {
        if cancel.load(Ordering::Relaxed) {
            warn!("🛑 Cancellation requested, stopping before {}", stage.name());
            break;
        }
        let stage_start = Instant::now();
        info!("▶️  Stage {} starting", stage.name());

        match stage {
            PipelineStage::Classification => {
                let outcome = run_classification(pool, ctx, cancel).await?;
                stats.total_raw_entities = outcome.raw_seen;
                stats.total_classified = outcome.summary.succeeded;
                stats.total_skipped = outcome.summary.skipped;
                stats.total_matched = outcome.matched;
                stats.total_unmatched = outcome.unmatched;
                stats.match_stats = outcome.match_stats;
                stats.classification_time = stage_start.elapsed().as_secs_f64();
            }
            PipelineStage::Aggregation => {
                let (cells, summary) = run_aggregation(pool, ctx).await?;
                stats.cells_aggregated = cells;
                stats.aggregation_time = stage_start.elapsed().as_secs_f64();
                if summary.failed > 0 {
                    warn!(
                        "⚠️ Aggregation persisted with {} failed cells: {:?}",
                        summary.failed, summary.error_samples
                    );
                }
            }
            PipelineStage::Binning => {
                stats.cells_binned = run_binning(pool, ctx).await?;
                stats.binning_time = stage_start.elapsed().as_secs_f64();
            }
            PipelineStage::Discovery => {
                stats.candidates_discovered = run_discovery(pool, ctx).await?;
                stats.discovery_time = stage_start.elapsed().as_secs_f64();
            }
        }
        info!(
            "✅ Stage {} finished in {:.2}s",
            stage.name(),
            stage_start.elapsed().as_secs_f64()
        );
        if let Some(pb) = progress {
            pb.inc(1);
        }
    }
    if let Some(pb) = progress {
        pb.finish_with_message("pipeline complete");
    }

    db::finalize_run(pool, &stats, total_start.elapsed().as_secs_f64()).await?;
    info!(
        "🏁 Pipeline run {} finished in {:.2}s",
        run_id,
        total_start.elapsed().as_secs_f64()
    );
    Ok(stats)
}

/// What one classification batch produced, rolled up across all batches.
#[derive(Debug, Default)]
pub struct ClassificationOutcome {
    /// Raw rows seen, including rows whose geometry failed to decode
    pub raw_seen: usize,
    pub summary: BatchSummary,
    pub matched: usize,
    pub unmatched: usize,
    pub match_stats: Vec<MatchTypeStats>,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    summary: BatchSummary,
    matched: usize,
    unmatched: usize,
    /// Per-strategy (count, confidence sum) for matched POIs
    match_counts: HashMap<MatchType, (usize, f64)>,
}

/// Classifies and brand-matches all raw entities in keyset-paged batches.
/// Pages are processed concurrently under a semaphore so at most
/// `max_concurrent_batches` are in flight; the fetch loop itself blocks on
/// permit acquisition, which also bounds how many pages sit in memory.
pub async fn run_classification(
    pool: &PgPool,
    ctx: &PipelineContext,
    cancel: &Arc<AtomicBool>,
) -> Result<ClassificationOutcome> {
    let registry = Arc::new(load_registry(pool).await?);
    let matcher = create_shared_matcher(registry, ctx.matcher.clone());

    let semaphore = Arc::new(Semaphore::new(ctx.pipeline.max_concurrent_batches));
    let mut tasks = Vec::new();

    let mut outcome = ClassificationOutcome::default();
    let mut after_id: Option<String> = None;
    let mut page_count = 0usize;

    loop {
        if cancel.load(Ordering::Relaxed) {
            warn!("🛑 Cancellation requested, no further batches will be fetched");
            break;
        }

        let page = classify::db::fetch_raw_entities(
            pool,
            None,
            after_id.as_deref(),
            ctx.pipeline.batch_size as i64,
        )
        .await?;

        outcome.raw_seen += page.entities.len() + page.decode_failures;
        outcome.summary.skipped += page.decode_failures;

        match page.last_id {
            Some(last_id) => after_id = Some(last_id.0),
            None => break,
        }
        page_count += 1;

        if page.entities.is_empty() {
            continue;
        }

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Failed to acquire batch permit")?;

        let batch_len = page.entities.len();
        let pool_clone = pool.clone();
        let matcher_clone = matcher.clone();
        let tables = ctx.tables.clone();
        let entities = page.entities;
        let handle = tokio::spawn(async move {
            let _permit_guard = permit;
            process_batch(&pool_clone, &matcher_clone, &tables, entities).await
        });
        tasks.push((batch_len, handle));
    }

    info!(
        "📖 Fetched {} page(s), {} raw entities; waiting on {} batch task(s)",
        page_count,
        outcome.raw_seen,
        tasks.len()
    );

    let (sizes, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let results = join_all(handles).await;

    let mut match_counts: HashMap<MatchType, (usize, f64)> = HashMap::new();
    for (batch_len, join_result) in sizes.into_iter().zip(results) {
        match join_result {
            Ok(Ok(batch)) => {
                outcome.summary.merge(batch.summary);
                outcome.matched += batch.matched;
                outcome.unmatched += batch.unmatched;
                for (match_type, (count, confidence_sum)) in batch.match_counts {
                    let entry = match_counts.entry(match_type).or_insert((0, 0.0));
                    entry.0 += count;
                    entry.1 += confidence_sum;
                }
            }
            Ok(Err(e)) => {
                let mut failed_batch = BatchSummary::default();
                failed_batch.processed = batch_len;
                failed_batch.failed = batch_len;
                failed_batch
                    .error_samples
                    .push(format!("batch of {} failed: {}", batch_len, e));
                outcome.summary.merge(failed_batch);
                warn!("⚠️ Batch of {} failed: {}", batch_len, e);
            }
            Err(e) => {
                let mut failed_batch = BatchSummary::default();
                failed_batch.processed = batch_len;
                failed_batch.failed = batch_len;
                failed_batch
                    .error_samples
                    .push(format!("batch task of {} aborted: {}", batch_len, e));
                outcome.summary.merge(failed_batch);
                warn!("⚠️ Batch task panicked or was aborted: {}", e);
            }
        }
    }

    outcome.match_stats = assemble_match_stats(&match_counts);

    {
        let guard = matcher.lock().await;
        guard.log_cache_stats();
    }

    let failure_rate = outcome.summary.failure_rate();
    if failure_rate > ctx.pipeline.abort_failure_rate {
        bail!(
            "Classification failure rate {:.1}% exceeds abort threshold {:.1}%",
            failure_rate * 100.0,
            ctx.pipeline.abort_failure_rate * 100.0
        );
    }

    info!(
        "🧮 Classification: {} classified, {} skipped, {} failed; {} matched / {} unmatched POIs",
        outcome.summary.succeeded,
        outcome.summary.skipped,
        outcome.summary.failed,
        outcome.matched,
        outcome.unmatched
    );
    Ok(outcome)
}

async fn process_batch(
    pool: &PgPool,
    matcher: &SharedMatcher,
    tables: &ScoringTables,
    raw_batch: Vec<RawEntity>,
) -> Result<BatchOutcome> {
    let grid = H3Grid;
    let mut batch = BatchOutcome::default();
    let mut classified = Vec::with_capacity(raw_batch.len());
    let mut skipped_unclassified = 0usize;

    for raw in &raw_batch {
        match build_classified(raw, matcher, tables, &grid).await {
            Some(entity) => {
                if entity.entity_type == EntityType::Poi {
                    if entity.brand_normalized.is_some() {
                        batch.matched += 1;
                        let entry = batch
                            .match_counts
                            .entry(entity.brand_match_type)
                            .or_insert((0, 0.0));
                        entry.0 += 1;
                        entry.1 += entity.brand_confidence;
                    } else {
                        batch.unmatched += 1;
                    }
                }
                classified.push(entity);
            }
            None => skipped_unclassified += 1,
        }
    }

    batch.summary = classify::db::upsert_classified_entities(pool, &classified).await?;
    batch.summary.processed += skipped_unclassified;
    batch.summary.skipped += skipped_unclassified;
    Ok(batch)
}

/// Runs one raw entity through the full derivation: tag normalization,
/// classification, name standardization, brand matching (POIs only),
/// scoring and grid cell assignment. Returns None when no classification
/// rule matches, which is the expected fate of most map noise.
pub async fn build_classified(
    raw: &RawEntity,
    matcher: &SharedMatcher,
    tables: &ScoringTables,
    grid: &dyn HexGrid,
) -> Option<ClassifiedEntity> {
    let tag_map = raw.tags.normalize();
    let classification = classify::classify(&tag_map)?;

    let name = tags::extract_name(raw.name.as_deref(), &tag_map);
    let standardized = name.as_deref().map(tags::standardize_name);

    let brand = if classification.entity_type == EntityType::Poi {
        let lookup_name = standardized.as_deref().unwrap_or("");
        let mut guard = matcher.lock().await;
        guard.match_name(lookup_name, &tag_map, &classification.primary_category)
    } else {
        None
    };

    let hex_cells = match hexgrid::representative_point(&raw.geometry) {
        Some(point) => match hexgrid::cells_for_point(grid, &point, &SUPPORTED_RESOLUTIONS) {
            Ok(cells) => cells,
            Err(e) => {
                warn!("Entity {}: cell assignment failed: {}", raw.id.0, e);
                BTreeMap::new()
            }
        },
        None => {
            debug!("Entity {}: geometry has no representative point", raw.id.0);
            BTreeMap::new()
        }
    };

    let scores = tables.score_entity(ScoreInputs {
        classification: &classification,
        tags: &tag_map,
        brand: brand.as_ref(),
        has_name: standardized.is_some(),
        has_cells: !hex_cells.is_empty(),
    });

    let is_road = classification.entity_type == EntityType::RoadSegment;
    let highway_type = is_road.then(|| classification.secondary_category.clone());
    let max_speed = if is_road { parse_max_speed(&tag_map) } else { None };

    Some(ClassifiedEntity {
        id: raw.id.clone(),
        region: raw.region.clone(),
        entity_type: classification.entity_type,
        primary_category: classification.primary_category,
        secondary_category: classification.secondary_category,
        standardized_name: standardized,
        brand_normalized: brand.as_ref().map(|b| b.canonical_name.clone()),
        brand_confidence: brand.as_ref().map(|b| b.confidence).unwrap_or(0.0),
        brand_match_type: brand
            .as_ref()
            .map(|b| b.match_type)
            .unwrap_or(MatchType::None),
        functional_group: scores.functional_group,
        influence_weight: scores.influence_weight,
        hex_cells,
        accessibility_score: scores.accessibility_score,
        highway_type,
        max_speed,
        quality_score: scores.quality_score,
    })
}

fn assemble_match_stats(match_counts: &HashMap<MatchType, (usize, f64)>) -> Vec<MatchTypeStats> {
    let mut stats: Vec<MatchTypeStats> = match_counts
        .iter()
        .map(|(match_type, (count, confidence_sum))| MatchTypeStats {
            match_type: *match_type,
            entities_matched: *count,
            avg_confidence: if *count > 0 {
                confidence_sum / *count as f64
            } else {
                0.0
            },
        })
        .collect();
    stats.sort_by(|a, b| {
        b.entities_matched
            .cmp(&a.entities_matched)
            .then_with(|| a.match_type.as_str().cmp(b.match_type.as_str()))
    });
    stats
}

/// Re-aggregates every configured resolution from the classified entities
/// and upserts the resulting cell metrics. Returns (cells written, merged
/// persistence summary).
pub async fn run_aggregation(pool: &PgPool, ctx: &PipelineContext) -> Result<(usize, BatchSummary)> {
    let entities = classify::db::query_classified_entities(pool, &EntityFilter::default()).await?;
    info!("🗺️ Aggregating {} classified entities", entities.len());

    let grid = H3Grid;
    let outcomes = aggregate::aggregate_all(&entities, &grid, &ctx.aggregation)?;

    let mut cells = 0usize;
    let mut summary = BatchSummary::default();
    for outcome in &outcomes {
        cells += outcome.metrics.len();
        summary.merge(aggregate::db::upsert_hex_metrics(pool, &outcome.metrics).await?);
    }
    Ok((cells, summary))
}

/// Computes quantile bins for every configured resolution scope, then for
/// every admin level that has metric rows. A scope with cells but no
/// non-null values for a configured metric is a hard error; a level/metric
/// pair with no rows at all simply does not exist and is skipped.
pub async fn run_binning(pool: &PgPool, ctx: &PipelineContext) -> Result<usize> {
    let mut cells_binned = 0usize;

    for &resolution in &ctx.aggregation.resolutions {
        let metrics = aggregate::db::query_hex_metrics(pool, resolution, None).await?;
        if metrics.is_empty() {
            warn!("⚠️ No hex metrics at resolution {}, skipping scope", resolution);
            continue;
        }

        let scope = format!("res:{}", resolution);
        let scoped = binning::bin_cells(&scope, &metrics, &ctx.binning)?;
        for (metric, distribution) in &scoped.diagnostics {
            debug!(
                "Scope {} metric {}: bin counts {:?}",
                scope, metric, distribution.counts
            );
            if !distribution.is_roughly_even(0.5) {
                warn!(
                    "⚠️ Scope {} metric {} bins unevenly: {:?} (heavy ties)",
                    scope, metric, distribution.counts
                );
            }
        }

        let summary = binning::db::update_bins(pool, resolution, &scoped).await?;
        cells_binned += summary.succeeded;
        info!(
            "📊 Scope {}: {} cells binned, {} skipped",
            scope, summary.succeeded, summary.skipped
        );
    }

    let levels = binning::db::fetch_admin_levels(pool).await?;
    for level in levels {
        for metric in &ctx.binning.metrics {
            let values = binning::db::fetch_admin_metric_values(pool, level, metric).await?;
            if values.is_empty() {
                debug!("No admin rows for level {} metric {}", level, metric);
                continue;
            }
            let scope = format!("admin:{}", level);
            let bins = binning::compute_bins(&scope, metric, &values, ctx.binning.n_bins)?;
            let updated =
                binning::db::update_admin_bins(pool, level, metric, &bins.assignments).await?;
            info!(
                "📊 Scope {} metric {}: {} admin units binned",
                scope, metric, updated
            );
        }
    }

    Ok(cells_binned)
}

/// Mines unmatched POI names for recurring brand candidates and upserts
/// them into the review queue. Returns how many candidates were proposed.
pub async fn run_discovery(pool: &PgPool, ctx: &PipelineContext) -> Result<usize> {
    let observations = discovery::db::fetch_unmatched_observations(pool, None).await?;
    info!("🔎 Mining {} unmatched observations", observations.len());

    let candidates =
        discovery::discover_candidates(&observations, &ctx.discovery, Utc::now().naive_utc());
    if candidates.is_empty() {
        info!("🔎 No candidates cleared the frequency gate");
        return Ok(0);
    }

    let summary = discovery::db::upsert_candidates(pool, &candidates).await?;
    if summary.failed > 0 {
        warn!(
            "⚠️ {} candidate upserts failed: {:?}",
            summary.failed, summary.error_samples
        );
    }
    info!("🔎 Proposed {} brand candidates", summary.succeeded);
    Ok(candidates.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Brand, BrandId, FunctionalGroup};
    use crate::registry::BrandRegistry;
    use crate::tags::RawTagPayload;
    use geo::{Geometry, Point};
    use serde_json::json;

    #[test]
    fn test_default_plan_is_valid() {
        assert!(validate_plan(&default_plan()).is_ok());
    }

    #[test]
    fn test_binning_before_aggregation_is_rejected() {
        let plan = vec![
            PipelineStage::Classification,
            PipelineStage::Binning,
            PipelineStage::Aggregation,
        ];
        let err = validate_plan(&plan).unwrap_err();
        assert!(err.to_string().contains("binning"));
    }

    #[test]
    fn test_aggregation_requires_classification() {
        let plan = vec![PipelineStage::Aggregation];
        assert!(validate_plan(&plan).is_err());
    }

    #[test]
    fn test_discovery_only_needs_classification() {
        let plan = vec![PipelineStage::Classification, PipelineStage::Discovery];
        assert!(validate_plan(&plan).is_ok());
    }

    fn test_matcher() -> SharedMatcher {
        let brand = Brand {
            id: BrandId("b-atb".to_string()),
            canonical_name: "АТБ".to_string(),
            synonyms: vec!["атб-маркет".to_string()],
            functional_group: FunctionalGroup::Competitor,
            influence_weight: -0.8,
            tag_signature: None,
            format: Some("supermarket".to_string()),
        };
        let registry = Arc::new(BrandRegistry::build(vec![brand]).unwrap());
        create_shared_matcher(registry, MatcherConfig::default())
    }

    fn raw(id: &str, tags: serde_json::Value, name: Option<&str>) -> RawEntity {
        RawEntity {
            id: crate::models::EntityId(id.to_string()),
            tags: RawTagPayload::from_value(tags),
            geometry: Geometry::Point(Point::new(30.5234, 50.4501)),
            name: name.map(str::to_string),
            region: "Київська".to_string(),
        }
    }

    #[tokio::test]
    async fn test_build_classified_branded_poi() {
        let matcher = test_matcher();
        let tables = ScoringTables::default();
        let entity = raw(
            "poi-1",
            json!({"shop": "supermarket", "name": "АТБ №12"}),
            None,
        );

        let classified = build_classified(&entity, &matcher, &tables, &H3Grid)
            .await
            .unwrap();
        assert_eq!(classified.entity_type, EntityType::Poi);
        assert_eq!(classified.primary_category, "retail");
        assert_eq!(classified.brand_normalized.as_deref(), Some("АТБ"));
        assert!(classified.brand_confidence >= 0.5);
        assert_eq!(classified.functional_group, FunctionalGroup::Competitor);
        assert!(classified.influence_weight < 0.0);
        assert_eq!(classified.hex_cells.len(), SUPPORTED_RESOLUTIONS.len());
        assert!(classified.quality_score > 0.3);
    }

    #[tokio::test]
    async fn test_build_classified_road_segment() {
        let matcher = test_matcher();
        let tables = ScoringTables::default();
        let entity = raw(
            "road-1",
            json!({"highway": "primary", "maxspeed": "60"}),
            None,
        );

        let classified = build_classified(&entity, &matcher, &tables, &H3Grid)
            .await
            .unwrap();
        assert_eq!(classified.entity_type, EntityType::RoadSegment);
        assert_eq!(classified.highway_type.as_deref(), Some("primary"));
        assert_eq!(classified.max_speed, Some(60.0));
        assert_eq!(classified.functional_group, FunctionalGroup::Accessibility);
        assert!(classified.brand_normalized.is_none());
        assert_eq!(classified.brand_match_type, MatchType::None);
    }

    #[tokio::test]
    async fn test_build_classified_unclassifiable_is_none() {
        let matcher = test_matcher();
        let tables = ScoringTables::default();
        let entity = raw("misc-1", json!({"building": "yes"}), None);

        assert!(build_classified(&entity, &matcher, &tables, &H3Grid)
            .await
            .is_none());
    }

    #[test]
    fn test_match_stats_sorted_by_volume() {
        let mut counts = HashMap::new();
        counts.insert(MatchType::Exact, (10usize, 10.0));
        counts.insert(MatchType::Fuzzy, (25usize, 22.0));
        counts.insert(MatchType::Keyword, (25usize, 12.5));

        let stats = assemble_match_stats(&counts);
        assert_eq!(stats[0].match_type, MatchType::Fuzzy);
        assert_eq!(stats[1].match_type, MatchType::Keyword);
        assert_eq!(stats[2].match_type, MatchType::Exact);
        assert!((stats[0].avg_confidence - 0.88).abs() < 1e-9);
    }
}
