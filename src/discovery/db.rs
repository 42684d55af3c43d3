// src/discovery/db.rs
//
// Candidate store operations. Upserts are status-preserving for terminal
// rows (re-observation only refreshes frequency and last_seen); every
// status change goes through the transition check, and batch reviews leave
// an operation record behind.

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDateTime;
use log::{info, warn};
use postgres_types::ToSql;
use tokio_postgres::{GenericClient, Row as PgRow};
use uuid::Uuid;

use super::{BatchAction, CandidateFilter, Observation};
use crate::hexgrid::SUPPORTED_RESOLUTIONS;
use crate::models::{
    BatchSummary, BrandCandidate, CandidateId, CandidateStatus, CellId, FunctionalGroup,
};
use crate::utils::db_connect::PgPool;

/// Rows per multi-row upsert statement (17 params each)
const UPSERT_CHUNK_SIZE: usize = 300;

const UPSERT_COLUMNS: &str = "
    id, name, normalized_name, total_frequency, regions, categories,
    distinct_cells, status, confidence_score, is_network_candidate,
    recommendation_reason, suggested_canonical_name,
    suggested_functional_group, suggested_influence_weight, suggested_format,
    first_seen, last_seen";

// Terminal rows only ever refresh their observation stats; everything else
// keeps the reviewed values.
const UPSERT_CONFLICT: &str = "
    ON CONFLICT (normalized_name) DO UPDATE SET
        total_frequency = EXCLUDED.total_frequency,
        first_seen = LEAST(brand_candidates.first_seen, EXCLUDED.first_seen),
        last_seen = GREATEST(brand_candidates.last_seen, EXCLUDED.last_seen),
        name = CASE WHEN brand_candidates.status IN ('approved', 'rejected')
                    THEN brand_candidates.name ELSE EXCLUDED.name END,
        regions = CASE WHEN brand_candidates.status IN ('approved', 'rejected')
                       THEN brand_candidates.regions ELSE EXCLUDED.regions END,
        categories = CASE WHEN brand_candidates.status IN ('approved', 'rejected')
                          THEN brand_candidates.categories ELSE EXCLUDED.categories END,
        distinct_cells = CASE WHEN brand_candidates.status IN ('approved', 'rejected')
                              THEN brand_candidates.distinct_cells ELSE EXCLUDED.distinct_cells END,
        status = CASE WHEN brand_candidates.status IN ('approved', 'rejected')
                      THEN brand_candidates.status ELSE EXCLUDED.status END,
        confidence_score = CASE WHEN brand_candidates.status IN ('approved', 'rejected')
                                THEN brand_candidates.confidence_score ELSE EXCLUDED.confidence_score END,
        is_network_candidate = CASE WHEN brand_candidates.status IN ('approved', 'rejected')
                                    THEN brand_candidates.is_network_candidate ELSE EXCLUDED.is_network_candidate END,
        recommendation_reason = CASE WHEN brand_candidates.status IN ('approved', 'rejected')
                                     THEN brand_candidates.recommendation_reason ELSE EXCLUDED.recommendation_reason END,
        suggested_canonical_name = CASE WHEN brand_candidates.status IN ('approved', 'rejected')
                                        THEN brand_candidates.suggested_canonical_name ELSE EXCLUDED.suggested_canonical_name END,
        suggested_functional_group = CASE WHEN brand_candidates.status IN ('approved', 'rejected')
                                          THEN brand_candidates.suggested_functional_group ELSE EXCLUDED.suggested_functional_group END,
        suggested_influence_weight = CASE WHEN brand_candidates.status IN ('approved', 'rejected')
                                          THEN brand_candidates.suggested_influence_weight ELSE EXCLUDED.suggested_influence_weight END,
        suggested_format = CASE WHEN brand_candidates.status IN ('approved', 'rejected')
                                THEN brand_candidates.suggested_format ELSE EXCLUDED.suggested_format END,
        updated_at = now()";

const PARAMS_PER_ROW: usize = 17;

// Owned column values for one row, borrowed by the params slice.
struct CandidateParams {
    id: String,
    name: String,
    normalized_name: String,
    total_frequency: i64,
    regions: Vec<String>,
    categories: Vec<String>,
    distinct_cells: i64,
    status: &'static str,
    confidence_score: f64,
    is_network_candidate: bool,
    recommendation_reason: Option<String>,
    suggested_canonical_name: Option<String>,
    suggested_functional_group: Option<&'static str>,
    suggested_influence_weight: Option<f64>,
    suggested_format: Option<String>,
    first_seen: NaiveDateTime,
    last_seen: NaiveDateTime,
}

impl CandidateParams {
    fn from_candidate(candidate: &BrandCandidate) -> Self {
        Self {
            id: candidate.id.0.clone(),
            name: candidate.name.clone(),
            normalized_name: candidate.normalized_name.clone(),
            total_frequency: candidate.total_frequency,
            regions: candidate.regions.clone(),
            categories: candidate.categories.clone(),
            distinct_cells: candidate.distinct_cells,
            status: candidate.status.as_str(),
            confidence_score: candidate.confidence_score,
            is_network_candidate: candidate.is_network_candidate,
            recommendation_reason: candidate.recommendation_reason.clone(),
            suggested_canonical_name: candidate.suggested_canonical_name.clone(),
            suggested_functional_group: candidate
                .suggested_functional_group
                .map(|g| g.as_str()),
            suggested_influence_weight: candidate.suggested_influence_weight,
            suggested_format: candidate.suggested_format.clone(),
            first_seen: candidate.first_seen,
            last_seen: candidate.last_seen,
        }
    }

    fn push_params<'a>(&'a self, params: &mut Vec<&'a (dyn ToSql + Sync)>) {
        params.push(&self.id);
        params.push(&self.name);
        params.push(&self.normalized_name);
        params.push(&self.total_frequency);
        params.push(&self.regions);
        params.push(&self.categories);
        params.push(&self.distinct_cells);
        params.push(&self.status);
        params.push(&self.confidence_score);
        params.push(&self.is_network_candidate);
        params.push(&self.recommendation_reason);
        params.push(&self.suggested_canonical_name);
        params.push(&self.suggested_functional_group);
        params.push(&self.suggested_influence_weight);
        params.push(&self.suggested_format);
        params.push(&self.first_seen);
        params.push(&self.last_seen);
    }
}

/// Batch upsert of discovered candidates keyed by normalized name.
pub async fn upsert_candidates(
    pool: &PgPool,
    candidates: &[BrandCandidate],
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    summary.processed = candidates.len();
    if candidates.is_empty() {
        return Ok(summary);
    }

    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for upsert_candidates")?;

    for chunk in candidates.chunks(UPSERT_CHUNK_SIZE) {
        let rows: Vec<CandidateParams> =
            chunk.iter().map(CandidateParams::from_candidate).collect();

        match upsert_chunk(&*conn, &rows).await {
            Ok(n) => summary.succeeded += n as usize,
            Err(e) => {
                warn!(
                    "Chunk upsert of {} candidates failed ({}); retrying row-by-row",
                    rows.len(),
                    e
                );
                for row in &rows {
                    match upsert_one(&*conn, row).await {
                        Ok(()) => summary.succeeded += 1,
                        Err(e) => summary
                            .record_failure(format!("candidate '{}': {}", row.normalized_name, e)),
                    }
                }
            }
        }
    }

    Ok(summary)
}

async fn upsert_chunk(conn: &impl GenericClient, rows: &[CandidateParams]) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut query = format!(
        "INSERT INTO public.brand_candidates ({}) VALUES ",
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
        .context("Failed to batch upsert brand_candidates")?;
    Ok(affected)
}

async fn upsert_one(conn: &impl GenericClient, row: &CandidateParams) -> Result<()> {
    let placeholders: Vec<String> =
        (1..=PARAMS_PER_ROW).map(|j| format!("${}", j)).collect();
    let query = format!(
        "INSERT INTO public.brand_candidates ({}) VALUES ({}){}",
        UPSERT_COLUMNS,
        placeholders.join(", "),
        UPSERT_CONFLICT
    );
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(PARAMS_PER_ROW);
    row.push_params(&mut params);
    conn.execute(&query, &params[..])
        .await
        .with_context(|| format!("Failed to upsert candidate '{}'", row.normalized_name))?;
    Ok(())
}

/// Moves one candidate through the review state machine. Illegal
/// transitions (out of a terminal state, or backwards) fail without
/// touching the row.
pub async fn update_candidate_status(
    pool: &PgPool,
    candidate_id: &str,
    new_status: CandidateStatus,
    reviewed_by: &str,
    reason: &str,
) -> Result<()> {
    let mut conn = pool
        .get()
        .await
        .context("Failed to get DB connection for update_candidate_status")?;
    let tx = conn
        .transaction()
        .await
        .context("Failed to open status transaction")?;

    let row = tx
        .query_opt(
            "SELECT status FROM public.brand_candidates WHERE id = $1 FOR UPDATE",
            &[&candidate_id],
        )
        .await
        .context("Failed to load candidate status")?
        .ok_or_else(|| anyhow!("candidate '{}' not found", candidate_id))?;

    let status_str: String = row.get(0);
    let status = CandidateStatus::parse(&status_str).ok_or_else(|| {
        anyhow!(
            "candidate '{}' has unknown status '{}'",
            candidate_id,
            status_str
        )
    })?;
    if !status.can_transition(new_status) {
        bail!(
            "candidate '{}' cannot move from '{}' to '{}'",
            candidate_id,
            status.as_str(),
            new_status.as_str()
        );
    }

    tx.execute(
        "UPDATE public.brand_candidates
         SET status = $2, reviewed_by = $3, review_reason = $4, updated_at = now()
         WHERE id = $1",
        &[&candidate_id, &new_status.as_str(), &reviewed_by, &reason],
    )
    .await
    .context("Failed to update candidate status")?;

    tx.commit()
        .await
        .context("Failed to commit candidate status change")?;
    Ok(())
}

/// Operator override: returns a candidate to `new` regardless of its
/// current state, so it can re-enter review.
pub async fn reset_candidate(pool: &PgPool, candidate_id: &str, operator: &str) -> Result<()> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for reset_candidate")?;

    let affected = conn
        .execute(
            "UPDATE public.brand_candidates
             SET status = 'new', reviewed_by = $2, review_reason = 'operator reset',
                 updated_at = now()
             WHERE id = $1",
            &[&candidate_id, &operator],
        )
        .await
        .context("Failed to reset candidate")?;

    if affected == 0 {
        bail!("candidate '{}' not found", candidate_id);
    }
    info!("Reset candidate {} to 'new' (by {})", candidate_id, operator);
    Ok(())
}

const SELECT_COLUMNS: &str = "
    id, name, normalized_name, total_frequency, regions, categories,
    distinct_cells, status, confidence_score, is_network_candidate,
    recommendation_reason, suggested_canonical_name,
    suggested_functional_group, suggested_influence_weight, suggested_format,
    first_seen, last_seen";

/// Queries candidates with an AND-combined filter, strongest first.
pub async fn query_candidates(
    pool: &PgPool,
    filter: &CandidateFilter,
) -> Result<Vec<BrandCandidate>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for query_candidates")?;

    let mut query = format!(
        "SELECT {} FROM public.brand_candidates WHERE 1 = 1",
        SELECT_COLUMNS
    );

    let status_str = filter.status.map(|s| s.as_str().to_string());
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    if let Some(status) = &status_str {
        params.push(status);
        query.push_str(&format!(" AND status = ${}", params.len()));
    }
    if let Some(min) = &filter.min_confidence {
        params.push(min);
        query.push_str(&format!(" AND confidence_score >= ${}", params.len()));
    }
    if let Some(max) = &filter.max_confidence {
        params.push(max);
        query.push_str(&format!(" AND confidence_score <= ${}", params.len()));
    }
    if let Some(min) = &filter.min_frequency {
        params.push(min);
        query.push_str(&format!(" AND total_frequency >= ${}", params.len()));
    }
    if let Some(max) = &filter.max_frequency {
        params.push(max);
        query.push_str(&format!(" AND total_frequency <= ${}", params.len()));
    }
    if let Some(category) = &filter.category {
        params.push(category);
        query.push_str(&format!(" AND ${} = ANY(categories)", params.len()));
    }
    if filter.network_only {
        query.push_str(" AND is_network_candidate");
    }
    query.push_str(" ORDER BY confidence_score DESC, normalized_name");

    let rows = conn
        .query(&query, &params[..])
        .await
        .context("Failed to query brand_candidates")?;

    let mut candidates = Vec::with_capacity(rows.len());
    for row in &rows {
        match candidate_from_row(row) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => warn!("Skipping malformed candidate row: {}", e),
        }
    }
    Ok(candidates)
}

fn candidate_from_row(row: &PgRow) -> Result<BrandCandidate> {
    let id: String = row.get(0);
    let status_str: String = row.get(7);
    let status = CandidateStatus::parse(&status_str)
        .ok_or_else(|| anyhow!("candidate '{}' has unknown status '{}'", id, status_str))?;

    let suggested_functional_group = row
        .get::<_, Option<String>>(12)
        .and_then(|s| match FunctionalGroup::parse(&s) {
            Some(group) => Some(group),
            None => {
                warn!("Candidate '{}' has unknown suggested group '{}'", id, s);
                None
            }
        });

    Ok(BrandCandidate {
        id: CandidateId(id),
        name: row.get(1),
        normalized_name: row.get(2),
        total_frequency: row.get(3),
        regions: row.get::<_, Option<Vec<String>>>(4).unwrap_or_default(),
        categories: row.get::<_, Option<Vec<String>>>(5).unwrap_or_default(),
        distinct_cells: row.get(6),
        status,
        confidence_score: row.get(8),
        is_network_candidate: row.get(9),
        recommendation_reason: row.get(10),
        suggested_canonical_name: row.get(11),
        suggested_functional_group,
        suggested_influence_weight: row.get(13),
        suggested_format: row.get(14),
        first_seen: row.get(15),
        last_seen: row.get(16),
    })
}

/// Loads the unmatched POI observations discovery feeds on. The cell at the
/// finest supported resolution carries the geographic-spread signal.
pub async fn fetch_unmatched_observations(
    pool: &PgPool,
    region: Option<&str>,
) -> Result<Vec<Observation>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for fetch_unmatched_observations")?;

    let finest = SUPPORTED_RESOLUTIONS[SUPPORTED_RESOLUTIONS.len() - 1].to_string();

    const QUERY: &str = "
        SELECT standardized_name, region, primary_category, hex_cells ->> $1
        FROM public.classified_entities
        WHERE entity_type = 'poi'
          AND brand_match_type = 'none'
          AND standardized_name IS NOT NULL
          AND ($2::TEXT IS NULL OR region = $2)
        ORDER BY id";

    let rows = conn
        .query(QUERY, &[&finest, &region])
        .await
        .context("Failed to fetch unmatched observations")?;

    Ok(rows
        .iter()
        .map(|row| Observation {
            name: row.get(0),
            region: row.get(1),
            category: row.get(2),
            cell: row.get::<_, Option<String>>(3).map(CellId),
        })
        .collect())
}

/// Outcome of one batch review, mirrored into the operation history.
#[derive(Debug, Clone)]
pub struct BatchReviewOutcome {
    pub operation_id: String,
    pub processed: usize,
    pub approved: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub errors: usize,
    pub error_samples: Vec<String>,
}

/// Applies one action to every candidate the filter matches. Terminal
/// candidates are skipped, not failed; the whole operation is recorded in
/// the batch-operation history.
pub async fn batch_review(
    pool: &PgPool,
    filter: &CandidateFilter,
    action: BatchAction,
    operator: &str,
    note: Option<&str>,
) -> Result<BatchReviewOutcome> {
    let candidates = query_candidates(pool, filter).await?;
    let target = action.target_status();
    let reason = match note {
        Some(note) => format!("batch {}: {}", action.as_str(), note),
        None => format!("batch {}", action.as_str()),
    };

    let mut outcome = BatchReviewOutcome {
        operation_id: Uuid::new_v4().to_string(),
        processed: candidates.len(),
        approved: 0,
        rejected: 0,
        skipped: 0,
        errors: 0,
        error_samples: Vec::new(),
    };

    for candidate in &candidates {
        if candidate.status.is_terminal() {
            outcome.skipped += 1;
            continue;
        }
        match update_candidate_status(pool, &candidate.id.0, target, operator, &reason).await {
            Ok(()) => match action {
                BatchAction::Approve => outcome.approved += 1,
                BatchAction::Reject => outcome.rejected += 1,
            },
            Err(e) => {
                outcome.errors += 1;
                if outcome.error_samples.len() < 10 {
                    outcome
                        .error_samples
                        .push(format!("{}: {}", candidate.normalized_name, e));
                }
            }
        }
    }

    record_batch_operation(pool, filter, action, operator, &outcome).await?;

    info!(
        "Batch {} by {}: {} processed, {} approved, {} rejected, {} skipped, {} errors",
        action.as_str(),
        operator,
        outcome.processed,
        outcome.approved,
        outcome.rejected,
        outcome.skipped,
        outcome.errors
    );
    Ok(outcome)
}

async fn record_batch_operation(
    pool: &PgPool,
    filter: &CandidateFilter,
    action: BatchAction,
    operator: &str,
    outcome: &BatchReviewOutcome,
) -> Result<()> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for record_batch_operation")?;

    let filter_json =
        serde_json::to_value(filter).context("Failed to serialize batch filter")?;

    const INSERT_SQL: &str = "
        INSERT INTO pipeline_metadata.candidate_batch_operations
            (id, operator, action, filter, processed, approved, rejected,
             skipped, errors, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())";

    conn.execute(
        INSERT_SQL,
        &[
            &outcome.operation_id,
            &operator,
            &action.as_str(),
            &filter_json,
            &(outcome.processed as i64),
            &(outcome.approved as i64),
            &(outcome.rejected as i64),
            &(outcome.skipped as i64),
            &(outcome.errors as i64),
        ],
    )
    .await
    .context("Failed to record batch operation")?;
    Ok(())
}
