// src/registry/db.rs
//
// Registry store operations. Writes are validation-gated: a duplicate
// canonical name or a synonym already claimed by another brand blocks the
// write with a RegistryError instead of silently changing future matching.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use serde_json::Value;
use tokio_postgres::{GenericClient, Row as PgRow};
use uuid::Uuid;

use super::{BrandRegistry, RegistryError};
use crate::models::{Brand, BrandId, CandidateStatus, FunctionalGroup};
use crate::utils::db_connect::PgPool;

const BRAND_COLUMNS: &str =
    "id, canonical_name, synonyms, functional_group, influence_weight, tag_signature, format";

pub async fn load_all_brands(pool: &PgPool) -> Result<Vec<Brand>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for load_all_brands")?;

    let query = format!(
        "SELECT {} FROM public.brands ORDER BY canonical_name",
        BRAND_COLUMNS
    );
    let rows = conn
        .query(&query, &[])
        .await
        .context("Failed to load brands")?;

    let mut brands = Vec::with_capacity(rows.len());
    for row in &rows {
        brands.push(brand_from_row(row)?);
    }
    Ok(brands)
}

/// Loads all brands and builds the validated snapshot the matcher uses.
pub async fn load_registry(pool: &PgPool) -> Result<BrandRegistry> {
    let brands = load_all_brands(pool).await?;
    let registry = BrandRegistry::build(brands).context("Brand registry failed validation")?;
    info!("Loaded brand registry snapshot: {} brands", registry.len());
    Ok(registry)
}

/// Store-level single-brand lookup by canonical name or synonym.
pub async fn find_brand_by_name(pool: &PgPool, name: &str) -> Result<Option<Brand>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for find_brand_by_name")?;

    let query = format!(
        "SELECT {} FROM public.brands
         WHERE lower(canonical_name) = lower($1)
            OR EXISTS (SELECT 1 FROM unnest(synonyms) AS s WHERE lower(s) = lower($1))
         LIMIT 1",
        BRAND_COLUMNS
    );
    let row = conn
        .query_opt(&query, &[&name])
        .await
        .context("Failed to query brand by name")?;
    row.as_ref().map(brand_from_row).transpose()
}

/// Inserts a brand after checking that none of its names collide with an
/// existing brand's canonical name or synonyms.
pub async fn insert_brand(conn: &impl GenericClient, brand: &Brand) -> Result<()> {
    validate_no_conflicts(conn, brand).await?;

    const INSERT_SQL: &str = "
        INSERT INTO public.brands
            (id, canonical_name, synonyms, functional_group, influence_weight,
             tag_signature, format)
        VALUES ($1, $2, $3, $4, $5, $6, $7)";

    let tag_signature = brand
        .tag_signature
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .context("Failed to serialize brand tag_signature")?;

    conn.execute(
        INSERT_SQL,
        &[
            &brand.id.0,
            &brand.canonical_name,
            &brand.synonyms,
            &brand.functional_group.as_str(),
            &brand.influence_weight,
            &tag_signature,
            &brand.format,
        ],
    )
    .await
    .with_context(|| format!("Failed to insert brand '{}'", brand.canonical_name))?;

    info!("Registered brand '{}'", brand.canonical_name);
    Ok(())
}

async fn validate_no_conflicts(conn: &impl GenericClient, brand: &Brand) -> Result<()> {
    let mut names: Vec<String> = Vec::with_capacity(brand.synonyms.len() + 1);
    names.push(brand.canonical_name.to_lowercase());
    names.extend(brand.synonyms.iter().map(|s| s.to_lowercase()));

    const CONFLICT_SQL: &str = "
        SELECT canonical_name FROM public.brands
        WHERE lower(canonical_name) = ANY($1)
           OR EXISTS (SELECT 1 FROM unnest(synonyms) AS s WHERE lower(s) = ANY($1))
        LIMIT 1";

    let row = conn
        .query_opt(CONFLICT_SQL, &[&names])
        .await
        .context("Failed to run brand conflict check")?;

    if let Some(row) = row {
        let existing: String = row.get(0);
        let err = if existing.to_lowercase() == brand.canonical_name.to_lowercase() {
            RegistryError::DuplicateCanonicalName(brand.canonical_name.clone())
        } else {
            RegistryError::ConflictingSynonym {
                synonym: brand.canonical_name.clone(),
                first: existing,
                second: brand.canonical_name.clone(),
            }
        };
        return Err(anyhow!(err));
    }
    Ok(())
}

/// Promotes an approved-able candidate into a new Brand inside one
/// transaction: the candidate row is locked, validated, the brand inserted,
/// and the candidate marked approved.
pub async fn promote_candidate_to_brand(
    pool: &PgPool,
    candidate_id: &str,
    reviewer: &str,
) -> Result<Brand> {
    let mut conn = pool
        .get()
        .await
        .context("Failed to get DB connection for promote_candidate_to_brand")?;
    let tx = conn
        .transaction()
        .await
        .context("Failed to open promotion transaction")?;

    const SELECT_SQL: &str = "
        SELECT name, status, suggested_canonical_name, suggested_functional_group,
               suggested_influence_weight, suggested_format
        FROM public.brand_candidates
        WHERE id = $1
        FOR UPDATE";

    let row = tx
        .query_opt(SELECT_SQL, &[&candidate_id])
        .await
        .context("Failed to load candidate for promotion")?
        .ok_or_else(|| anyhow!("candidate '{}' not found", candidate_id))?;

    let name: String = row.get(0);
    let status_str: String = row.get(1);
    let status = CandidateStatus::parse(&status_str)
        .ok_or_else(|| anyhow!("candidate '{}' has unknown status '{}'", candidate_id, status_str))?;
    if !status.can_transition(CandidateStatus::Approved) {
        bail!(
            "candidate '{}' cannot be approved from status '{}'",
            candidate_id,
            status.as_str()
        );
    }

    let canonical: String = row
        .get::<_, Option<String>>(2)
        .unwrap_or_else(|| name.clone());
    let functional_group = row
        .get::<_, Option<String>>(3)
        .and_then(|s| FunctionalGroup::parse(&s))
        .unwrap_or(FunctionalGroup::Competitor);
    let influence_weight: f64 = row.get::<_, Option<f64>>(4).unwrap_or(-0.4);
    let format: Option<String> = row.get(5);

    let mut synonyms = Vec::new();
    if name.to_lowercase() != canonical.to_lowercase() {
        synonyms.push(name.clone());
    }

    let brand = Brand {
        id: BrandId(Uuid::new_v4().to_string()),
        canonical_name: canonical,
        synonyms,
        functional_group,
        influence_weight,
        tag_signature: None,
        format,
    };

    insert_brand(&tx, &brand).await?;

    const APPROVE_SQL: &str = "
        UPDATE public.brand_candidates
        SET status = 'approved', reviewed_by = $2,
            review_reason = 'promoted to brand', updated_at = now()
        WHERE id = $1";
    tx.execute(APPROVE_SQL, &[&candidate_id, &reviewer])
        .await
        .context("Failed to mark candidate approved")?;

    tx.commit()
        .await
        .context("Failed to commit candidate promotion")?;

    info!(
        "Promoted candidate '{}' to brand '{}'",
        name, brand.canonical_name
    );
    Ok(brand)
}

fn brand_from_row(row: &PgRow) -> Result<Brand> {
    let id: String = row.get(0);
    let canonical_name: String = row.get(1);

    let group_str: String = row.get(3);
    let functional_group = FunctionalGroup::parse(&group_str).unwrap_or_else(|| {
        warn!(
            "Brand '{}' has unknown functional_group '{}', treating as neutral",
            canonical_name, group_str
        );
        FunctionalGroup::Neutral
    });

    let tag_signature: Option<BTreeMap<String, String>> = row
        .get::<_, Option<Value>>(5)
        .and_then(|value| match serde_json::from_value(value) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!("Brand '{}' has malformed tag_signature: {}", canonical_name, e);
                None
            }
        });

    Ok(Brand {
        id: BrandId(id),
        canonical_name,
        synonyms: row.get::<_, Option<Vec<String>>>(2).unwrap_or_default(),
        functional_group,
        influence_weight: row.get(4),
        tag_signature,
        format: row.get(6),
    })
}
