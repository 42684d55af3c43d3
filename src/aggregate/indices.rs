// src/aggregate/indices.rs
//
// Composite index formulas. Every constant comes in through
// AggregationConfig; none of these numbers is hard-coded business truth.

use crate::config::AggregationConfig;

/// Saturating competition intensity from the competitor ratio: linear from
/// 0 to `intensity_mid` over [0, knee], then a second linear segment from
/// `intensity_mid` to 1.0 over [knee, 1]. One competitor among many cannot
/// dominate the score, while saturated markets still reach the top.
pub fn competition_intensity(
    competitor_count: i64,
    total_count: i64,
    config: &AggregationConfig,
) -> f64 {
    if total_count <= 0 {
        return 0.0;
    }
    let ratio = (competitor_count as f64 / total_count as f64).clamp(0.0, 1.0);
    let knee = config.intensity_knee;
    let mid = config.intensity_mid;
    if knee <= 0.0 || knee >= 1.0 {
        return ratio;
    }
    if ratio <= knee {
        mid * (ratio / knee)
    } else {
        mid + (1.0 - mid) * (ratio - knee) / (1.0 - knee)
    }
}

/// Weighted blend of mean transport and mean road accessibility, clamped
/// to [0, 1]. Transport is weighted above road by default.
pub fn accessibility(
    transport_scores: &[f64],
    road_scores: &[f64],
    config: &AggregationConfig,
) -> f64 {
    let transport = mean(transport_scores);
    let road = mean(road_scores);
    (config.transport_weight * transport + config.road_weight * road).clamp(0.0, 1.0)
}

/// Blend of normalized entity density and competitor share.
pub fn market_saturation(
    entity_density: f64,
    competitor_share: f64,
    config: &AggregationConfig,
) -> f64 {
    let density_term = if config.reference_density > 0.0 {
        (entity_density / config.reference_density).min(1.0)
    } else {
        0.0
    };
    (config.saturation_density_weight * density_term
        + config.saturation_competitor_weight * competitor_share.clamp(0.0, 1.0))
    .clamp(0.0, 1.0)
}

/// Mean of whichever positive factors are present, scaled down by the
/// competition penalty term `1 - intensity * penalty`.
pub fn retail_potential(
    factors: &[f64],
    competition_intensity: f64,
    config: &AggregationConfig,
) -> f64 {
    if factors.is_empty() {
        return 0.0;
    }
    let base = mean(factors);
    let penalty = (1.0 - competition_intensity * config.competition_penalty).clamp(0.0, 1.0);
    (base * penalty).clamp(0.0, 1.0)
}

/// Mean of the tripped risk flags; when nothing trips, the baseline risk
/// applies. Never zero: there is always residual uncertainty.
pub fn risk_score(
    competition_intensity: f64,
    entity_density: f64,
    income_index: Option<f64>,
    accessibility: f64,
    config: &AggregationConfig,
) -> f64 {
    let mut flags = Vec::with_capacity(4);
    if competition_intensity > config.risk_competition_threshold {
        flags.push(config.risk_competition_value);
    }
    if entity_density < config.low_density_threshold {
        flags.push(config.risk_low_density_value);
    }
    if let Some(income) = income_index {
        if income < config.risk_income_threshold {
            flags.push(config.risk_low_income_value);
        }
    }
    if accessibility < config.risk_access_threshold {
        flags.push(config.risk_poor_access_value);
    }

    if flags.is_empty() {
        config.baseline_risk
    } else {
        mean(&flags)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
