// src/binning/mod.rs
//
// Quantile binning over per-cell (or per-admin-unit) metric values. Bin 0
// is reserved for nulls; non-null values fall into bins 1..=n separated by
// linear-interpolated percentile boundaries computed strictly within one
// scope. Boundary ties go to the lower bin.

pub mod db;

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use thiserror::Error;

use serde_json::json;

use crate::config::BinningConfig;
use crate::models::{CellId, CellValue, HexMetrics};

#[derive(Debug, Error)]
pub enum BinningError {
    /// A scope with no non-null observations cannot be binned; callers must
    /// treat this as fatal rather than writing all-null assignments.
    #[error("empty binning scope '{scope}': metric '{metric}' has no non-null values")]
    EmptyScope { scope: String, metric: String },

    #[error("unknown metric '{0}'")]
    UnknownMetric(String),
}

/// Per-bin populations, index 0 being the null bin. Informational only;
/// quantile bins over skewed or tie-heavy data are legitimately uneven.
#[derive(Debug, Clone, PartialEq)]
pub struct BinDistribution {
    pub counts: Vec<usize>,
}

impl BinDistribution {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn non_null(&self) -> usize {
        self.counts.iter().skip(1).sum()
    }

    /// True when every populated non-null bin holds within `tolerance` of
    /// the ideal 1/n share of observations.
    pub fn is_roughly_even(&self, tolerance: f64) -> bool {
        let n_bins = self.counts.len().saturating_sub(1);
        let non_null = self.non_null();
        if n_bins == 0 || non_null == 0 {
            return true;
        }
        let ideal = 1.0 / n_bins as f64;
        self.counts.iter().skip(1).all(|&count| {
            count == 0 || ((count as f64 / non_null as f64) - ideal).abs() <= tolerance
        })
    }
}

/// One metric binned over one scope.
#[derive(Debug, Clone)]
pub struct MetricBins<K> {
    pub boundaries: Vec<f64>,
    pub assignments: HashMap<K, i16>,
    pub distribution: BinDistribution,
}

/// Linear-interpolated percentile over an ascending-sorted slice:
/// rank p·(n−1), interpolated between the surrounding observations.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let fraction = rank - lower as f64;
        sorted[lower] + fraction * (sorted[upper] - sorted[lower])
    }
}

/// Interior quantile boundaries for `n_bins` bins: the percentiles at
/// i/n for i in 1..n.
pub fn quantile_boundaries(values: &[f64], n_bins: usize) -> Vec<f64> {
    let n_bins = n_bins.max(1);
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    (1..n_bins)
        .map(|i| percentile(&sorted, i as f64 / n_bins as f64))
        .collect()
}

/// Bin id for one value: 0 for null, otherwise 1 plus the number of
/// boundaries strictly below the value, so a value sitting exactly on a
/// boundary stays in the lower bin.
pub fn assign_bin(value: Option<f64>, boundaries: &[f64]) -> i16 {
    match value {
        None => 0,
        Some(v) => 1 + boundaries.iter().filter(|b| v > **b).count() as i16,
    }
}

/// Bins one metric over one scope. Keys with null values get bin 0; the
/// scope is fatal-empty when no key carries a non-null value.
pub fn compute_bins<K>(
    scope: &str,
    metric: &str,
    values: &[(K, Option<f64>)],
    n_bins: usize,
) -> Result<MetricBins<K>, BinningError>
where
    K: Clone + Eq + Hash,
{
    let n_bins = n_bins.max(1);
    let non_null: Vec<f64> = values.iter().filter_map(|(_, v)| *v).collect();
    if non_null.is_empty() {
        return Err(BinningError::EmptyScope {
            scope: scope.to_string(),
            metric: metric.to_string(),
        });
    }

    let boundaries = quantile_boundaries(&non_null, n_bins);

    let mut assignments = HashMap::with_capacity(values.len());
    let mut counts = vec![0usize; n_bins + 1];
    for (key, value) in values {
        let bin = assign_bin(*value, &boundaries);
        counts[bin as usize] += 1;
        assignments.insert(key.clone(), bin);
    }

    Ok(MetricBins {
        boundaries,
        assignments,
        distribution: BinDistribution { counts },
    })
}

/// Bivariate code for a metric pair, e.g. bins (2, 3) become "2-3".
pub fn bivariate_code(bin_x: i16, bin_y: i16) -> String {
    format!("{}-{}", bin_x, bin_y)
}

/// Recovers the component bins from a bivariate code.
pub fn split_bivariate(code: &str) -> Option<(i16, i16)> {
    let (x, y) = code.split_once('-')?;
    Some((x.parse().ok()?, y.parse().ok()?))
}

/// Key under which a pair's code lands in the bivariate map. Metric names
/// contain single underscores, so the double underscore is unambiguous.
pub fn pair_key(metric_x: &str, metric_y: &str) -> String {
    format!("{}__{}", metric_x, metric_y)
}

type MetricAccessor = fn(&HexMetrics) -> Option<f64>;

/// Resolves a metric name up front, so callers fail on an unknown name even
/// when there are no cells to read it from.
fn metric_accessor(name: &str) -> Result<MetricAccessor, BinningError> {
    let accessor: MetricAccessor = match name {
        "total_entities" => |m| Some(m.total_entities as f64),
        "poi_count" => |m| Some(m.poi_count as f64),
        "competitor_count" => |m| Some(m.competitor_count as f64),
        "entity_density" => |m| Some(m.entity_density),
        "poi_density" => |m| Some(m.poi_density),
        "competitor_density" => |m| Some(m.competitor_density),
        "influence_net" => |m| Some(m.influence_net),
        "competition_intensity" => |m| Some(m.competition_intensity),
        "accessibility" => |m| Some(m.accessibility),
        "market_saturation" => |m| Some(m.market_saturation),
        "retail_potential" => |m| Some(m.retail_potential),
        "risk_score" => |m| Some(m.risk_score),
        "avg_quality" => |m| m.avg_quality,
        "population_index" => |m| m.population_index,
        "income_index" => |m| m.income_index,
        _ => return Err(BinningError::UnknownMetric(name.to_string())),
    };
    Ok(accessor)
}

/// Named metric value of one cell. Counts surface as f64; optional
/// enrichment fields pass their nullability through.
pub fn metric_value(metrics: &HexMetrics, name: &str) -> Result<Option<f64>, BinningError> {
    Ok(metric_accessor(name)?(metrics))
}

/// Bin and bivariate assignments for every cell of one scope, ready to
/// write back over the previous assignments.
#[derive(Debug, Clone)]
pub struct ScopeBinning {
    pub scope: String,
    pub diagnostics: Vec<(String, BinDistribution)>,
    pub bins_by_cell: HashMap<CellId, BTreeMap<String, i16>>,
    pub bivariate_by_cell: HashMap<CellId, BTreeMap<String, String>>,
}

/// Bins every configured metric over one scope of cells and derives the
/// configured bivariate codes.
pub fn bin_cells(
    scope: &str,
    metrics: &[HexMetrics],
    config: &BinningConfig,
) -> Result<ScopeBinning, BinningError> {
    let mut bins_by_cell: HashMap<CellId, BTreeMap<String, i16>> = metrics
        .iter()
        .map(|m| (m.cell_id.clone(), BTreeMap::new()))
        .collect();
    let mut diagnostics = Vec::with_capacity(config.metrics.len());

    for metric in &config.metrics {
        let accessor = metric_accessor(metric)?;
        let values: Vec<(CellId, Option<f64>)> = metrics
            .iter()
            .map(|m| (m.cell_id.clone(), accessor(m)))
            .collect();

        let binned = compute_bins(scope, metric, &values, config.n_bins)?;
        for (cell, bin) in &binned.assignments {
            if let Some(cell_bins) = bins_by_cell.get_mut(cell) {
                cell_bins.insert(metric.clone(), *bin);
            }
        }
        diagnostics.push((metric.clone(), binned.distribution));
    }

    let mut bivariate_by_cell: HashMap<CellId, BTreeMap<String, String>> =
        HashMap::with_capacity(bins_by_cell.len());
    for (cell, cell_bins) in &bins_by_cell {
        let mut codes = BTreeMap::new();
        for (x, y) in &config.bivariate_pairs {
            let bin_x = cell_bins.get(x).copied().unwrap_or(0);
            let bin_y = cell_bins.get(y).copied().unwrap_or(0);
            codes.insert(pair_key(x, y), bivariate_code(bin_x, bin_y));
        }
        bivariate_by_cell.insert(cell.clone(), codes);
    }

    Ok(ScopeBinning {
        scope: scope.to_string(),
        diagnostics,
        bins_by_cell,
        bivariate_by_cell,
    })
}

/// Flattens stored metrics into the compact per-cell records the
/// visualization consumer reads: one metric value, the bivariate code for
/// the requested pair, and optionally a payload for tooltips. Cells where
/// the metric is null are omitted.
pub fn cell_values(
    metrics: &[HexMetrics],
    metric: &str,
    pair: Option<(&str, &str)>,
    include_metrics: bool,
) -> Result<Vec<CellValue>, BinningError> {
    let accessor = metric_accessor(metric)?;
    let mut out = Vec::with_capacity(metrics.len());
    for m in metrics {
        let value = match accessor(m) {
            Some(v) => v,
            None => continue,
        };
        let bivar_code = pair.and_then(|(x, y)| m.bivariate.get(&pair_key(x, y)).cloned());
        let payload = include_metrics.then(|| {
            json!({
                "total_entities": m.total_entities,
                "poi_count": m.poi_count,
                "competitor_count": m.competitor_count,
                "competition_intensity": m.competition_intensity,
                "accessibility": m.accessibility,
                "retail_potential": m.retail_potential,
                "risk_score": m.risk_score,
                "bins": m.bins,
            })
        });
        out.push(CellValue {
            cell_id: m.cell_id.clone(),
            value,
            bivar_code,
            metrics: payload,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&sorted, 0.0) - 1.0).abs() < 1e-9);
        assert!((percentile(&sorted, 0.5) - 2.5).abs() < 1e-9);
        assert!((percentile(&sorted, 1.0) - 4.0).abs() < 1e-9);
        assert_eq!(percentile(&[7.0], 0.5), 7.0);
    }

    #[test]
    fn test_terciles_split_evenly() {
        let values: Vec<(u32, Option<f64>)> =
            (1..=9).map(|i| (i, Some(i as f64))).collect();
        let binned = compute_bins("res9", "value", &values, 3).unwrap();

        for i in 1..=3u32 {
            assert_eq!(binned.assignments[&i], 1, "value {}", i);
        }
        for i in 4..=6u32 {
            assert_eq!(binned.assignments[&i], 2, "value {}", i);
        }
        for i in 7..=9u32 {
            assert_eq!(binned.assignments[&i], 3, "value {}", i);
        }
        assert_eq!(binned.distribution.counts, vec![0, 3, 3, 3]);
        assert!(binned.distribution.is_roughly_even(0.01));
    }

    #[test]
    fn test_boundary_ties_go_to_lower_bin() {
        assert_eq!(assign_bin(Some(2.0), &[2.0]), 1);
        assert_eq!(assign_bin(Some(2.0 + 1e-9), &[2.0]), 2);
        assert_eq!(assign_bin(Some(1.9), &[2.0]), 1);
        assert_eq!(assign_bin(Some(5.0), &[2.0, 4.0]), 3);
    }

    #[test]
    fn test_nulls_take_bin_zero() {
        let values = vec![
            ("a", Some(1.0)),
            ("b", None),
            ("c", Some(2.0)),
            ("d", Some(3.0)),
        ];
        let binned = compute_bins("res9", "avg_quality", &values, 3).unwrap();
        assert_eq!(binned.assignments["b"], 0);
        assert!(binned.assignments["a"] >= 1);
        assert_eq!(binned.distribution.counts[0], 1);
    }

    #[test]
    fn test_empty_scope_is_a_typed_error() {
        let no_rows: Vec<(&str, Option<f64>)> = vec![];
        let err = compute_bins("res10", "poi_density", &no_rows, 3).unwrap_err();
        assert!(matches!(err, BinningError::EmptyScope { .. }));

        // all-null is just as empty as no rows
        let all_null = vec![("a", None), ("b", None)];
        let err = compute_bins("res10", "income_index", &all_null, 3).unwrap_err();
        match err {
            BinningError::EmptyScope { scope, metric } => {
                assert_eq!(scope, "res10");
                assert_eq!(metric, "income_index");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_identical_values_collapse_to_bin_one() {
        let values: Vec<(u32, Option<f64>)> = (0..10).map(|i| (i, Some(5.0))).collect();
        let binned = compute_bins("res9", "value", &values, 3).unwrap();
        for i in 0..10u32 {
            assert_eq!(binned.assignments[&i], 1);
        }
    }

    #[test]
    fn test_bivariate_code_round_trip() {
        assert_eq!(bivariate_code(2, 3), "2-3");
        assert_eq!(split_bivariate("2-3"), Some((2, 3)));
        assert_eq!(split_bivariate("0-1"), Some((0, 1)));
        assert_eq!(split_bivariate("garbage"), None);
    }

    #[test]
    fn test_metric_value_names() {
        let metrics = sample_metrics("891fb46622fffff", 10, 2, 0.4);
        assert_eq!(metric_value(&metrics, "poi_density").unwrap(), Some(metrics.poi_density));
        assert_eq!(metric_value(&metrics, "avg_quality").unwrap(), metrics.avg_quality);
        assert_eq!(metric_value(&metrics, "population_index").unwrap(), None);
        assert!(matches!(
            metric_value(&metrics, "nonsense"),
            Err(BinningError::UnknownMetric(_))
        ));
    }

    #[test]
    fn test_bin_cells_assigns_all_metrics_and_pairs() {
        let cells: Vec<HexMetrics> = (0..9)
            .map(|i| {
                sample_metrics(
                    &format!("89{:013x}", i),
                    i + 1,
                    i / 3,
                    0.2 + 0.05 * i as f64,
                )
            })
            .collect();
        let config = BinningConfig::default();
        let scoped = bin_cells("res9", &cells, &config).unwrap();

        assert_eq!(scoped.bins_by_cell.len(), 9);
        assert_eq!(scoped.diagnostics.len(), config.metrics.len());
        for cell_bins in scoped.bins_by_cell.values() {
            assert_eq!(cell_bins.len(), config.metrics.len());
        }
        for codes in scoped.bivariate_by_cell.values() {
            assert_eq!(codes.len(), config.bivariate_pairs.len());
            for code in codes.values() {
                assert!(split_bivariate(code).is_some());
            }
        }
        let key = pair_key("poi_density", "competition_intensity");
        assert!(scoped
            .bivariate_by_cell
            .values()
            .all(|codes| codes.contains_key(&key)));
    }

    #[test]
    fn test_cell_values_omit_nulls_and_carry_codes() {
        let mut a = sample_metrics("cell-a", 10, 4, 0.5);
        a.bivariate.insert(
            pair_key("poi_density", "competition_intensity"),
            "2-3".to_string(),
        );
        let mut b = sample_metrics("cell-b", 20, 2, 0.7);
        b.avg_quality = None;

        let values = cell_values(
            &[a, b],
            "avg_quality",
            Some(("poi_density", "competition_intensity")),
            true,
        )
        .unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].cell_id.0, "cell-a");
        assert!((values[0].value - 0.5).abs() < 1e-9);
        assert_eq!(values[0].bivar_code.as_deref(), Some("2-3"));
        assert!(values[0].metrics.is_some());

        assert!(cell_values(&[], "no_such_metric", None, false).is_err());
    }

    #[test]
    fn test_unknown_metric_rejected_before_reading_cells() {
        assert!(matches!(
            cell_values(&[], "no_such_metric", None, false),
            Err(BinningError::UnknownMetric(_))
        ));

        let mut config = BinningConfig::default();
        config.metrics = vec!["no_such_metric".to_string()];
        assert!(matches!(
            bin_cells("res9", &[], &config),
            Err(BinningError::UnknownMetric(_))
        ));
    }

    #[test]
    fn test_assignments_do_not_depend_on_input_order() {
        use rand::seq::SliceRandom;

        let mut values: Vec<(String, Option<f64>)> = (0..50)
            .map(|i| (format!("cell-{:02}", i), Some((i * 7 % 13) as f64)))
            .collect();
        let ordered = compute_bins("res9", "poi_density", &values, 5).unwrap();

        let mut rng = rand::thread_rng();
        values.shuffle(&mut rng);
        let shuffled = compute_bins("res9", "poi_density", &values, 5).unwrap();

        assert_eq!(ordered.boundaries, shuffled.boundaries);
        assert_eq!(ordered.assignments, shuffled.assignments);
    }

    fn sample_metrics(cell: &str, total: i64, competitors: i64, quality: f64) -> HexMetrics {
        use std::collections::BTreeMap;

        let area = 0.105332513;
        HexMetrics {
            cell_id: CellId(cell.to_string()),
            resolution: 9,
            total_entities: total,
            poi_count: total,
            transport_count: 0,
            road_count: 0,
            competitor_count: competitors,
            traffic_count: 0,
            accessibility_count: 0,
            neutral_count: total - competitors,
            category_counts: BTreeMap::new(),
            entity_density: total as f64 / area,
            poi_density: total as f64 / area,
            competitor_density: competitors as f64 / area,
            influence_positive: 0.0,
            influence_negative: 0.4 * competitors as f64,
            influence_net: -0.4 * competitors as f64,
            competition_intensity: competitors as f64 / total as f64,
            accessibility: 0.3,
            market_saturation: 0.2,
            retail_potential: 0.4,
            risk_score: 0.2,
            avg_quality: Some(quality),
            population_index: None,
            income_index: None,
            bins: BTreeMap::new(),
            bivariate: BTreeMap::new(),
        }
    }
}
