// src/bin/recompute_bins.rs
//
// Recomputes quantile bins from the hex metrics already in the database,
// without re-running classification or aggregation. Run this after changing
// the bin count or metric list, or after loading new admin metric data.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use geomarketing_lib::aggregate::db as metrics_db;
use geomarketing_lib::binning;
use geomarketing_lib::config::{AggregationConfig, BinningConfig};
use geomarketing_lib::utils::db_connect;
use geomarketing_lib::utils::env::load_env;

#[derive(Parser)]
#[command(author, version, about = "Recompute quantile bins over stored hex metrics", long_about = None)]
struct RecomputeArgs {
    /// Recompute only this resolution (default: every configured one)
    #[arg(long)]
    resolution: Option<u8>,

    /// Skip the per-resolution cell scopes
    #[arg(long)]
    skip_cells: bool,

    /// Skip the admin-unit scopes
    #[arg(long)]
    skip_admin: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    load_env();
    let args = RecomputeArgs::parse();

    let binning_config = BinningConfig::from_env();
    binning_config.log_config();
    let resolutions = match args.resolution {
        Some(resolution) => vec![resolution],
        None => AggregationConfig::from_env().resolutions,
    };

    let pool = db_connect::connect()
        .await
        .context("Failed to connect to database")?;

    if !args.skip_cells {
        for &resolution in &resolutions {
            let metrics = metrics_db::query_hex_metrics(&pool, resolution, None).await?;
            if metrics.is_empty() {
                warn!("No hex metrics at resolution {}, skipping", resolution);
                continue;
            }

            let scope = format!("res:{}", resolution);
            let scoped = binning::bin_cells(&scope, &metrics, &binning_config)?;
            let summary = binning::db::update_bins(&pool, resolution, &scoped).await?;
            info!(
                "Scope {}: {} cells binned, {} skipped, {} failed",
                scope, summary.succeeded, summary.skipped, summary.failed
            );
        }
    }

    if !args.skip_admin {
        let levels = binning::db::fetch_admin_levels(&pool).await?;
        if levels.is_empty() {
            info!("No admin metric rows present, nothing to bin");
        }
        for level in levels {
            for metric in &binning_config.metrics {
                let values = binning::db::fetch_admin_metric_values(&pool, level, metric).await?;
                if values.is_empty() {
                    continue;
                }
                let scope = format!("admin:{}", level);
                let bins =
                    binning::compute_bins(&scope, metric, &values, binning_config.n_bins)?;
                let updated =
                    binning::db::update_admin_bins(&pool, level, metric, &bins.assignments)
                        .await?;
                info!(
                    "Scope {} metric {}: {} admin units binned",
                    scope, metric, updated
                );
            }
        }
    }

    Ok(())
}
