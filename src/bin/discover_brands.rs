// src/bin/discover_brands.rs
//
// Standalone candidate discovery: mines unmatched POI names for recurring
// brand candidates without running the rest of the pipeline. Useful after a
// registry update, when freshly promoted brands have thinned the unmatched
// pool and the candidate queue should be rebuilt.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{info, warn};

use geomarketing_lib::config::DiscoveryConfig;
use geomarketing_lib::discovery;
use geomarketing_lib::utils::db_connect;
use geomarketing_lib::utils::env::load_env;

#[derive(Parser)]
#[command(author, version, about = "Mine unmatched POI names for brand candidates", long_about = None)]
struct DiscoverArgs {
    /// Restrict mining to one region
    #[arg(long)]
    region: Option<String>,

    /// Override the configured minimum observation count
    #[arg(long)]
    min_frequency: Option<i64>,

    /// Mine and report, but do not write candidates
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    load_env();
    let args = DiscoverArgs::parse();

    let mut config = DiscoveryConfig::from_env();
    if let Some(min_frequency) = args.min_frequency {
        config.min_frequency = min_frequency;
    }
    config.log_config();

    let pool = db_connect::connect()
        .await
        .context("Failed to connect to database")?;

    let observations =
        discovery::db::fetch_unmatched_observations(&pool, args.region.as_deref()).await?;
    info!(
        "Mining {} unmatched observations{}",
        observations.len(),
        args.region
            .as_deref()
            .map(|r| format!(" in region '{}'", r))
            .unwrap_or_default()
    );

    let candidates = discovery::discover_candidates(&observations, &config, Utc::now().naive_utc());
    info!("Discovered {} candidates", candidates.len());

    for candidate in &candidates {
        info!(
            "  [{}] '{}': {} observations, {} region(s), confidence {:.2}{}",
            candidate.status.as_str(),
            candidate.name,
            candidate.total_frequency,
            candidate.regions.len(),
            candidate.confidence_score,
            if candidate.is_network_candidate {
                " (network)"
            } else {
                ""
            }
        );
    }

    if args.dry_run {
        info!("Dry run, nothing written");
        return Ok(());
    }

    let summary = discovery::db::upsert_candidates(&pool, &candidates).await?;
    if summary.failed > 0 {
        warn!(
            "{} candidate upserts failed: {:?}",
            summary.failed, summary.error_samples
        );
    }
    info!(
        "Wrote {} candidates ({} failed)",
        summary.succeeded, summary.failed
    );
    Ok(())
}
