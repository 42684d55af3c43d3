// src/main.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{info, warn};

use geomarketing_lib::pipeline::{self, PipelineContext};
use geomarketing_lib::utils::db_connect;
use geomarketing_lib::utils::env::load_env;
use geomarketing_lib::utils::progress::{phase_bar, ProgressConfig};
use geomarketing_lib::utils::get_memory_usage;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    info!("Starting geomarketing analytics pipeline");
    let start_time = Instant::now();

    load_env();

    let ctx = PipelineContext::from_env();
    ctx.log_config();

    let pool = db_connect::connect()
        .await
        .context("Failed to connect to database")?;
    info!("Successfully connected to the database");

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_flag = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("🛑 Shutdown signal received, finishing in-flight batches");
                cancel_flag.store(true, Ordering::Relaxed);
            }
            Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let plan = pipeline::default_plan();
    let progress_config = ProgressConfig::from_env();
    let multi_progress = progress_config.create_multi_progress();
    let stage_bar = multi_progress
        .as_ref()
        .map(|mp| phase_bar(mp, plan.len() as u64, "pipeline stages"));

    let stats = pipeline::run_pipeline(&pool, &ctx, &plan, &cancel, stage_bar.as_ref()).await?;

    let elapsed = start_time.elapsed();
    info!(
        "Pipeline run {} completed in {:.2?}. {} raw entities -> {} classified ({} skipped), {} matched / {} unmatched POIs",
        stats.run_id,
        elapsed,
        stats.total_raw_entities,
        stats.total_classified,
        stats.total_skipped,
        stats.total_matched,
        stats.total_unmatched
    );
    info!(
        "Aggregated {} cells, binned {} cells, proposed {} brand candidates",
        stats.cells_aggregated, stats.cells_binned, stats.candidates_discovered
    );
    for method in &stats.match_stats {
        info!(
            "  {} matching: {} entities at avg confidence {:.3}",
            method.match_type.as_str(),
            method.entities_matched,
            method.avg_confidence
        );
    }
    info!(
        "Phase timings: classification {:.2}s, aggregation {:.2}s, binning {:.2}s, discovery {:.2}s",
        stats.classification_time,
        stats.aggregation_time,
        stats.binning_time,
        stats.discovery_time
    );
    let (connections, idle) = db_connect::get_pool_status(&pool);
    info!(
        "Pool at exit: {} connections ({} idle). Peak process memory: {} MB",
        connections,
        idle,
        get_memory_usage().await
    );

    Ok(())
}
