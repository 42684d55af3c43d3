// src/bin/review_candidates.rs
//
// Operator CLI for the brand candidate review queue: list the queue,
// approve/reject/reset individual candidates, promote approved names into
// the registry, or sweep a filtered set in one batch operation.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use geomarketing_lib::discovery::db as candidate_db;
use geomarketing_lib::discovery::{BatchAction, CandidateFilter};
use geomarketing_lib::models::CandidateStatus;
use geomarketing_lib::registry;
use geomarketing_lib::utils::db_connect;
use geomarketing_lib::utils::env::load_env;

#[derive(Parser)]
#[command(author, version, about = "Review and manage brand candidates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List candidates matching a filter
    List {
        /// Filter by status: new, reviewing, approved, rejected
        #[arg(long)]
        status: Option<String>,

        /// Minimum network confidence score
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Minimum observation count
        #[arg(long)]
        min_frequency: Option<i64>,

        /// Filter by observed category
        #[arg(long)]
        category: Option<String>,

        /// Only candidates seen in two or more regions
        #[arg(long)]
        network_only: bool,
    },

    /// Approve one candidate
    Approve {
        id: String,

        /// Reviewer name recorded on the candidate
        #[arg(long)]
        reviewer: String,

        #[arg(long, default_value = "manual approval")]
        note: String,
    },

    /// Reject one candidate
    Reject {
        id: String,

        #[arg(long)]
        reviewer: String,

        #[arg(long, default_value = "manual rejection")]
        note: String,
    },

    /// Send one candidate back to the new queue (works from any status)
    Reset {
        id: String,

        #[arg(long)]
        operator: String,
    },

    /// Promote a candidate into the brand registry, approving it atomically
    Promote {
        id: String,

        #[arg(long)]
        reviewer: String,
    },

    /// Approve or reject every candidate matching a filter
    Batch {
        /// approve or reject
        action: String,

        /// Operator name recorded on the batch operation
        #[arg(long)]
        operator: String,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        min_confidence: Option<f64>,

        #[arg(long)]
        max_confidence: Option<f64>,

        #[arg(long)]
        min_frequency: Option<i64>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        network_only: bool,

        #[arg(long)]
        note: Option<String>,
    },
}

fn parse_status(s: &str) -> Result<CandidateStatus> {
    match CandidateStatus::parse(s) {
        Some(status) => Ok(status),
        None => bail!("unknown status '{}' (expected new, reviewing, approved or rejected)", s),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    load_env();
    let cli = Cli::parse();

    let pool = db_connect::connect()
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Commands::List {
            status,
            min_confidence,
            min_frequency,
            category,
            network_only,
        } => {
            let filter = CandidateFilter {
                status: status.as_deref().map(parse_status).transpose()?,
                min_confidence,
                max_confidence: None,
                min_frequency,
                max_frequency: None,
                category,
                network_only,
            };
            let candidates = candidate_db::query_candidates(&pool, &filter).await?;
            info!("{} candidates match", candidates.len());
            for c in &candidates {
                println!(
                    "{}  {:<9}  conf {:.2}  freq {:>5}  regions {}  {}{}",
                    c.id.0,
                    c.status.as_str(),
                    c.confidence_score,
                    c.total_frequency,
                    c.regions.len(),
                    c.name,
                    if c.is_network_candidate {
                        "  [network]"
                    } else {
                        ""
                    }
                );
                if let Some(reason) = &c.recommendation_reason {
                    println!("    {}", reason);
                }
            }
        }
        Commands::Approve { id, reviewer, note } => {
            candidate_db::update_candidate_status(
                &pool,
                &id,
                CandidateStatus::Approved,
                &reviewer,
                &note,
            )
            .await?;
            info!("Candidate {} approved by {}", id, reviewer);
        }
        Commands::Reject { id, reviewer, note } => {
            candidate_db::update_candidate_status(
                &pool,
                &id,
                CandidateStatus::Rejected,
                &reviewer,
                &note,
            )
            .await?;
            info!("Candidate {} rejected by {}", id, reviewer);
        }
        Commands::Reset { id, operator } => {
            candidate_db::reset_candidate(&pool, &id, &operator).await?;
            info!("Candidate {} reset to new by {}", id, operator);
        }
        Commands::Promote { id, reviewer } => {
            let brand = registry::db::promote_candidate_to_brand(&pool, &id, &reviewer).await?;
            info!(
                "Candidate {} promoted to brand '{}' ({})",
                id, brand.canonical_name, brand.id.0
            );
        }
        Commands::Batch {
            action,
            operator,
            status,
            min_confidence,
            max_confidence,
            min_frequency,
            category,
            network_only,
            note,
        } => {
            let action = match action.as_str() {
                "approve" => BatchAction::Approve,
                "reject" => BatchAction::Reject,
                other => bail!("unknown batch action '{}' (expected approve or reject)", other),
            };
            let filter = CandidateFilter {
                status: status.as_deref().map(parse_status).transpose()?,
                min_confidence,
                max_confidence,
                min_frequency,
                max_frequency: None,
                category,
                network_only,
            };
            let outcome =
                candidate_db::batch_review(&pool, &filter, action, &operator, note.as_deref())
                    .await?;
            info!(
                "Batch {} complete: {} processed, {} approved, {} rejected, {} skipped, {} errors",
                outcome.operation_id,
                outcome.processed,
                outcome.approved,
                outcome.rejected,
                outcome.skipped,
                outcome.errors
            );
            for sample in &outcome.error_samples {
                info!("  error: {}", sample);
            }
        }
    }

    Ok(())
}
