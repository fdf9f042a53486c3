use anyhow::{Context, Result};
use tracing::info;

use fpl_xpoints::config::PipelineConfig;
use fpl_xpoints::feature_store::SqliteFeatureStore;
use fpl_xpoints::pipeline;
use fpl_xpoints::raw_store::JsonRecordStore;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = PipelineConfig::from_env_and_args(&args)?;
    info!(
        raw = %cfg.raw_dir.display(),
        db = %cfg.feature_db.display(),
        threads = cfg.parallelism,
        "starting pipeline"
    );

    let raw = JsonRecordStore::new(&cfg.raw_dir);
    let store = SqliteFeatureStore::open(&cfg.feature_db)?;

    let summary = pipeline::run_pipeline(&raw, &store, &cfg).context("pipeline run failed")?;

    println!("Pipeline complete");
    println!("DB: {}", cfg.feature_db.display());
    println!(
        "Players: {}  Fixtures: {}  Teams: {}",
        summary.features.players, summary.features.fixtures, summary.features.teams
    );
    let f = &summary.features;
    if f.dropped_games > 0 || f.dropped_fixtures > 0 || f.duplicate_ids > 0 {
        println!(
            "Dropped at validation: {} game entries, {} fixtures, {} repeated ids",
            f.dropped_games, f.dropped_fixtures, f.duplicate_ids
        );
    }
    println!("Training rows: {}", summary.assembly.rows);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
