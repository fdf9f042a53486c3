use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::info;

use fpl_xpoints::config::{PipelineConfig, arg_value};
use fpl_xpoints::feature_store::{FeatureStore, SqliteFeatureStore};
use fpl_xpoints::training::load_model;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = PipelineConfig::from_env_and_args(&args)?;
    let model_path = arg_value(&args, "--model")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("assets/points_model.json"));
    let player_id = parse_id(&args, "--player")?;
    let fixture_id = parse_id(&args, "--fixture")?;

    let model = load_model(&model_path)?;
    info!(model = %model_path.display(), "points model loaded");
    let store = SqliteFeatureStore::open(&cfg.feature_db)?;

    let player = store
        .read_player_features()?
        .into_iter()
        .find(|p| p.player_id == player_id)
        .with_context(|| format!("player {player_id} not in feature store"))?;
    let fixture = store
        .read_fixture_features()?
        .into_iter()
        .find(|f| f.fixture_id == fixture_id)
        .with_context(|| format!("fixture {fixture_id} not in feature store"))?;

    let points = model.predict_pair(&player, &fixture)?;
    println!(
        "player {} fixture {} (GW {}): expected points {:.2}",
        player_id,
        fixture_id,
        fixture
            .event
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string()),
        points
    );
    Ok(())
}

fn parse_id(args: &[String], flag: &str) -> Result<u32> {
    let raw = arg_value(args, flag).ok_or_else(|| anyhow!("missing {flag} <id>"))?;
    raw.parse::<u32>()
        .with_context(|| format!("{flag} expects a numeric id, got {raw:?}"))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
