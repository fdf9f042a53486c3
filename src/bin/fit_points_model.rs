use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use fpl_xpoints::config::{PipelineConfig, arg_value};
use fpl_xpoints::feature_store::{FeatureStore, SqliteFeatureStore};
use fpl_xpoints::training::{Regressor, RidgeRegressor, save_model};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = PipelineConfig::from_env_and_args(&args)?;
    let out_path = arg_value(&args, "--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("assets/points_model.json"));
    let l2 = arg_value(&args, "--l2")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(RidgeRegressor::default().l2);

    let store = SqliteFeatureStore::open(&cfg.feature_db)?;
    let rows = store
        .read_training_rows()
        .context("read training rows")?;
    info!(rows = rows.len(), l2, "fitting points model");

    let model = RidgeRegressor { l2 }.fit(&rows)?;

    println!(
        "Points model fit train={} val={} l2={:.4}",
        model.train_samples, model.val_samples, model.l2
    );
    println!(
        "rmse train={:.4} val={:.4}",
        model.train_rmse, model.val_rmse
    );
    println!();
    println!("Coefficients (standardized features):");
    for (idx, name) in model.feature_names.iter().enumerate() {
        println!(
            "  {:32} coeff={:+.4} mean={:+.4} std={:.4}",
            name, model.coeffs[idx], model.feature_means[idx], model.feature_stds[idx]
        );
    }

    save_model(&model, &out_path)?;
    println!();
    println!("artifact written: {}", out_path.display());
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
