use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::dataset::TrainingRow;
use crate::error::PipelineError;
use crate::fixture_features::FixtureFeatureSet;
use crate::player_features::PlayerFeatureSet;
use crate::schema::{FIELD_SCHEMA, FeatureVector, feature_vector, field_schema, schema_fingerprint};

const TRAIN_SPLIT: f64 = 0.85;
const MAX_ITERS: usize = 2000;
const LR_START: f64 = 0.05;
const IMPROVEMENT_EPS: f64 = 1e-6;

/// Fits a model over assembled rows.
pub trait Regressor {
    fn fit(&self, rows: &[TrainingRow]) -> Result<LinearPointsModel, PipelineError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RidgeRegressor {
    pub l2: f64,
}

impl Default for RidgeRegressor {
    fn default() -> Self {
        Self { l2: 0.01 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearPointsModel {
    pub version: u32,
    pub generated_at: String,
    pub schema_fingerprint: String,
    pub feature_names: Vec<String>,
    pub feature_means: Vec<f64>,
    pub feature_stds: Vec<f64>,
    pub coeffs: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub l2: f64,
    #[serde(default)]
    pub train_rmse: f64,
    #[serde(default)]
    pub val_rmse: f64,
    #[serde(default)]
    pub train_samples: usize,
    #[serde(default)]
    pub val_samples: usize,
}

impl LinearPointsModel {
    /// Rejects artifacts fitted against a different field list.
    pub fn check_schema(&self) -> Result<(), PipelineError> {
        if self.schema_fingerprint != schema_fingerprint()
            || self.coeffs.len() != FIELD_SCHEMA.len()
            || self.feature_means.len() != FIELD_SCHEMA.len()
            || self.feature_stds.len() != FIELD_SCHEMA.len()
        {
            return Err(PipelineError::SchemaMismatch {
                expected: schema_fingerprint().to_string(),
                found: self.schema_fingerprint.clone(),
            });
        }
        Ok(())
    }

    pub fn predict(&self, vector: &FeatureVector) -> Result<f64, PipelineError> {
        self.check_schema()?;
        vector.check_len()?;
        Ok(self.predict_unchecked(&vector.values))
    }

    pub fn predict_pair(
        &self,
        player: &PlayerFeatureSet,
        fixture: &FixtureFeatureSet,
    ) -> Result<f64, PipelineError> {
        self.predict(&feature_vector(player, fixture))
    }

    fn predict_unchecked(&self, x: &[f64]) -> f64 {
        let z: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, v)| standardized(*v, self.feature_means[i], self.feature_stds[i]))
            .collect();
        self.intercept + dot(&self.coeffs, &z)
    }
}

impl Regressor for RidgeRegressor {
    fn fit(&self, rows: &[TrainingRow]) -> Result<LinearPointsModel, PipelineError> {
        if rows.is_empty() {
            return Err(PipelineError::Training(anyhow!("no training rows")));
        }
        let width = FIELD_SCHEMA.len();
        if let Some(bad) = rows.iter().find(|r| r.features.len() != width) {
            return Err(PipelineError::SchemaMismatch {
                expected: format!("{width} fields"),
                found: format!(
                    "{} fields in row ({}, {})",
                    bad.features.len(),
                    bad.player_id,
                    bad.fixture_id
                ),
            });
        }

        let split_idx = split_train_index(rows.len());
        let (train_raw, val_raw) = rows.split_at(split_idx);
        let (means, stds) = feature_norm_stats(train_raw, width);

        let to_sample = |r: &TrainingRow| -> (Vec<f64>, f64) {
            let x = r
                .features
                .iter()
                .enumerate()
                .map(|(i, v)| standardized(*v, means[i], stds[i]))
                .collect();
            (x, r.label)
        };
        let train: Vec<(Vec<f64>, f64)> = train_raw.iter().map(to_sample).collect();
        let val: Vec<(Vec<f64>, f64)> = val_raw.iter().map(to_sample).collect();
        // Tiny sets have no held-out rows; score against the training rows.
        let holdout = if val.is_empty() { &train } else { &val };

        let (coeffs, intercept) = fit_coeffs(&train, holdout, width, self.l2);
        Ok(LinearPointsModel {
            version: 1,
            generated_at: chrono::Utc::now().to_rfc3339(),
            schema_fingerprint: schema_fingerprint().to_string(),
            feature_names: field_schema().iter().map(|s| s.to_string()).collect(),
            feature_means: means,
            feature_stds: stds,
            train_rmse: rmse(&coeffs, intercept, &train),
            val_rmse: rmse(&coeffs, intercept, holdout),
            coeffs,
            intercept,
            l2: self.l2,
            train_samples: train.len(),
            val_samples: val.len(),
        })
    }
}

pub fn save_model(model: &LinearPointsModel, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok();
    }
    let raw = serde_json::to_string_pretty(model).context("serialize model artifact")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, raw).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

pub fn load_model(path: &Path) -> Result<LinearPointsModel> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

fn split_train_index(n: usize) -> usize {
    let idx = ((n as f64) * TRAIN_SPLIT).round() as usize;
    idx.clamp(1, n)
}

fn feature_norm_stats(rows: &[TrainingRow], width: usize) -> (Vec<f64>, Vec<f64>) {
    let mut mean = vec![0.0; width];
    let mut var = vec![0.0; width];
    let n = rows.len().max(1) as f64;

    for row in rows {
        for (m, x) in mean.iter_mut().zip(&row.features) {
            *m += x;
        }
    }
    for m in &mut mean {
        *m /= n;
    }
    for row in rows {
        for i in 0..width {
            let d = row.features[i] - mean[i];
            var[i] += d * d;
        }
    }
    let stds = var.into_iter().map(|v| (v / n).sqrt().max(1e-6)).collect();
    (mean, stds)
}

fn standardized(x: f64, mean: f64, std: f64) -> f64 {
    (x - mean) / std.max(1e-6)
}

fn fit_coeffs(
    train: &[(Vec<f64>, f64)],
    val: &[(Vec<f64>, f64)],
    width: usize,
    l2: f64,
) -> (Vec<f64>, f64) {
    let mut coeffs = vec![0.0; width];
    let mut intercept = train.iter().map(|(_, y)| y).sum::<f64>() / train.len().max(1) as f64;
    let mut best = (coeffs.clone(), intercept);
    let mut best_val = rmse(&coeffs, intercept, val);
    let mut no_improve = 0usize;
    let n = train.len().max(1) as f64;

    for iter in 0..MAX_ITERS {
        let mut grad = vec![0.0; width];
        let mut grad_b = 0.0;
        for (x, y) in train {
            let err = intercept + dot(&coeffs, x) - y;
            grad_b += err;
            for (g, xi) in grad.iter_mut().zip(x) {
                *g += err * xi;
            }
        }

        let lr = LR_START / (1.0 + (iter as f64 * 0.003));
        for (c, g) in coeffs.iter_mut().zip(&grad) {
            *c -= lr * (g / n + l2 * *c);
        }
        intercept -= lr * grad_b / n;

        if iter % 20 == 0 || iter + 1 == MAX_ITERS {
            let val_rmse = rmse(&coeffs, intercept, val);
            if val_rmse + IMPROVEMENT_EPS < best_val {
                best_val = val_rmse;
                best = (coeffs.clone(), intercept);
                no_improve = 0;
            } else {
                no_improve = no_improve.saturating_add(1);
                if no_improve >= 20 {
                    break;
                }
            }
        }
    }

    best
}

fn rmse(coeffs: &[f64], intercept: f64, samples: &[(Vec<f64>, f64)]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sse: f64 = samples
        .iter()
        .map(|(x, y)| {
            let e = intercept + dot(coeffs, x) - y;
            e * e
        })
        .sum();
    (sse / samples.len() as f64).sqrt()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
