use std::env;
use std::path::PathBuf;

use anyhow::{Result, anyhow};

use crate::feature_store::default_db_path;
use crate::player_features::DEFAULT_UPCOMING_WINDOW;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSource {
    Placeholder { seed: u64 },
    Realized,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub raw_dir: PathBuf,
    pub feature_db: PathBuf,
    pub parallelism: usize,
    pub labels: LabelSource,
    pub upcoming_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            feature_db: default_db_path().unwrap_or_else(|| PathBuf::from("features.sqlite")),
            parallelism: 4,
            labels: LabelSource::Placeholder { seed: 42 },
            upcoming_window: DEFAULT_UPCOMING_WINDOW,
        }
    }
}

impl PipelineConfig {
    /// Environment first, then `--flag value` / `--flag=value` arguments.
    pub fn from_env_and_args(args: &[String]) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(dir) = env_string("RAW_DATA_DIR") {
            cfg.raw_dir = PathBuf::from(dir);
        }
        if let Some(db) = env_string("FEATURE_DB") {
            cfg.feature_db = PathBuf::from(db);
        }
        cfg.parallelism = env_parse("FEATURE_PARALLELISM")
            .unwrap_or(cfg.parallelism)
            .clamp(1, 32);
        cfg.upcoming_window = env_parse("UPCOMING_WINDOW")
            .unwrap_or(cfg.upcoming_window)
            .max(1);
        let seed = env_parse("LABEL_SEED").unwrap_or(42);
        let mut labels = env_string("LABEL_STRATEGY");

        if let Some(dir) = arg_value(args, "--raw") {
            cfg.raw_dir = PathBuf::from(dir);
        }
        if let Some(db) = arg_value(args, "--db") {
            cfg.feature_db = PathBuf::from(db);
        }
        if let Some(kind) = arg_value(args, "--labels") {
            labels = Some(kind);
        }
        cfg.labels = parse_label_source(labels.as_deref(), seed)?;
        Ok(cfg)
    }
}

pub fn parse_label_source(raw: Option<&str>, seed: u64) -> Result<LabelSource> {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("placeholder") | Some("random") => {
            Ok(LabelSource::Placeholder { seed })
        }
        Some("realized") | Some("actual") => Ok(LabelSource::Realized),
        Some(other) => Err(anyhow!(
            "unknown label strategy {other:?} (expected placeholder or realized)"
        )),
    }
}

pub fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(v) = arg.strip_prefix(&prefix) {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}
