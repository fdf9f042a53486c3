//! Strictly sequential stages. Within a stage the per-entity maps run on a
//! bounded rayon pool since no entity depends on another.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{LabelSource, PipelineConfig};
use crate::dataset::{
    LabelStrategy, PlaceholderLabel, RealizedPointsLabel, TrainingRow, assemble_training_set,
};
use crate::error::PipelineError;
use crate::feature_store::FeatureStore;
use crate::fixture_features::{FixtureFeatureSet, derive_fixture_features};
use crate::player_features::{PlayerFeatureSet, derive_player_features};
use crate::raw_store::RawRecordStore;
use crate::records::{TeamRawRecord, validate_fixtures, validate_players};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureStageSummary {
    pub players: usize,
    pub fixtures: usize,
    pub teams: usize,
    pub dropped_games: usize,
    pub dropped_fixtures: usize,
    pub duplicate_ids: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyStageSummary {
    pub players: usize,
    pub fixtures: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub features: FeatureStageSummary,
    pub assembly: AssemblyStageSummary,
}

pub const FEATURE_STAGE: &str = "features";
pub const ASSEMBLY_STAGE: &str = "assembly";

pub fn run_feature_stage(
    raw: &dyn RawRecordStore,
    store: &dyn FeatureStore,
    cfg: &PipelineConfig,
) -> Result<FeatureStageSummary, PipelineError> {
    let run_id = store
        .begin_run(FEATURE_STAGE)
        .map_err(PipelineError::store("begin feature run"))?;
    info!(run_id, "feature stage: reading raw records");
    let mut players = raw
        .player_records()
        .map_err(PipelineError::raw("players"))?;
    let mut fixtures = raw
        .fixture_records()
        .map_err(PipelineError::raw("fixtures"))?;
    let teams = raw.team_records().map_err(PipelineError::raw("teams"))?;

    let player_report = validate_players(&mut players);
    let fixture_report = validate_fixtures(&mut fixtures);
    if player_report.dropped_games > 0 {
        warn!(
            dropped = player_report.dropped_games,
            "dropped game entries without a positive round"
        );
    }
    let duplicate_ids = player_report.duplicate_ids + fixture_report.duplicate_ids;
    if duplicate_ids > 0 {
        warn!(
            players = player_report.duplicate_ids,
            fixtures = fixture_report.duplicate_ids,
            "dropped records with a repeated id, keeping the last"
        );
    }
    if fixture_report.dropped_fixtures > 0 {
        warn!(
            dropped = fixture_report.dropped_fixtures,
            "dropped fixtures pairing a team with itself"
        );
    }

    let team_index: HashMap<u32, &TeamRawRecord> = teams.iter().map(|t| (t.id, t)).collect();
    let window = cfg.upcoming_window;

    let (player_features, fixture_features) = with_pool(cfg.parallelism, || {
        let p: Vec<PlayerFeatureSet> = players
            .par_iter()
            .map(|p| derive_player_features(p, &team_index, window))
            .collect();
        let f: Vec<FixtureFeatureSet> = fixtures
            .par_iter()
            .map(|f| derive_fixture_features(f, &team_index))
            .collect();
        (p, f)
    });
    debug!(
        players = player_features.len(),
        fixtures = fixture_features.len(),
        "features derived"
    );

    store
        .write_player_features(&player_features)
        .map_err(PipelineError::store("write player features"))?;
    info!(rows = player_features.len(), "player features committed");
    store
        .write_fixture_features(&fixture_features)
        .map_err(PipelineError::store("write fixture features"))?;
    info!(rows = fixture_features.len(), "fixture features committed");
    store
        .finish_run(run_id, player_features.len() + fixture_features.len())
        .map_err(PipelineError::store("finish feature run"))?;

    Ok(FeatureStageSummary {
        players: player_features.len(),
        fixtures: fixture_features.len(),
        teams: teams.len(),
        dropped_games: player_report.dropped_games,
        dropped_fixtures: fixture_report.dropped_fixtures,
        duplicate_ids,
    })
}

pub fn run_assembly_stage(
    store: &dyn FeatureStore,
    labels: &dyn LabelStrategy,
    cfg: &PipelineConfig,
) -> Result<(AssemblyStageSummary, Vec<TrainingRow>), PipelineError> {
    let run_id = store
        .begin_run(ASSEMBLY_STAGE)
        .map_err(PipelineError::store("begin assembly run"))?;
    info!(
        run_id,
        labels = labels.name(),
        "assembly stage: reading feature store"
    );
    let players = store
        .read_player_features()
        .map_err(PipelineError::store("read player features"))?;
    let fixtures = store
        .read_fixture_features()
        .map_err(PipelineError::store("read fixture features"))?;

    let rows = with_pool(cfg.parallelism, || {
        assemble_training_set(&players, &fixtures, labels)
    });
    store
        .write_training_rows(&rows)
        .map_err(PipelineError::store("write training rows"))?;
    info!(rows = rows.len(), "training rows committed");
    store
        .finish_run(run_id, rows.len())
        .map_err(PipelineError::store("finish assembly run"))?;

    Ok((
        AssemblyStageSummary {
            players: players.len(),
            fixtures: fixtures.len(),
            rows: rows.len(),
        },
        rows,
    ))
}

/// Builds the label strategy the config asks for. Realized labels need the
/// raw histories, so this reads players again.
pub fn label_strategy(
    cfg: &PipelineConfig,
    raw: &dyn RawRecordStore,
) -> Result<Box<dyn LabelStrategy>, PipelineError> {
    match cfg.labels {
        LabelSource::Placeholder { seed } => {
            warn!("training labels are placeholder draws, not realized outcomes");
            Ok(Box::new(PlaceholderLabel { seed }))
        }
        LabelSource::Realized => {
            let players = raw
                .player_records()
                .map_err(PipelineError::raw("players"))?;
            let labels = RealizedPointsLabel::from_records(&players);
            info!(pairs = labels.len(), "realized labels loaded");
            Ok(Box::new(labels))
        }
    }
}

pub fn run_pipeline(
    raw: &dyn RawRecordStore,
    store: &dyn FeatureStore,
    cfg: &PipelineConfig,
) -> Result<PipelineSummary, PipelineError> {
    let features = run_feature_stage(raw, store, cfg)?;
    let labels = label_strategy(cfg, raw)?;
    let (assembly, _) = run_assembly_stage(store, labels.as_ref(), cfg)?;
    Ok(PipelineSummary { features, assembly })
}

fn with_pool<T>(threads: usize, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(action),
        Err(err) => {
            warn!("falling back to the global rayon pool: {err}");
            action()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;

    use super::*;
    use crate::feature_store::{MemoryFeatureStore, PipelineRun, SqliteFeatureStore};
    use crate::raw_store::MemoryRecordStore;
    use crate::records::{FixtureRawRecord, PlayerRawRecord};

    struct Unreachable;

    impl RawRecordStore for Unreachable {
        fn player_records(&self) -> anyhow::Result<Vec<PlayerRawRecord>> {
            Err(anyhow!("connection refused"))
        }
        fn fixture_records(&self) -> anyhow::Result<Vec<FixtureRawRecord>> {
            Ok(Vec::new())
        }
        fn team_records(&self) -> anyhow::Result<Vec<TeamRawRecord>> {
            Ok(Vec::new())
        }
    }

    /// Memory store that fails one named operation and logs every call.
    struct FailingStore {
        fail_on: &'static str,
        inner: MemoryFeatureStore,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FailingStore {
        fn new(fail_on: &'static str) -> Self {
            Self {
                fail_on,
                inner: MemoryFeatureStore::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn step(&self, op: &'static str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(op);
            if op == self.fail_on {
                return Err(anyhow!("disk I/O error"));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl FeatureStore for FailingStore {
        fn write_player_features(&self, rows: &[PlayerFeatureSet]) -> anyhow::Result<()> {
            self.step("write players")?;
            self.inner.write_player_features(rows)
        }
        fn write_fixture_features(&self, rows: &[FixtureFeatureSet]) -> anyhow::Result<()> {
            self.step("write fixtures")?;
            self.inner.write_fixture_features(rows)
        }
        fn write_training_rows(&self, rows: &[TrainingRow]) -> anyhow::Result<()> {
            self.step("write rows")?;
            self.inner.write_training_rows(rows)
        }
        fn read_player_features(&self) -> anyhow::Result<Vec<PlayerFeatureSet>> {
            self.step("read players")?;
            self.inner.read_player_features()
        }
        fn read_fixture_features(&self) -> anyhow::Result<Vec<FixtureFeatureSet>> {
            self.step("read fixtures")?;
            self.inner.read_fixture_features()
        }
        fn read_training_rows(&self) -> anyhow::Result<Vec<TrainingRow>> {
            self.step("read rows")?;
            self.inner.read_training_rows()
        }
        fn begin_run(&self, stage: &str) -> anyhow::Result<i64> {
            self.step("begin run")?;
            self.inner.begin_run(stage)
        }
        fn finish_run(&self, run_id: i64, rows_written: usize) -> anyhow::Result<()> {
            self.step("finish run")?;
            self.inner.finish_run(run_id, rows_written)
        }
        fn pipeline_runs(&self) -> anyhow::Result<Vec<PipelineRun>> {
            self.inner.pipeline_runs()
        }
    }

    fn small_raw() -> MemoryRecordStore {
        MemoryRecordStore {
            players: serde_json::from_str(r#"[{"id":1},{"id":2},{"id":3}]"#).unwrap(),
            fixtures: serde_json::from_str(
                r#"[{"id":10,"team_h":1,"team_a":2},{"id":11,"team_h":2,"team_a":1}]"#,
            )
            .unwrap(),
            teams: Vec::new(),
        }
    }

    fn cfg() -> PipelineConfig {
        PipelineConfig {
            parallelism: 2,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn unreachable_raw_store_aborts_stage() {
        let store = MemoryFeatureStore::new();
        let err = run_feature_stage(&Unreachable, &store, &cfg()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RawStoreUnavailable {
                collection: "players",
                ..
            }
        ));
        assert!(store.read_player_features().unwrap().is_empty());
    }

    #[test]
    fn empty_inputs_produce_empty_outputs() {
        let store = MemoryFeatureStore::new();
        let summary = run_pipeline(&MemoryRecordStore::default(), &store, &cfg()).unwrap();
        assert_eq!(summary.assembly.rows, 0);
        assert!(store.read_training_rows().unwrap().is_empty());
    }

    #[test]
    fn cross_join_size() {
        let raw = small_raw();
        let store = MemoryFeatureStore::new();
        let summary = run_pipeline(&raw, &store, &cfg()).unwrap();
        assert_eq!(summary.features.players, 3);
        assert_eq!(summary.assembly.rows, 6);
    }

    #[test]
    fn feature_write_failure_aborts_stage() {
        let store = FailingStore::new("write players");
        let err = run_feature_stage(&small_raw(), &store, &cfg()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::FeatureStoreUnavailable {
                operation: "write player features",
                ..
            }
        ));
        assert_eq!(store.calls(), vec!["begin run", "write players"]);
        assert!(store.inner.read_fixture_features().unwrap().is_empty());
        let runs = store.pipeline_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].finished_at.is_none());
    }

    #[test]
    fn feature_read_failure_aborts_assembly() {
        let store = FailingStore::new("read fixtures");
        run_feature_stage(&small_raw(), &store, &cfg()).unwrap();
        let err = run_assembly_stage(&store, &PlaceholderLabel { seed: 1 }, &cfg()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::FeatureStoreUnavailable {
                operation: "read fixture features",
                ..
            }
        ));
        let calls = store.calls();
        assert_eq!(calls.last(), Some(&"read fixtures"));
        assert!(!calls.contains(&"write rows"));
        assert!(store.inner.read_training_rows().unwrap().is_empty());
    }

    #[test]
    fn each_stage_is_logged_with_its_counts() {
        let store = MemoryFeatureStore::new();
        run_pipeline(&small_raw(), &store, &cfg()).unwrap();
        let runs = store.pipeline_runs().unwrap();
        let logged: Vec<(&str, usize)> = runs
            .iter()
            .map(|r| (r.stage.as_str(), r.rows_written))
            .collect();
        assert_eq!(logged, vec![(FEATURE_STAGE, 5), (ASSEMBLY_STAGE, 6)]);
        assert!(runs.iter().all(|r| r.finished_at.is_some()));
    }

    #[test]
    fn repeated_ids_do_not_abort_sqlite_stage() {
        let raw = MemoryRecordStore {
            players: serde_json::from_str(r#"[{"id":1},{"id":1}]"#).unwrap(),
            ..MemoryRecordStore::default()
        };
        let store = SqliteFeatureStore::open_in_memory().unwrap();
        let summary = run_feature_stage(&raw, &store, &cfg()).unwrap();
        assert_eq!(summary.players, 1);
        assert_eq!(summary.duplicate_ids, 1);
        assert_eq!(store.read_player_features().unwrap().len(), 1);
    }
}
