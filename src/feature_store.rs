use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, params};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dataset::TrainingRow;
use crate::fixture_features::FixtureFeatureSet;
use crate::player_features::PlayerFeatureSet;

/// Persisted engineered features. Every write replaces the whole collection.
pub trait FeatureStore {
    fn write_player_features(&self, rows: &[PlayerFeatureSet]) -> Result<()>;
    fn write_fixture_features(&self, rows: &[FixtureFeatureSet]) -> Result<()>;
    fn write_training_rows(&self, rows: &[TrainingRow]) -> Result<()>;
    fn read_player_features(&self) -> Result<Vec<PlayerFeatureSet>>;
    fn read_fixture_features(&self) -> Result<Vec<FixtureFeatureSet>>;
    fn read_training_rows(&self) -> Result<Vec<TrainingRow>>;

    /// Opens a run-log entry for `stage` and returns its id.
    fn begin_run(&self, stage: &str) -> Result<i64>;
    fn finish_run(&self, run_id: i64, rows_written: usize) -> Result<()>;
    fn pipeline_runs(&self) -> Result<Vec<PipelineRun>>;
}

/// One stage execution. `finished_at` stays empty when the stage aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: i64,
    pub stage: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub rows_written: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Players,
    Fixtures,
    TrainingRows,
}

impl Collection {
    fn table(self) -> &'static str {
        match self {
            Collection::Players => "player_features",
            Collection::Fixtures => "fixture_features",
            Collection::TrainingRows => "training_rows",
        }
    }

    fn staging(self) -> &'static str {
        match self {
            Collection::Players => "player_features_staging",
            Collection::Fixtures => "fixture_features_staging",
            Collection::TrainingRows => "training_rows_staging",
        }
    }
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join("features.sqlite"))
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join("fpl_xpoints"));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join("fpl_xpoints"))
}

pub struct SqliteFeatureStore {
    conn: Mutex<Connection>,
}

impl SqliteFeatureStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open sqlite db {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("feature store connection lock poisoned"))
    }

    /// Phase one fills the staging table; phase two swaps it into the live
    /// table in a single transaction. A failure before the swap commits leaves
    /// the live rows as they were.
    fn replace<T: Serialize>(
        &self,
        collection: Collection,
        rows: impl Iterator<Item = (String, T)>,
    ) -> Result<usize> {
        let mut conn = self.lock()?;
        let staging = collection.staging();
        let live = collection.table();

        let tx = conn.transaction().context("begin staging transaction")?;
        tx.execute(&format!("DELETE FROM {staging}"), [])
            .with_context(|| format!("clear {staging}"))?;
        let mut written = 0usize;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {staging}(entity_key, seq, doc) VALUES (?1, ?2, ?3)"
                ))
                .with_context(|| format!("prepare insert into {staging}"))?;
            for (seq, (key, row)) in rows.enumerate() {
                let doc = serde_json::to_string(&row).context("serialize feature row")?;
                stmt.execute(params![key, seq as i64, doc])
                    .with_context(|| format!("insert {key} into {staging}"))?;
                written += 1;
            }
        }
        tx.commit().context("commit staging transaction")?;

        let tx = conn.transaction().context("begin swap transaction")?;
        tx.execute(&format!("DELETE FROM {live}"), [])
            .with_context(|| format!("clear {live}"))?;
        tx.execute(
            &format!(
                "INSERT INTO {live}(entity_key, seq, doc) SELECT entity_key, seq, doc FROM {staging}"
            ),
            [],
        )
        .with_context(|| format!("swap {staging} into {live}"))?;
        tx.execute(&format!("DELETE FROM {staging}"), [])
            .with_context(|| format!("clear {staging}"))?;
        tx.commit().context("commit swap transaction")?;
        Ok(written)
    }

    fn load<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
        let conn = self.lock()?;
        let live = collection.table();
        let mut stmt = conn
            .prepare(&format!("SELECT doc FROM {live} ORDER BY seq ASC"))
            .with_context(|| format!("prepare load {live}"))?;
        let docs = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .with_context(|| format!("query {live}"))?;

        let mut out = Vec::new();
        for doc in docs {
            let doc = doc.with_context(|| format!("decode {live} row"))?;
            out.push(serde_json::from_str(&doc).with_context(|| format!("parse {live} doc"))?);
        }
        Ok(out)
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    let mut ddl = String::from("PRAGMA journal_mode = WAL;\n");
    for collection in [
        Collection::Players,
        Collection::Fixtures,
        Collection::TrainingRows,
    ] {
        for table in [collection.table(), collection.staging()] {
            ddl.push_str(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    entity_key TEXT PRIMARY KEY,
                    seq INTEGER NOT NULL,
                    doc TEXT NOT NULL
                );\n"
            ));
        }
    }
    ddl.push_str(
        "CREATE TABLE IF NOT EXISTS pipeline_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            stage TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            rows_written INTEGER NOT NULL
        );",
    );
    conn.execute_batch(&ddl).context("create sqlite schema")?;
    Ok(())
}

impl FeatureStore for SqliteFeatureStore {
    fn write_player_features(&self, rows: &[PlayerFeatureSet]) -> Result<()> {
        let mut sorted: Vec<&PlayerFeatureSet> = rows.iter().collect();
        sorted.sort_by_key(|r| r.player_id);
        self.replace(
            Collection::Players,
            sorted.into_iter().map(|r| (r.player_id.to_string(), r)),
        )?;
        Ok(())
    }

    fn write_fixture_features(&self, rows: &[FixtureFeatureSet]) -> Result<()> {
        let mut sorted: Vec<&FixtureFeatureSet> = rows.iter().collect();
        sorted.sort_by_key(|r| r.fixture_id);
        self.replace(
            Collection::Fixtures,
            sorted.into_iter().map(|r| (r.fixture_id.to_string(), r)),
        )?;
        Ok(())
    }

    fn write_training_rows(&self, rows: &[TrainingRow]) -> Result<()> {
        self.replace(
            Collection::TrainingRows,
            rows.iter()
                .map(|r| (format!("{}:{}", r.player_id, r.fixture_id), r)),
        )?;
        Ok(())
    }

    fn read_player_features(&self) -> Result<Vec<PlayerFeatureSet>> {
        self.load(Collection::Players)
    }

    fn read_fixture_features(&self) -> Result<Vec<FixtureFeatureSet>> {
        self.load(Collection::Fixtures)
    }

    fn read_training_rows(&self) -> Result<Vec<TrainingRow>> {
        self.load(Collection::TrainingRows)
    }

    fn begin_run(&self, stage: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pipeline_runs(stage, started_at, finished_at, rows_written)
             VALUES (?1, ?2, NULL, 0)",
            params![stage, Utc::now().to_rfc3339()],
        )
        .context("insert pipeline run")?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_run(&self, run_id: i64, rows_written: usize) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE pipeline_runs SET finished_at = ?1, rows_written = ?2 WHERE run_id = ?3",
                params![Utc::now().to_rfc3339(), rows_written as i64, run_id],
            )
            .context("update pipeline run")?;
        if updated == 0 {
            return Err(anyhow!("no pipeline run {run_id}"));
        }
        Ok(())
    }

    fn pipeline_runs(&self) -> Result<Vec<PipelineRun>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT run_id, stage, started_at, finished_at, rows_written
                 FROM pipeline_runs ORDER BY run_id ASC",
            )
            .context("prepare load pipeline_runs")?;
        let runs = stmt
            .query_map([], |row| {
                Ok(PipelineRun {
                    run_id: row.get(0)?,
                    stage: row.get(1)?,
                    started_at: row.get(2)?,
                    finished_at: row.get(3)?,
                    rows_written: row.get::<_, i64>(4)?.max(0) as usize,
                })
            })
            .context("query pipeline_runs")?;
        let mut out = Vec::new();
        for run in runs {
            out.push(run.context("decode pipeline_runs row")?);
        }
        Ok(out)
    }
}

/// In-process store for tests and dry runs. Each write builds the new
/// collection aside and swaps it in under the lock.
#[derive(Debug, Default)]
pub struct MemoryFeatureStore {
    players: Mutex<Vec<PlayerFeatureSet>>,
    fixtures: Mutex<Vec<FixtureFeatureSet>>,
    training: Mutex<Vec<TrainingRow>>,
    runs: Mutex<Vec<PipelineRun>>,
}

impl MemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn swap_in<T: Clone>(slot: &Mutex<Vec<T>>, rows: Vec<T>) -> Result<()> {
    let mut guard = slot
        .lock()
        .map_err(|_| anyhow!("memory feature store lock poisoned"))?;
    *guard = rows;
    Ok(())
}

fn snapshot<T: Clone>(slot: &Mutex<Vec<T>>) -> Result<Vec<T>> {
    let guard = slot
        .lock()
        .map_err(|_| anyhow!("memory feature store lock poisoned"))?;
    Ok(guard.clone())
}

impl FeatureStore for MemoryFeatureStore {
    fn write_player_features(&self, rows: &[PlayerFeatureSet]) -> Result<()> {
        let mut staged = rows.to_vec();
        staged.sort_by_key(|r| r.player_id);
        swap_in(&self.players, staged)
    }

    fn write_fixture_features(&self, rows: &[FixtureFeatureSet]) -> Result<()> {
        let mut staged = rows.to_vec();
        staged.sort_by_key(|r| r.fixture_id);
        swap_in(&self.fixtures, staged)
    }

    fn write_training_rows(&self, rows: &[TrainingRow]) -> Result<()> {
        swap_in(&self.training, rows.to_vec())
    }

    fn read_player_features(&self) -> Result<Vec<PlayerFeatureSet>> {
        snapshot(&self.players)
    }

    fn read_fixture_features(&self) -> Result<Vec<FixtureFeatureSet>> {
        snapshot(&self.fixtures)
    }

    fn read_training_rows(&self) -> Result<Vec<TrainingRow>> {
        snapshot(&self.training)
    }

    fn begin_run(&self, stage: &str) -> Result<i64> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| anyhow!("memory feature store lock poisoned"))?;
        let run_id = runs.len() as i64 + 1;
        runs.push(PipelineRun {
            run_id,
            stage: stage.to_string(),
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
            rows_written: 0,
        });
        Ok(run_id)
    }

    fn finish_run(&self, run_id: i64, rows_written: usize) -> Result<()> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| anyhow!("memory feature store lock poisoned"))?;
        let run = runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| anyhow!("no pipeline run {run_id}"))?;
        run.finished_at = Some(Utc::now().to_rfc3339());
        run.rows_written = rows_written;
        Ok(())
    }

    fn pipeline_runs(&self) -> Result<Vec<PipelineRun>> {
        snapshot(&self.runs)
    }
}
