use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use crate::records::{FixtureRawRecord, PlayerRawRecord, TeamRawRecord};

pub const PLAYERS_FILE: &str = "players.json";
pub const FIXTURES_FILE: &str = "fixtures.json";
pub const TEAMS_FILE: &str = "teams.json";

/// Read-only source of unprocessed records.
pub trait RawRecordStore {
    fn player_records(&self) -> Result<Vec<PlayerRawRecord>>;
    fn fixture_records(&self) -> Result<Vec<FixtureRawRecord>>;
    fn team_records(&self) -> Result<Vec<TeamRawRecord>>;
}

/// A directory holding one JSON array per collection, as left behind by the
/// acquisition job.
#[derive(Debug, Clone)]
pub struct JsonRecordStore {
    dir: PathBuf,
}

impl JsonRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.dir.join(file);
        let raw =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        // An upstream `null` means an empty collection, not a broken one.
        let parsed = serde_json::from_str::<Option<Vec<T>>>(&raw)
            .with_context(|| format!("parse {}", path.display()))?;
        Ok(parsed.unwrap_or_default())
    }
}

impl RawRecordStore for JsonRecordStore {
    fn player_records(&self) -> Result<Vec<PlayerRawRecord>> {
        self.load(PLAYERS_FILE)
    }

    fn fixture_records(&self) -> Result<Vec<FixtureRawRecord>> {
        self.load(FIXTURES_FILE)
    }

    fn team_records(&self) -> Result<Vec<TeamRawRecord>> {
        self.load(TEAMS_FILE)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    pub players: Vec<PlayerRawRecord>,
    pub fixtures: Vec<FixtureRawRecord>,
    pub teams: Vec<TeamRawRecord>,
}

impl RawRecordStore for MemoryRecordStore {
    fn player_records(&self) -> Result<Vec<PlayerRawRecord>> {
        Ok(self.players.clone())
    }

    fn fixture_records(&self) -> Result<Vec<FixtureRawRecord>> {
        Ok(self.fixtures.clone())
    }

    fn team_records(&self) -> Result<Vec<TeamRawRecord>> {
        Ok(self.teams.clone())
    }
}
