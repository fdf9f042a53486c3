use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Difficulty assumed when a game or fixture carries none.
pub const NEUTRAL_DIFFICULTY: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Position {
    #[serde(alias = "GK")]
    Gkp,
    Def,
    #[default]
    Mid,
    Fwd,
}

impl Position {
    pub fn concedes_clean_sheets(self) -> bool {
        !matches!(self, Position::Fwd)
    }

    pub fn is_goalkeeper(self) -> bool {
        matches!(self, Position::Gkp)
    }
}

/// One completed match for a player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEntry {
    pub round: u32,
    #[serde(default)]
    pub fixture: Option<u32>,
    #[serde(default)]
    pub minutes: u32,
    #[serde(default)]
    pub total_points: i32,
    #[serde(default)]
    pub goals_scored: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default)]
    pub clean_sheets: u32,
    #[serde(default)]
    pub goals_conceded: u32,
    #[serde(default)]
    pub saves: u32,
    #[serde(default)]
    pub bonus: u32,
    #[serde(default)]
    pub yellow_cards: u32,
    #[serde(default)]
    pub red_cards: u32,
    // Upstream ships these as decimal strings ("0.43").
    #[serde(default)]
    pub expected_goals: Option<String>,
    #[serde(default)]
    pub expected_assists: Option<String>,
    #[serde(default)]
    pub expected_goal_involvements: Option<String>,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub was_home: bool,
    #[serde(default)]
    pub difficulty: Option<u8>,
}

impl GameEntry {
    pub fn difficulty_or_neutral(&self) -> u8 {
        self.difficulty.unwrap_or(NEUTRAL_DIFFICULTY)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpcomingFixture {
    #[serde(default)]
    pub fixture: Option<u32>,
    #[serde(default)]
    pub event: Option<u32>,
    #[serde(default = "neutral_difficulty")]
    pub difficulty: u8,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriorSeason {
    #[serde(default)]
    pub total_points: i32,
    #[serde(default)]
    pub starts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRawRecord {
    pub id: u32,
    #[serde(default)]
    pub web_name: String,
    #[serde(default)]
    pub team: Option<u32>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub history: Vec<GameEntry>,
    #[serde(default)]
    pub upcoming: Vec<UpcomingFixture>,
    #[serde(default)]
    pub prior_season: Option<PriorSeason>,
    #[serde(default)]
    pub now_cost: f64,
    #[serde(default)]
    pub selected_by_percent: Option<String>,
    #[serde(default)]
    pub form: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TeamStanding {
    #[serde(default)]
    pub played: u32,
    #[serde(default)]
    pub win: u32,
    #[serde(default)]
    pub draw: u32,
    #[serde(default)]
    pub loss: u32,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub position: Option<u32>,
}

/// Strength ratings as published upstream; any of them may be missing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TeamStrength {
    #[serde(default)]
    pub overall_home: Option<f64>,
    #[serde(default)]
    pub overall_away: Option<f64>,
    #[serde(default)]
    pub attack_home: Option<f64>,
    #[serde(default)]
    pub attack_away: Option<f64>,
    #[serde(default)]
    pub defence_home: Option<f64>,
    #[serde(default)]
    pub defence_away: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRawRecord {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub standing: TeamStanding,
    #[serde(default)]
    pub strength: TeamStrength,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatValue {
    pub element: u32,
    #[serde(default)]
    pub value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatEntry {
    pub identifier: String,
    #[serde(default)]
    pub h: Vec<StatValue>,
    #[serde(default)]
    pub a: Vec<StatValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureRawRecord {
    pub id: u32,
    #[serde(default)]
    pub event: Option<u32>,
    pub team_h: u32,
    pub team_a: u32,
    #[serde(default)]
    pub team_h_difficulty: Option<u8>,
    #[serde(default)]
    pub team_a_difficulty: Option<u8>,
    #[serde(default)]
    pub team_h_score: Option<u32>,
    #[serde(default)]
    pub team_a_score: Option<u32>,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub stats: Vec<StatEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub dropped_games: usize,
    pub dropped_fixtures: usize,
    pub duplicate_ids: usize,
}

/// Enforces the per-player ordering invariant: rounds are positive and
/// history runs oldest to newest. A repeated player id keeps its last record.
pub fn validate_players(players: &mut Vec<PlayerRawRecord>) -> ValidationReport {
    let mut report = ValidationReport {
        duplicate_ids: keep_last_by_id(players, |p| p.id),
        ..ValidationReport::default()
    };
    for player in players.iter_mut() {
        let before = player.history.len();
        player.history.retain(|g| g.round > 0);
        report.dropped_games += before - player.history.len();
        player.history.sort_by_key(|g| g.round);
    }
    report
}

pub fn validate_fixtures(fixtures: &mut Vec<FixtureRawRecord>) -> ValidationReport {
    let duplicate_ids = keep_last_by_id(fixtures, |f| f.id);
    let before = fixtures.len();
    fixtures.retain(|f| f.team_h != f.team_a);
    ValidationReport {
        dropped_games: 0,
        dropped_fixtures: before - fixtures.len(),
        duplicate_ids,
    }
}

/// Drops every record whose id appears again later, keeping input order
/// otherwise. Returns how many were dropped.
fn keep_last_by_id<T>(items: &mut Vec<T>, id: impl Fn(&T) -> u32) -> usize {
    let last: HashMap<u32, usize> = items
        .iter()
        .enumerate()
        .map(|(idx, item)| (id(item), idx))
        .collect();
    let before = items.len();
    let mut idx = 0usize;
    items.retain(|item| {
        let keep = last.get(&id(item)) == Some(&idx);
        idx += 1;
        keep
    });
    before - items.len()
}

/// Lenient numeric parse for upstream decimal strings. Anything that does
/// not parse reads as zero.
pub fn parse_decimal(raw: Option<&str>) -> f64 {
    let Some(raw) = raw else {
        return 0.0;
    };
    let s = raw.trim();
    if s.is_empty() || s == "-" {
        return 0.0;
    }
    let s = s.trim_end_matches('%').replace(',', "");
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn neutral_difficulty() -> u8 {
    NEUTRAL_DIFFICULTY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_decimal_is_lenient() {
        assert_eq!(parse_decimal(Some("0.43")), 0.43);
        assert_eq!(parse_decimal(Some(" 12.5% ")), 12.5);
        assert_eq!(parse_decimal(Some("n/a")), 0.0);
        assert_eq!(parse_decimal(Some("NaN")), 0.0);
        assert_eq!(parse_decimal(None), 0.0);
    }

    #[test]
    fn player_defaults_fill_missing_fields() {
        let raw = r#"{"id":7,"history":[{"round":1}],"upcoming":[{}]}"#;
        let player: PlayerRawRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(player.position, Position::Mid);
        assert_eq!(player.history[0].minutes, 0);
        assert_eq!(player.history[0].difficulty_or_neutral(), NEUTRAL_DIFFICULTY);
        assert_eq!(player.upcoming[0].difficulty, NEUTRAL_DIFFICULTY);
        assert!(player.prior_season.is_none());
    }

    #[test]
    fn validation_drops_round_zero_and_sorts() {
        let raw = r#"{"id":1,"history":[{"round":3},{"round":0},{"round":1}]}"#;
        let mut players = vec![serde_json::from_str::<PlayerRawRecord>(raw).unwrap()];
        let report = validate_players(&mut players);
        assert_eq!(report.dropped_games, 1);
        let rounds: Vec<u32> = players[0].history.iter().map(|g| g.round).collect();
        assert_eq!(rounds, vec![1, 3]);
    }

    #[test]
    fn validation_drops_self_fixtures() {
        let raw = r#"[{"id":1,"team_h":2,"team_a":2},{"id":2,"team_h":2,"team_a":3}]"#;
        let mut fixtures: Vec<FixtureRawRecord> = serde_json::from_str(raw).unwrap();
        let report = validate_fixtures(&mut fixtures);
        assert_eq!(report.dropped_fixtures, 1);
        assert_eq!(fixtures.len(), 1);
    }

    #[test]
    fn repeated_ids_keep_last_record() {
        let raw = r#"[{"id":1,"web_name":"first"},{"id":2},{"id":1,"web_name":"second"}]"#;
        let mut players: Vec<PlayerRawRecord> = serde_json::from_str(raw).unwrap();
        let report = validate_players(&mut players);
        assert_eq!(report.duplicate_ids, 1);
        let ids: Vec<u32> = players.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(players[1].web_name, "second");

        let raw = r#"[{"id":5,"team_h":1,"team_a":2},{"id":5,"team_h":3,"team_a":4}]"#;
        let mut fixtures: Vec<FixtureRawRecord> = serde_json::from_str(raw).unwrap();
        let report = validate_fixtures(&mut fixtures);
        assert_eq!(report.duplicate_ids, 1);
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].team_h, 3);
    }

    #[test]
    fn position_accepts_gk_alias() {
        let p: Position = serde_json::from_str("\"GK\"").unwrap();
        assert_eq!(p, Position::Gkp);
        assert!(p.is_goalkeeper());
        assert!(!Position::Fwd.concedes_clean_sheets());
    }
}
