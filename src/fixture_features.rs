use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::{NEUTRAL_STRENGTH, summarize_fixture_stats, summarize_team};
use crate::records::{FixtureRawRecord, NEUTRAL_DIFFICULTY, TeamRawRecord};

pub const LEAGUE_AVG_GOALS: f64 = 1.25;
pub const LEAGUE_SIZE: u32 = 20;
pub const POSITION_STRENGTH_FLOOR: f64 = 0.05;
/// Rank assumed for a team missing from the standings.
pub const MIDTABLE_RANK: u32 = 10;
pub const DERBY_CODE_DISTANCE: i64 = 3;

const CARDS_BASE: f64 = 1.5;
const CARDS_PER_DIFFICULTY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchResult {
    #[serde(rename = "H")]
    Home,
    #[serde(rename = "A")]
    Away,
    #[serde(rename = "D")]
    Draw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureFeatureSet {
    pub fixture_id: u32,
    pub event: Option<u32>,
    pub home_team: u32,
    pub away_team: u32,
    pub home_attack: f64,
    pub home_defence: f64,
    pub away_attack: f64,
    pub away_defence: f64,
    pub home_strength: f64,
    pub away_strength: f64,
    pub strength_difference: f64,
    pub home_expected_goals: f64,
    pub away_expected_goals: f64,
    pub expected_goals: f64,
    pub home_factor: f64,
    pub away_factor: f64,
    pub home_clean_sheet_probability: f64,
    pub away_clean_sheet_probability: f64,
    pub home_position_strength: f64,
    pub away_position_strength: f64,
    pub expected_cards: f64,
    pub is_derby: bool,
    pub finished: bool,
    // Always serialized, `null` until the fixture is finished.
    pub actual_result: Option<MatchResult>,
    pub actual_goals: Option<u32>,
    pub actual_cards: Option<u32>,
}

pub fn derive_fixture_features(
    fixture: &FixtureRawRecord,
    teams: &HashMap<u32, &TeamRawRecord>,
) -> FixtureFeatureSet {
    let home = teams.get(&fixture.team_h).copied();
    let away = teams.get(&fixture.team_a).copied();

    let home_attack = rating(home, |t| t.strength.attack_home);
    let home_defence = rating(home, |t| t.strength.defence_home);
    let away_attack = rating(away, |t| t.strength.attack_away);
    let away_defence = rating(away, |t| t.strength.defence_away);
    let home_strength = rating(home, |t| t.strength.overall_home);
    let away_strength = rating(away, |t| t.strength.overall_away);

    let home_expected_goals = directional_expected_goals(home_attack, away_defence);
    let away_expected_goals = directional_expected_goals(away_attack, home_defence);

    let (actual_result, actual_goals, actual_cards) = if fixture.finished {
        let totals = summarize_fixture_stats(fixture);
        // Own goals are a separate stat, so the scoreline wins when present.
        let goals = match (fixture.team_h_score, fixture.team_a_score) {
            (Some(h), Some(a)) => h + a,
            _ => totals.goals_scored.total().max(0) as u32,
        };
        let cards = (totals.yellow_cards.total() + totals.red_cards.total()).max(0) as u32;
        (Some(match_result(fixture)), Some(goals), Some(cards))
    } else {
        (None, None, None)
    };

    FixtureFeatureSet {
        fixture_id: fixture.id,
        event: fixture.event,
        home_team: fixture.team_h,
        away_team: fixture.team_a,
        home_attack,
        home_defence,
        away_attack,
        away_defence,
        home_strength,
        away_strength,
        strength_difference: home_strength - away_strength,
        home_expected_goals,
        away_expected_goals,
        expected_goals: home_expected_goals + away_expected_goals,
        home_factor: venue_factor(home, home_strength),
        away_factor: venue_factor(away, away_strength),
        home_clean_sheet_probability: expected_clean_sheet(away_expected_goals),
        away_clean_sheet_probability: expected_clean_sheet(home_expected_goals),
        home_position_strength: position_strength(team_rank(home)),
        away_position_strength: position_strength(team_rank(away)),
        expected_cards: expected_cards(fixture.team_h_difficulty, fixture.team_a_difficulty),
        is_derby: match (home, away) {
            (Some(h), Some(a)) => is_derby(h.code, a.code),
            _ => false,
        },
        finished: fixture.finished,
        actual_result,
        actual_goals,
        actual_cards,
    }
}

/// Goals expected across both directions of a fixture. Absent ratings sit at
/// the neutral baseline so each ratio stays near 1.
pub fn expected_goals(
    home_attack: Option<f64>,
    away_defence: Option<f64>,
    away_attack: Option<f64>,
    home_defence: Option<f64>,
) -> f64 {
    let or_neutral = |v: Option<f64>| v.unwrap_or(NEUTRAL_STRENGTH);
    directional_expected_goals(or_neutral(home_attack), or_neutral(away_defence))
        + directional_expected_goals(or_neutral(away_attack), or_neutral(home_defence))
}

pub fn directional_expected_goals(attack: f64, opponent_defence: f64) -> f64 {
    let defence = if opponent_defence == 0.0 {
        NEUTRAL_STRENGTH
    } else {
        opponent_defence
    };
    attack / defence * LEAGUE_AVG_GOALS
}

/// Poisson P(X = 0) for the goals the opponent is expected to score.
pub fn expected_clean_sheet(opponent_expected_goals: f64) -> f64 {
    (-opponent_expected_goals).exp()
}

/// League-table strength in [0.05, 1], rank 1 being strongest.
pub fn position_strength(rank: u32) -> f64 {
    let rank = rank.max(1) as f64;
    (1.0 - (rank - 1.0) / (LEAGUE_SIZE - 1) as f64).max(POSITION_STRENGTH_FLOOR)
}

/// Proximity heuristic on upstream team codes. It is not a curated rivalry
/// list and will both miss real derbies and flag unrelated pairs.
pub fn is_derby(home_code: i64, away_code: i64) -> bool {
    (home_code - away_code).abs() <= DERBY_CODE_DISTANCE
}

pub fn expected_cards(home_difficulty: Option<u8>, away_difficulty: Option<u8>) -> f64 {
    let h = home_difficulty.unwrap_or(NEUTRAL_DIFFICULTY) as f64;
    let a = away_difficulty.unwrap_or(NEUTRAL_DIFFICULTY) as f64;
    CARDS_BASE + CARDS_PER_DIFFICULTY * (h + a) / 2.0
}

pub fn match_result(fixture: &FixtureRawRecord) -> MatchResult {
    let totals = summarize_fixture_stats(fixture);
    let (h, a) = match (fixture.team_h_score, fixture.team_a_score) {
        (Some(h), Some(a)) => (h as i64, a as i64),
        _ => (totals.goals_scored.home, totals.goals_scored.away),
    };
    if h > a {
        MatchResult::Home
    } else if h < a {
        MatchResult::Away
    } else {
        MatchResult::Draw
    }
}

fn rating<F>(team: Option<&TeamRawRecord>, field: F) -> f64
where
    F: Fn(&TeamRawRecord) -> Option<f64>,
{
    team.and_then(field).unwrap_or(NEUTRAL_STRENGTH)
}

fn venue_factor(team: Option<&TeamRawRecord>, venue_strength: f64) -> f64 {
    let Some(team) = team else {
        return 1.0;
    };
    let avg = summarize_team(team).overall_avg;
    if avg == 0.0 {
        venue_strength
    } else {
        venue_strength / avg
    }
}

fn team_rank(team: Option<&TeamRawRecord>) -> u32 {
    team.and_then(|t| t.standing.position)
        .unwrap_or(MIDTABLE_RANK)
}
