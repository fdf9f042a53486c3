//! Reductions from raw per-game and per-fixture records into per-entity
//! summary scalars. Every aggregate has a zero default; nothing here fails.

use crate::records::{
    FixtureRawRecord, GameEntry, PlayerRawRecord, StatEntry, TeamRawRecord, parse_decimal,
};

/// Strength assumed for any rating the upstream feed leaves out.
pub const NEUTRAL_STRENGTH: f64 = 1000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerSummary {
    pub games: usize,
    pub total_points: f64,
    pub minutes: f64,
    pub goals: f64,
    pub assists: f64,
    pub clean_sheets: f64,
    pub goals_conceded: f64,
    pub saves: f64,
    pub bonus: f64,
    pub points_per_game: f64,
    pub minutes_per_game: f64,
    pub goals_per_game: f64,
    pub assists_per_game: f64,
    pub expected_goals: f64,
    pub expected_assists: f64,
    pub expected_goal_involvements: f64,
    /// Current per-game average over last season's; 1 without a prior season.
    pub previous_season_relative: f64,
}

pub fn summarize_player(player: &PlayerRawRecord) -> PlayerSummary {
    let history = &player.history;
    let games = history.len();

    let mut out = PlayerSummary {
        games,
        ..Default::default()
    };
    for g in history {
        out.total_points += g.total_points as f64;
        out.minutes += g.minutes as f64;
        out.goals += g.goals_scored as f64;
        out.assists += g.assists as f64;
        out.clean_sheets += g.clean_sheets as f64;
        out.goals_conceded += g.goals_conceded as f64;
        out.saves += g.saves as f64;
        out.bonus += g.bonus as f64;
    }

    out.points_per_game = per_game(out.total_points, games);
    out.minutes_per_game = per_game(out.minutes, games);
    out.goals_per_game = per_game(out.goals, games);
    out.assists_per_game = per_game(out.assists, games);

    out.expected_goals = mean_parsed(history, |g| g.expected_goals.as_deref());
    out.expected_assists = mean_parsed(history, |g| g.expected_assists.as_deref());
    out.expected_goal_involvements =
        mean_parsed(history, |g| g.expected_goal_involvements.as_deref());

    out.previous_season_relative = match prior_season_average(player) {
        Some(prior) if prior != 0.0 => out.points_per_game / prior,
        _ => 1.0,
    };
    out
}

/// Last season's points per start, or `None` when no prior points exist.
pub fn prior_season_average(player: &PlayerRawRecord) -> Option<f64> {
    let prior = player.prior_season?;
    if prior.total_points == 0 {
        return None;
    }
    Some(prior.total_points as f64 / prior.starts.max(1) as f64)
}

/// Sum over `games`, divided by the game count; zero for an empty history.
pub fn per_game(total: f64, games: usize) -> f64 {
    if games == 0 {
        0.0
    } else {
        total / games as f64
    }
}

fn mean_parsed<'a, F>(history: &'a [GameEntry], field: F) -> f64
where
    F: Fn(&'a GameEntry) -> Option<&'a str>,
{
    let total: f64 = history.iter().map(|g| parse_decimal(field(g))).sum();
    per_game(total, history.len())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeamSummary {
    pub overall_avg: f64,
    pub overall_bias: f64,
    pub attack_avg: f64,
    pub attack_bias: f64,
    pub defence_avg: f64,
    pub defence_bias: f64,
}

pub fn summarize_team(team: &TeamRawRecord) -> TeamSummary {
    let s = &team.strength;
    let pair = |home: Option<f64>, away: Option<f64>| {
        let h = home.unwrap_or(NEUTRAL_STRENGTH);
        let a = away.unwrap_or(NEUTRAL_STRENGTH);
        ((h + a) / 2.0, h - a)
    };
    let (overall_avg, overall_bias) = pair(s.overall_home, s.overall_away);
    let (attack_avg, attack_bias) = pair(s.attack_home, s.attack_away);
    let (defence_avg, defence_bias) = pair(s.defence_home, s.defence_away);
    TeamSummary {
        overall_avg,
        overall_bias,
        attack_avg,
        attack_bias,
        defence_avg,
        defence_bias,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideTotals {
    pub home: i64,
    pub away: i64,
}

impl SideTotals {
    pub fn total(self) -> i64 {
        self.home + self.away
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixtureStatTotals {
    pub goals_scored: SideTotals,
    pub yellow_cards: SideTotals,
    pub red_cards: SideTotals,
    pub saves: SideTotals,
}

pub fn summarize_fixture_stats(fixture: &FixtureRawRecord) -> FixtureStatTotals {
    FixtureStatTotals {
        goals_scored: stat_totals(&fixture.stats, "goals_scored"),
        yellow_cards: stat_totals(&fixture.stats, "yellow_cards"),
        red_cards: stat_totals(&fixture.stats, "red_cards"),
        saves: stat_totals(&fixture.stats, "saves"),
    }
}

/// Per-side sum of the named stat; zero when the identifier is absent.
pub fn stat_totals(stats: &[StatEntry], identifier: &str) -> SideTotals {
    let Some(entry) = stats.iter().find(|s| s.identifier == identifier) else {
        return SideTotals::default();
    };
    SideTotals {
        home: entry.h.iter().map(|v| v.value).sum(),
        away: entry.a.iter().map(|v| v.value).sum(),
    }
}
