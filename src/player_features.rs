use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::{PlayerSummary, per_game, prior_season_average, summarize_player};
use crate::fixture_features::position_strength;
use crate::records::{GameEntry, PlayerRawRecord, Position, TeamRawRecord, parse_decimal};

pub const RECENT_FORM_WINDOW: usize = 5;
/// Oldest to newest across the last five games.
pub const FORM_TREND_WEIGHTS: [f64; 5] = [0.10, 0.15, 0.20, 0.25, 0.30];
pub const DEFAULT_UPCOMING_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerFeatureSet {
    pub player_id: u32,
    pub team: Option<u32>,
    pub position: Position,
    pub games_played: u32,
    pub total_points: f64,
    pub points_per_game: f64,
    pub recent_form_score: f64,
    pub price_performance_ratio: f64,
    pub consistency_score: f64,
    pub upcoming_difficulty: f64,
    pub goal_contribution_rate: f64,
    pub xg_overperformance: f64,
    pub xa_overperformance: f64,
    pub home_away_performance_delta: f64,
    pub form_trend: f64,
    pub season_on_season_improvement: f64,
    pub previous_season_relative: f64,
    pub injury_proneness: f64,
    pub price_change_resilience: f64,
    pub team_performance_impact: f64,
    pub difficulty_adjusted_performance: f64,
    pub clean_sheet_contribution: f64,
    pub save_percentage: f64,
    pub bonus_points_per_game: f64,
    pub current_price: f64,
    pub selected_by_percent: f64,
    pub declared_form: f64,
}

pub fn derive_player_features(
    player: &PlayerRawRecord,
    teams: &HashMap<u32, &TeamRawRecord>,
    upcoming_window: usize,
) -> PlayerFeatureSet {
    let history = &player.history;
    let summary = summarize_player(player);
    let team_rank = player
        .team
        .and_then(|id| teams.get(&id))
        .and_then(|t| t.standing.position);

    PlayerFeatureSet {
        player_id: player.id,
        team: player.team,
        position: player.position,
        games_played: summary.games as u32,
        total_points: summary.total_points,
        points_per_game: summary.points_per_game,
        recent_form_score: recent_form_score(history),
        price_performance_ratio: price_performance_ratio(summary.total_points, player.now_cost),
        consistency_score: consistency_score(history),
        upcoming_difficulty: upcoming_difficulty(player, upcoming_window),
        goal_contribution_rate: goal_contribution_rate(&summary),
        xg_overperformance: summary.goals_per_game - summary.expected_goals,
        xa_overperformance: summary.assists_per_game - summary.expected_assists,
        home_away_performance_delta: home_away_performance_delta(history),
        form_trend: form_trend(history),
        season_on_season_improvement: season_on_season_improvement(player, &summary),
        previous_season_relative: summary.previous_season_relative,
        injury_proneness: injury_proneness(history),
        price_change_resilience: price_change_resilience(history),
        team_performance_impact: summary.points_per_game
            * team_rank.map(position_strength).unwrap_or(1.0),
        difficulty_adjusted_performance: difficulty_adjusted_performance(history),
        clean_sheet_contribution: clean_sheet_contribution(player.position, &summary),
        save_percentage: save_percentage(player.position, &summary),
        bonus_points_per_game: per_game(summary.bonus, summary.games),
        current_price: player.now_cost,
        selected_by_percent: parse_decimal(player.selected_by_percent.as_deref()),
        declared_form: parse_decimal(player.form.as_deref()),
    }
}

/// Mean points over the last five games (fewer if the history is shorter).
pub fn recent_form_score(history: &[GameEntry]) -> f64 {
    let recent = last_n(history, RECENT_FORM_WINDOW);
    let total: f64 = recent.iter().map(|g| g.total_points as f64).sum();
    per_game(total, recent.len())
}

/// Population standard deviation of points across the whole history.
pub fn consistency_score(history: &[GameEntry]) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    let n = history.len() as f64;
    let mean = history.iter().map(|g| g.total_points as f64).sum::<f64>() / n;
    let var = history
        .iter()
        .map(|g| {
            let d = g.total_points as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt()
}

/// Weighted points over the last five games. With a shorter history the
/// weights are still taken from the front of the list: game i of the slice
/// gets weight i.
pub fn form_trend(history: &[GameEntry]) -> f64 {
    last_n(history, FORM_TREND_WEIGHTS.len())
        .iter()
        .zip(FORM_TREND_WEIGHTS)
        .map(|(g, w)| g.total_points as f64 * w)
        .sum()
}

pub fn season_on_season_improvement(player: &PlayerRawRecord, summary: &PlayerSummary) -> f64 {
    let last = prior_season_average(player).unwrap_or(0.0);
    let denom = if last == 0.0 { 1.0 } else { last };
    (summary.points_per_game - last) / denom * 100.0
}

/// Share of history entries with zero minutes, as a percentage.
pub fn injury_proneness(history: &[GameEntry]) -> f64 {
    let missed = history.iter().filter(|g| g.minutes == 0).count();
    per_game(missed as f64, history.len()) * 100.0
}

/// Mean absolute points swing across game transitions where the price moved.
pub fn price_change_resilience(history: &[GameEntry]) -> f64 {
    let mut total = 0.0;
    let mut changes = 0usize;
    for pair in history.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.value != next.value {
            total += (next.total_points - prev.total_points).abs() as f64;
            changes += 1;
        }
    }
    per_game(total, changes)
}

pub fn home_away_performance_delta(history: &[GameEntry]) -> f64 {
    let (home, away): (Vec<&GameEntry>, Vec<&GameEntry>) =
        history.iter().partition(|g| g.was_home);
    fn avg(games: &[&GameEntry]) -> f64 {
        per_game(
            games.iter().map(|g| g.total_points as f64).sum(),
            games.len(),
        )
    }
    avg(&home) - avg(&away)
}

pub fn difficulty_adjusted_performance(history: &[GameEntry]) -> f64 {
    let total: f64 = history
        .iter()
        .map(|g| g.total_points as f64 * g.difficulty_or_neutral() as f64 / 3.0)
        .sum();
    per_game(total, history.len())
}

pub fn upcoming_difficulty(player: &PlayerRawRecord, window: usize) -> f64 {
    let next = player.upcoming.iter().take(window);
    let (sum, n) = next.fold((0.0, 0usize), |(s, n), f| (s + f.difficulty as f64, n + 1));
    per_game(sum, n)
}

pub fn price_performance_ratio(total_points: f64, price: f64) -> f64 {
    let price = if price > 0.0 { price } else { 1.0 };
    total_points / price
}

pub fn goal_contribution_rate(summary: &PlayerSummary) -> f64 {
    if summary.minutes <= 0.0 {
        return 0.0;
    }
    (summary.goals + summary.assists) * 90.0 / summary.minutes
}

pub fn clean_sheet_contribution(position: Position, summary: &PlayerSummary) -> f64 {
    if !position.concedes_clean_sheets() {
        return 0.0;
    }
    per_game(summary.clean_sheets, summary.games)
}

pub fn save_percentage(position: Position, summary: &PlayerSummary) -> f64 {
    let faced = summary.saves + summary.goals_conceded;
    if !position.is_goalkeeper() || faced <= 0.0 {
        return 0.0;
    }
    summary.saves / faced * 100.0
}

fn last_n(history: &[GameEntry], n: usize) -> &[GameEntry] {
    &history[history.len().saturating_sub(n)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::PriorSeason;
    use approx::assert_relative_eq;

    fn game(round: u32, points: i32) -> GameEntry {
        serde_json::from_value(serde_json::json!({
            "round": round,
            "minutes": 90,
            "total_points": points,
        }))
        .unwrap()
    }

    fn player_with(points: &[i32]) -> PlayerRawRecord {
        let mut p: PlayerRawRecord = serde_json::from_str(r#"{"id":1}"#).unwrap();
        p.history = points
            .iter()
            .enumerate()
            .map(|(i, pts)| game(i as u32 + 1, *pts))
            .collect();
        p
    }

    #[test]
    fn empty_history_falls_back_to_zero() {
        let p = player_with(&[]);
        let f = derive_player_features(&p, &HashMap::new(), DEFAULT_UPCOMING_WINDOW);
        assert_eq!(f.recent_form_score, 0.0);
        assert_eq!(f.consistency_score, 0.0);
        assert_eq!(f.form_trend, 0.0);
        assert_eq!(f.injury_proneness, 0.0);
        assert_eq!(f.price_change_resilience, 0.0);
        assert_eq!(f.goal_contribution_rate, 0.0);
        assert_eq!(f.upcoming_difficulty, 0.0);
        assert_eq!(f.season_on_season_improvement, 0.0);
    }

    #[test]
    fn recent_form_over_last_five() {
        let p = player_with(&[2, 4, 6, 8, 10]);
        assert_relative_eq!(recent_form_score(&p.history), 6.0);

        let p = player_with(&[100, 2, 4, 6, 8, 10]);
        assert_relative_eq!(recent_form_score(&p.history), 6.0);
    }

    #[test]
    fn consistency_ignores_order() {
        let a = player_with(&[2, 4, 4, 4, 5, 5, 7, 9]);
        let b = player_with(&[9, 5, 4, 7, 2, 4, 5, 4]);
        assert_relative_eq!(consistency_score(&a.history), 2.0);
        assert_relative_eq!(
            consistency_score(&a.history),
            consistency_score(&b.history)
        );
    }

    #[test]
    fn form_trend_weights_align_left() {
        let p = player_with(&[2, 4, 6, 8, 10]);
        assert_relative_eq!(
            form_trend(&p.history),
            2.0 * 0.10 + 4.0 * 0.15 + 6.0 * 0.20 + 8.0 * 0.25 + 10.0 * 0.30
        );

        let short = player_with(&[10, 20]);
        assert_relative_eq!(form_trend(&short.history), 10.0 * 0.10 + 20.0 * 0.15);
    }

    #[test]
    fn improvement_against_prior_season() {
        let mut p = player_with(&[6, 6]);
        p.prior_season = Some(PriorSeason {
            total_points: 100,
            starts: 25,
        });
        let s = summarize_player(&p);
        assert_relative_eq!(season_on_season_improvement(&p, &s), 50.0);

        p.prior_season = None;
        assert_relative_eq!(season_on_season_improvement(&p, &s), 600.0);
    }

    #[test]
    fn injury_proneness_counts_zero_minute_games() {
        let mut p = player_with(&[2, 0, 0, 5]);
        p.history[1].minutes = 0;
        p.history[2].minutes = 0;
        assert_relative_eq!(injury_proneness(&p.history), 50.0);
    }

    #[test]
    fn resilience_only_counts_price_moves() {
        let mut p = player_with(&[2, 8, 3, 3]);
        for (g, v) in p.history.iter_mut().zip([5.0, 5.0, 5.1, 5.0]) {
            g.value = v;
        }
        // 8 -> 3 (price 5.0 -> 5.1) and 3 -> 3 (5.1 -> 5.0)
        assert_relative_eq!(price_change_resilience(&p.history), 2.5);

        let flat = player_with(&[1, 9, 1]);
        assert_eq!(price_change_resilience(&flat.history), 0.0);
    }

    #[test]
    fn home_away_delta_guards_each_side() {
        let mut p = player_with(&[9, 3, 6]);
        p.history[0].was_home = true;
        p.history[2].was_home = true;
        assert_relative_eq!(home_away_performance_delta(&p.history), 7.5 - 3.0);

        let away_only = player_with(&[4, 4]);
        assert_relative_eq!(home_away_performance_delta(&away_only.history), -4.0);
    }

    #[test]
    fn positional_rates() {
        let mut p = player_with(&[6, 2]);
        p.position = Position::Gkp;
        p.history[0].saves = 6;
        p.history[0].clean_sheets = 1;
        p.history[1].goals_conceded = 2;
        p.history[1].bonus = 3;
        let f = derive_player_features(&p, &HashMap::new(), DEFAULT_UPCOMING_WINDOW);
        assert_relative_eq!(f.save_percentage, 75.0);
        assert_relative_eq!(f.clean_sheet_contribution, 0.5);
        assert_relative_eq!(f.bonus_points_per_game, 1.5);

        p.position = Position::Fwd;
        let f = derive_player_features(&p, &HashMap::new(), DEFAULT_UPCOMING_WINDOW);
        assert_eq!(f.save_percentage, 0.0);
        assert_eq!(f.clean_sheet_contribution, 0.0);
    }

    #[test]
    fn team_impact_scales_by_table_position() {
        let mut p = player_with(&[4, 6]);
        p.team = Some(3);
        let team: TeamRawRecord =
            serde_json::from_str(r#"{"id":3,"standing":{"position":20}}"#).unwrap();
        let teams = HashMap::from([(3, &team)]);
        let f = derive_player_features(&p, &teams, DEFAULT_UPCOMING_WINDOW);
        assert_relative_eq!(f.team_performance_impact, 5.0 * 0.05, epsilon = 1e-12);

        let f = derive_player_features(&p, &HashMap::new(), DEFAULT_UPCOMING_WINDOW);
        assert_relative_eq!(f.team_performance_impact, 5.0);
    }

    #[test]
    fn upcoming_difficulty_uses_window() {
        let p: PlayerRawRecord = serde_json::from_str(
            r#"{"id":1,"upcoming":[{"difficulty":2},{"difficulty":4},{"difficulty":5}]}"#,
        )
        .unwrap();
        assert_relative_eq!(upcoming_difficulty(&p, 2), 3.0);
        assert_relative_eq!(upcoming_difficulty(&p, 5), 11.0 / 3.0);
    }
}
